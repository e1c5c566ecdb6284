//! SQL utilities for the PostgreSQL dialect
//!
//! Provides DDL generation and identifier sanitization.

pub mod ddl;
pub mod sanitize;

pub use ddl::DdlGenerator;
pub use sanitize::{qualified_name, quote_identifier, quote_literal, validate_identifier};
