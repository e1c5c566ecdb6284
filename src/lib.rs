//! # schema-forge
//!
//! Schema-as-code versioning and concurrent migration for PostgreSQL.
//!
//! A database schema is described in code as a [`PhysicalDataModel`] of
//! versioned objects (tables, indexes, sequences, views, procedures,
//! functions, row types, object groups). Each object names the objects it
//! depends on. Applying the model creates or migrates only the objects whose
//! version is newer than the one recorded in the version ledger, in
//! dependency order, with independent branches running concurrently.
//!
//! ## Features
//!
//! - **Versioned Objects**: Every object carries a version; the ledger makes reruns skip applied work
//! - **Dependency Ordering**: Objects are applied after everything they depend on, whatever the insertion order
//! - **Concurrent Apply**: One transaction per object, retried on deadlock and lock timeout with jittered backoff
//! - **Multi-Tenancy**: Tenant tables are list-partitioned, one partition per tenant
//! - **Distribution**: Reference and distributed tables for Citus, with foreign key rules checked at build time
//! - **SQL Injection Prevention**: All identifiers are properly quoted and validated
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use schema_forge::{IndexDef, MigrationConfig, PhysicalDataModel, SchemaMigrator, Table};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut model = PhysicalDataModel::new();
//!
//!     let resources = Table::builder("fhirdata", "resources")
//!         .add_bigint_column("resource_id", false)
//!         .add_varchar_column("logical_id", 255, false)
//!         .primary_key("pk_resources", ["resource_id"])
//!         .add_index(IndexDef::new("idx_resources_lid", ["logical_id"]).unique())
//!         .build(&model)?;
//!     model.add_table(resources)?;
//!
//!     let config = MigrationConfig::builder("postgres://localhost/fhir")
//!         .schema_name("fhirdata")
//!         .build();
//!     let migrator = SchemaMigrator::new(config).await?;
//!     migrator.update_schema(Arc::new(model)).await?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! A migration run is configured using `MigrationConfig`:
//!
//! ```rust
//! use schema_forge::MigrationConfig;
//!
//! let config = MigrationConfig::builder("postgres://localhost/fhir")
//!     .schema_name("fhirdata")           // Schema holding the model
//!     .admin_schema_name("fhir_admin")   // Schema holding the version ledger
//!     .max_concurrency(4)                // Objects applied at the same time
//!     .distributed(false)                // Citus target
//!     .build();
//! assert_eq!(config.ledger_table, "schema_versions");
//! ```

pub mod adapter;
pub mod config;
pub mod error;
pub mod ledger;
pub mod migrator;
pub mod model;
pub mod object;
pub mod postgres;
pub mod retry;
pub mod sql;
pub mod task;
pub mod types;
pub mod visitor;

// Re-export main types for convenience
pub use adapter::{SchemaAdapter, Transaction, TransactionProvider};
pub use config::{MigrationConfig, MigrationConfigBuilder, RetrySettings};
pub use error::{Result, SchemaError};
pub use ledger::{InMemoryLedger, LedgerEntry, StagedVersions, TransactionalLedger, VersionLedger};
pub use migrator::SchemaMigrator;
pub use model::{PhysicalDataModel, TagRef};
pub use object::{
    AddColumn, AlterSequenceStart, DatabaseObject, ForeignKeyConstraint, Index, MigrationStep, ObjectGroup,
    ObjectKind, RowArrayType, RowType, Routine, SchemaApplyContext, Sequence, Table, View,
};
pub use postgres::{CaptureExecutor, PgTransactionProvider, PgVersionLedger, PostgresAdapter, StatementExecutor};
pub use retry::{JitterSource, NoJitter, RandomJitter, RetryPolicy, SeededJitter};
pub use task::{FailurePolicy, Runnable, TaskCollector, TaskHandle, TaskOutcome, TaskReport, TokioTaskCollector};
pub use types::{
    ColumnDef, ColumnType, DistributionType, Generated, IndexDef, ObjectKey, ObjectType, Privilege, SqlParam,
    Statement,
};
pub use visitor::{DataModelVisitor, Visited};

// Re-export SQL utilities for advanced users
pub use sql::ddl::DdlGenerator;
pub use sql::sanitize::{quote_identifier, validate_identifier};
