//! Collaborator contracts for the target database
//!
//! [`SchemaAdapter`] is the dialect boundary: schema objects describe
//! themselves through it and never build SQL text. [`TransactionProvider`]
//! hands out [`Transaction`]s, each of which owns an adapter bound to that
//! transaction.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::error::Result;
use crate::object::{ForeignKeyConstraint, Sequence, Table};
use crate::types::{ColumnDef, ColumnType, DistributionType, IndexDef, Privilege, Statement};

/// Dialect-specific DDL operations
#[async_trait]
pub trait SchemaAdapter: Send + Sync {
    // ========================================================================
    // Tables
    // ========================================================================

    async fn create_table(&self, schema: &str, name: &str, table: &Table) -> Result<()>;

    async fn drop_table(&self, schema: &str, name: &str) -> Result<()>;

    async fn add_column(&self, schema: &str, table: &str, column: &ColumnDef) -> Result<()>;

    async fn drop_column(&self, schema: &str, table: &str, column: &str) -> Result<()>;

    /// Create an index. Tenant tables carry the tenant column as the leading
    /// index column.
    async fn create_index(
        &self,
        schema: &str,
        table: &str,
        index: &IndexDef,
        tenant_column: Option<&str>,
    ) -> Result<()>;

    async fn drop_index(&self, schema: &str, index_name: &str) -> Result<()>;

    async fn create_foreign_key(
        &self,
        schema: &str,
        table: &str,
        constraint: &ForeignKeyConstraint,
        tenant_column: Option<&str>,
    ) -> Result<()>;

    async fn drop_foreign_key(&self, schema: &str, table: &str, constraint_name: &str) -> Result<()>;

    // ========================================================================
    // Sequences, views, routines and types
    // ========================================================================

    async fn create_sequence(&self, schema: &str, name: &str, sequence: &Sequence) -> Result<()>;

    async fn alter_sequence_restart_with(
        &self,
        schema: &str,
        name: &str,
        restart_with: i64,
        cache: u32,
        increment_by: i64,
    ) -> Result<()>;

    async fn drop_sequence(&self, schema: &str, name: &str) -> Result<()>;

    async fn create_view(&self, schema: &str, name: &str, definition: &str) -> Result<()>;

    async fn drop_view(&self, schema: &str, name: &str) -> Result<()>;

    async fn create_procedure(&self, schema: &str, name: &str, body: &str) -> Result<()>;

    async fn drop_procedure(&self, schema: &str, name: &str) -> Result<()>;

    async fn create_function(&self, schema: &str, name: &str, body: &str) -> Result<()>;

    async fn drop_function(&self, schema: &str, name: &str) -> Result<()>;

    async fn create_row_type(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> Result<()>;

    async fn create_row_array_type(
        &self,
        schema: &str,
        name: &str,
        element_type: &str,
        size: u32,
    ) -> Result<()>;

    async fn drop_type(&self, schema: &str, name: &str) -> Result<()>;

    // ========================================================================
    // Storage and session state
    // ========================================================================

    async fn create_tablespace(&self, name: &str, extent_size_kb: u32) -> Result<()>;

    async fn drop_tablespace(&self, name: &str) -> Result<()>;

    async fn create_variable(&self, schema: &str, name: &str, data_type: &ColumnType) -> Result<()>;

    async fn drop_variable(&self, schema: &str, name: &str) -> Result<()>;

    // ========================================================================
    // Row access control
    // ========================================================================

    /// Restrict the rows of `table` to those whose `tenant_column` matches
    /// the session variable `variable`
    async fn create_permission(
        &self,
        schema: &str,
        permission_name: &str,
        table: &str,
        variable: &str,
        tenant_column: &str,
    ) -> Result<()>;

    async fn drop_permission(&self, schema: &str, permission_name: &str, table: &str) -> Result<()>;

    async fn activate_row_access_control(&self, schema: &str, table: &str) -> Result<()>;

    async fn deactivate_row_access_control(&self, schema: &str, table: &str) -> Result<()>;

    // ========================================================================
    // Grants
    // ========================================================================

    /// Grant on a table or view
    async fn grant_object_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()>;

    async fn grant_procedure_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()>;

    async fn grant_function_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()>;

    async fn grant_sequence_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()>;

    async fn grant_variable_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()>;

    // ========================================================================
    // Tenant partitions
    // ========================================================================

    /// Create the partition holding `tenant_id`'s rows of `table`
    async fn create_tenant_partition(
        &self,
        schema: &str,
        table: &str,
        tenant_column: &str,
        tenant_id: i32,
        extent_size_kb: u32,
    ) -> Result<()>;

    /// Like [`create_tenant_partition`](Self::create_tenant_partition), but
    /// tolerates a partition that already exists
    async fn add_new_tenant_partition(
        &self,
        schema: &str,
        table: &str,
        tenant_column: &str,
        tenant_id: i32,
        extent_size_kb: u32,
    ) -> Result<()>;

    async fn detach_tenant_partition(&self, schema: &str, table: &str, tenant_id: i32) -> Result<()>;

    async fn drop_detached_partition(&self, schema: &str, table: &str, tenant_id: i32) -> Result<()>;

    // ========================================================================
    // Distribution
    // ========================================================================

    async fn apply_distribution_rules(
        &self,
        schema: &str,
        table: &str,
        distribution: DistributionType,
        distribution_column: Option<&str>,
    ) -> Result<()>;

    /// Run a parameterized statement verbatim
    async fn run_statement(&self, statement: &Statement) -> Result<()>;
}

/// Opens transactions against the target
#[async_trait]
pub trait TransactionProvider: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn Transaction>>;
}

/// A unit of work. Commits on [`close`](Transaction::close) unless marked
/// rollback-only.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Adapter whose statements run inside this transaction
    fn adapter(&self) -> &dyn SchemaAdapter;

    fn set_rollback_only(&mut self);

    fn is_rollback_only(&self) -> bool;

    /// Commit, or roll back when marked rollback-only. Closing twice is a
    /// no-op.
    async fn close(&mut self) -> Result<()>;
}
