//! Test doubles shared by the engine tests
//!
//! [`RecordingAdapter`] records one `operation:SCHEMA.NAME` entry per call
//! and can raise a lock conflict a fixed number of times, or fail one
//! operation outright.
//! [`RecordingTransactions`] hands out transactions whose adapters share
//! that log, counts what happens to them and can refuse commits.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use schema_forge::object::{ForeignKeyConstraint, Sequence, Table};
use schema_forge::{
    ColumnDef, ColumnType, DistributionType, IndexDef, Privilege, Result, SchemaAdapter, SchemaError, Statement,
    Transaction, TransactionProvider,
};

/// Ordered record of adapter calls
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Calls whose operation is `operation`
    pub fn of(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{}:", operation);
        self.calls().into_iter().filter(|c| c.starts_with(&prefix)).collect()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls().iter().position(|c| c == call)
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn push(&self, call: String) {
        self.0.lock().unwrap().push(call);
    }
}

/// Adapter that records calls instead of issuing DDL
#[derive(Debug, Clone, Default)]
pub struct RecordingAdapter {
    log: CallLog,
    conflicts: Arc<AtomicU32>,
    failing: Arc<Mutex<Option<String>>>,
}

impl RecordingAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `times` calls with a lock conflict
    pub fn fail_with_lock_conflict(self, times: u32) -> Self {
        self.conflicts.store(times, Ordering::SeqCst);
        self
    }

    /// Fail every call of `operation` until cleared with `None`
    pub fn set_failing(&self, operation: Option<&str>) {
        *self.failing.lock().unwrap() = operation.map(str::to_string);
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    fn record(&self, operation: &str, schema: &str, name: &str) -> Result<()> {
        let conflict = self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if conflict {
            return Err(SchemaError::lock_conflict(format!("deadlock on {}.{}", schema, name)));
        }
        if self.failing.lock().unwrap().as_deref() == Some(operation) {
            return Err(SchemaError::database(format!("{} failed on {}.{}", operation, schema, name)));
        }

        let target = if schema.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", schema, name)
        };
        self.log.push(format!("{}:{}", operation, target));
        Ok(())
    }
}

#[async_trait]
impl SchemaAdapter for RecordingAdapter {
    async fn create_table(&self, schema: &str, name: &str, _table: &Table) -> Result<()> {
        self.record("create_table", schema, name)
    }

    async fn drop_table(&self, schema: &str, name: &str) -> Result<()> {
        self.record("drop_table", schema, name)
    }

    async fn add_column(&self, schema: &str, table: &str, column: &ColumnDef) -> Result<()> {
        self.record("add_column", schema, &format!("{}.{}", table, column.name))
    }

    async fn drop_column(&self, schema: &str, table: &str, column: &str) -> Result<()> {
        self.record("drop_column", schema, &format!("{}.{}", table, column))
    }

    async fn create_index(
        &self,
        schema: &str,
        _table: &str,
        index: &IndexDef,
        _tenant_column: Option<&str>,
    ) -> Result<()> {
        self.record("create_index", schema, &index.name)
    }

    async fn drop_index(&self, schema: &str, index_name: &str) -> Result<()> {
        self.record("drop_index", schema, index_name)
    }

    async fn create_foreign_key(
        &self,
        schema: &str,
        _table: &str,
        constraint: &ForeignKeyConstraint,
        _tenant_column: Option<&str>,
    ) -> Result<()> {
        self.record("create_foreign_key", schema, &constraint.constraint_name)
    }

    async fn drop_foreign_key(&self, schema: &str, _table: &str, constraint_name: &str) -> Result<()> {
        self.record("drop_foreign_key", schema, constraint_name)
    }

    async fn create_sequence(&self, schema: &str, name: &str, _sequence: &Sequence) -> Result<()> {
        self.record("create_sequence", schema, name)
    }

    async fn alter_sequence_restart_with(
        &self,
        schema: &str,
        name: &str,
        _restart_with: i64,
        _cache: u32,
        _increment_by: i64,
    ) -> Result<()> {
        self.record("alter_sequence", schema, name)
    }

    async fn drop_sequence(&self, schema: &str, name: &str) -> Result<()> {
        self.record("drop_sequence", schema, name)
    }

    async fn create_view(&self, schema: &str, name: &str, _definition: &str) -> Result<()> {
        self.record("create_view", schema, name)
    }

    async fn drop_view(&self, schema: &str, name: &str) -> Result<()> {
        self.record("drop_view", schema, name)
    }

    async fn create_procedure(&self, schema: &str, name: &str, _body: &str) -> Result<()> {
        self.record("create_procedure", schema, name)
    }

    async fn drop_procedure(&self, schema: &str, name: &str) -> Result<()> {
        self.record("drop_procedure", schema, name)
    }

    async fn create_function(&self, schema: &str, name: &str, _body: &str) -> Result<()> {
        self.record("create_function", schema, name)
    }

    async fn drop_function(&self, schema: &str, name: &str) -> Result<()> {
        self.record("drop_function", schema, name)
    }

    async fn create_row_type(&self, schema: &str, name: &str, _columns: &[ColumnDef]) -> Result<()> {
        self.record("create_type", schema, name)
    }

    async fn create_row_array_type(
        &self,
        schema: &str,
        name: &str,
        _element_type: &str,
        _size: u32,
    ) -> Result<()> {
        self.record("create_array_type", schema, name)
    }

    async fn drop_type(&self, schema: &str, name: &str) -> Result<()> {
        self.record("drop_type", schema, name)
    }

    async fn create_tablespace(&self, name: &str, _extent_size_kb: u32) -> Result<()> {
        self.record("create_tablespace", "", name)
    }

    async fn drop_tablespace(&self, name: &str) -> Result<()> {
        self.record("drop_tablespace", "", name)
    }

    async fn create_variable(&self, schema: &str, name: &str, _data_type: &ColumnType) -> Result<()> {
        self.record("create_variable", schema, name)
    }

    async fn drop_variable(&self, schema: &str, name: &str) -> Result<()> {
        self.record("drop_variable", schema, name)
    }

    async fn create_permission(
        &self,
        schema: &str,
        permission_name: &str,
        _table: &str,
        _variable: &str,
        _tenant_column: &str,
    ) -> Result<()> {
        self.record("create_permission", schema, permission_name)
    }

    async fn drop_permission(&self, schema: &str, permission_name: &str, _table: &str) -> Result<()> {
        self.record("drop_permission", schema, permission_name)
    }

    async fn activate_row_access_control(&self, schema: &str, table: &str) -> Result<()> {
        self.record("activate_rac", schema, table)
    }

    async fn deactivate_row_access_control(&self, schema: &str, table: &str) -> Result<()> {
        self.record("deactivate_rac", schema, table)
    }

    async fn grant_object_privileges(
        &self,
        schema: &str,
        name: &str,
        _privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.record("grant", schema, &format!("{}>{}", name, user))
    }

    async fn grant_procedure_privileges(
        &self,
        schema: &str,
        name: &str,
        _privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.record("grant_procedure", schema, &format!("{}>{}", name, user))
    }

    async fn grant_function_privileges(
        &self,
        schema: &str,
        name: &str,
        _privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.record("grant_function", schema, &format!("{}>{}", name, user))
    }

    async fn grant_sequence_privileges(
        &self,
        schema: &str,
        name: &str,
        _privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.record("grant_sequence", schema, &format!("{}>{}", name, user))
    }

    async fn grant_variable_privileges(
        &self,
        schema: &str,
        name: &str,
        _privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.record("grant_variable", schema, &format!("{}>{}", name, user))
    }

    async fn create_tenant_partition(
        &self,
        schema: &str,
        table: &str,
        _tenant_column: &str,
        tenant_id: i32,
        _extent_size_kb: u32,
    ) -> Result<()> {
        self.record("create_partition", schema, &format!("{}_P{}", table, tenant_id))
    }

    async fn add_new_tenant_partition(
        &self,
        schema: &str,
        table: &str,
        _tenant_column: &str,
        tenant_id: i32,
        _extent_size_kb: u32,
    ) -> Result<()> {
        self.record("add_partition", schema, &format!("{}_P{}", table, tenant_id))
    }

    async fn detach_tenant_partition(&self, schema: &str, table: &str, tenant_id: i32) -> Result<()> {
        self.record("detach_partition", schema, &format!("{}_P{}", table, tenant_id))
    }

    async fn drop_detached_partition(&self, schema: &str, table: &str, tenant_id: i32) -> Result<()> {
        self.record("drop_partition", schema, &format!("{}_P{}", table, tenant_id))
    }

    async fn apply_distribution_rules(
        &self,
        schema: &str,
        table: &str,
        distribution: DistributionType,
        _distribution_column: Option<&str>,
    ) -> Result<()> {
        let operation = match distribution {
            DistributionType::Reference => "distribute_reference",
            DistributionType::Distributed => "distribute_sharded",
            DistributionType::None => "distribute_none",
        };
        self.record(operation, schema, table)
    }

    async fn run_statement(&self, statement: &Statement) -> Result<()> {
        self.record("statement", "", &statement.sql)
    }
}

/// Transaction provider backed by [`RecordingAdapter`]s sharing one log
#[derive(Debug, Clone, Default)]
pub struct RecordingTransactions {
    adapter: RecordingAdapter,
    begins: Arc<AtomicUsize>,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
    refused_commits: Arc<AtomicU32>,
}

impl RecordingTransactions {
    pub fn new(adapter: RecordingAdapter) -> Self {
        Self {
            adapter,
            ..Self::default()
        }
    }

    /// Refuse the next `times` commits; the transaction rolls back instead
    pub fn refuse_commits(self, times: u32) -> Self {
        self.refused_commits.store(times, Ordering::SeqCst);
        self
    }

    pub fn log(&self) -> &CallLog {
        self.adapter.log()
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionProvider for RecordingTransactions {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RecordingTransaction {
            adapter: self.adapter.clone(),
            commits: Arc::clone(&self.commits),
            rollbacks: Arc::clone(&self.rollbacks),
            refused_commits: Arc::clone(&self.refused_commits),
            rollback_only: false,
            closed: false,
        }))
    }
}

struct RecordingTransaction {
    adapter: RecordingAdapter,
    commits: Arc<AtomicUsize>,
    rollbacks: Arc<AtomicUsize>,
    refused_commits: Arc<AtomicU32>,
    rollback_only: bool,
    closed: bool,
}

#[async_trait]
impl Transaction for RecordingTransaction {
    fn adapter(&self) -> &dyn SchemaAdapter {
        &self.adapter
    }

    fn set_rollback_only(&mut self) {
        self.rollback_only = true;
    }

    fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.rollback_only {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Ok(());
        }
        let refused = self
            .refused_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            self.rollbacks.fetch_add(1, Ordering::SeqCst);
            return Err(SchemaError::database("commit refused"));
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
