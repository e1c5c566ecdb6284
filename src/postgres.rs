//! PostgreSQL implementation of the database collaborators
//!
//! [`PostgresAdapter`] renders every schema operation with [`DdlGenerator`]
//! and hands the text to a [`StatementExecutor`]: the connection pool, an
//! open transaction, or an in-memory capture used for dry runs.
//! [`PgTransactionProvider`] and [`PgVersionLedger`] complete the set.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use tracing::{debug, info, warn};

use crate::adapter::{SchemaAdapter, Transaction, TransactionProvider};
use crate::error::{Result, SchemaError};
use crate::ledger::{LedgerEntry, VersionLedger};
use crate::object::{ForeignKeyConstraint, Sequence, Table};
use crate::sql::ddl::DdlGenerator;
use crate::types::{ColumnDef, ColumnType, DistributionType, IndexDef, ObjectType, Privilege, SqlParam, Statement};

// ============================================================================
// Statement execution
// ============================================================================

/// Runs SQL text against some target
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Execute one statement, returning the number of rows affected
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64>;
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [SqlParam],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            SqlParam::Null => query.bind(None::<String>),
            SqlParam::Bool(value) => query.bind(*value),
            SqlParam::Int(value) => query.bind(*value),
            SqlParam::Text(value) => query.bind(value.as_str()),
        };
    }
    query
}

/// Executes each statement on its own pooled connection (autocommit)
#[derive(Debug, Clone)]
pub struct PoolExecutor {
    pool: PgPool,
}

impl PoolExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatementExecutor for PoolExecutor {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let result = bind_params(sqlx::query(sql), params).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Executes statements inside one open transaction
pub struct TxExecutor {
    tx: tokio::sync::Mutex<Option<sqlx::Transaction<'static, Postgres>>>,
}

impl fmt::Debug for TxExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TxExecutor(..)")
    }
}

impl TxExecutor {
    fn new(tx: sqlx::Transaction<'static, Postgres>) -> Self {
        Self {
            tx: tokio::sync::Mutex::new(Some(tx)),
        }
    }

    /// Take the transaction out for commit or rollback
    async fn take(&self) -> Option<sqlx::Transaction<'static, Postgres>> {
        self.tx.lock().await.take()
    }
}

#[async_trait]
impl StatementExecutor for TxExecutor {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        let mut guard = self.tx.lock().await;
        let tx = guard
            .as_mut()
            .ok_or_else(|| SchemaError::database("Transaction is already closed"))?;
        let result = bind_params(sqlx::query(sql), params).execute(&mut **tx).await?;
        Ok(result.rows_affected())
    }
}

/// Records statements instead of running them
///
/// Backs dry runs: the captured script shows what a migration would do.
#[derive(Debug, Default)]
pub struct CaptureExecutor {
    statements: Mutex<Vec<Statement>>,
}

impl CaptureExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every statement captured so far, in execution order
    pub fn statements(&self) -> Vec<Statement> {
        self.lock().clone()
    }

    /// The captured statements as a `;`-terminated script. Bind parameters
    /// are listed in a trailing comment.
    pub fn script(&self) -> String {
        self.lock()
            .iter()
            .map(|statement| {
                if statement.params.is_empty() {
                    format!("{};", statement.sql)
                } else {
                    format!("{}; -- {:?}", statement.sql, statement.params)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Statement>> {
        match self.statements.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl StatementExecutor for CaptureExecutor {
    async fn execute(&self, sql: &str, params: &[SqlParam]) -> Result<u64> {
        self.lock().push(Statement {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        Ok(0)
    }
}

// ============================================================================
// Adapter
// ============================================================================

/// [`SchemaAdapter`] for PostgreSQL and Citus
///
/// Tablespaces, session variables and array row types have no PostgreSQL
/// counterpart that needs creating; those operations only log.
#[derive(Debug)]
pub struct PostgresAdapter<E> {
    executor: E,
    ddl: DdlGenerator,
}

impl<E: StatementExecutor> PostgresAdapter<E> {
    pub fn new(executor: E) -> Self {
        Self {
            executor,
            ddl: DdlGenerator::new(),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    async fn run(&self, sql: String) -> Result<()> {
        debug!(sql = %sql, "Executing DDL");
        self.executor.execute(&sql, &[]).await?;
        Ok(())
    }

    async fn run_optional(&self, sql: Option<String>) -> Result<()> {
        match sql {
            Some(sql) => self.run(sql).await,
            None => Ok(()),
        }
    }
}

impl PostgresAdapter<PoolExecutor> {
    /// Adapter running each statement in autocommit mode on `pool`
    pub fn from_pool(pool: PgPool) -> Self {
        Self::new(PoolExecutor::new(pool))
    }
}

#[async_trait]
impl<E: StatementExecutor> SchemaAdapter for PostgresAdapter<E> {
    async fn create_table(&self, schema: &str, name: &str, table: &Table) -> Result<()> {
        if let Some(tablespace) = &table.tablespace {
            debug!(table = %name, tablespace = %tablespace, "Tablespace placement ignored");
        }
        self.run(self.ddl.generate_create_table(schema, name, table)).await
    }

    async fn drop_table(&self, schema: &str, name: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_table(schema, name)).await
    }

    async fn add_column(&self, schema: &str, table: &str, column: &ColumnDef) -> Result<()> {
        self.run(self.ddl.generate_add_column(schema, table, column)).await
    }

    async fn drop_column(&self, schema: &str, table: &str, column: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_column(schema, table, column)).await
    }

    async fn create_index(
        &self,
        schema: &str,
        table: &str,
        index: &IndexDef,
        tenant_column: Option<&str>,
    ) -> Result<()> {
        self.run(self.ddl.generate_create_index(schema, table, index, tenant_column))
            .await
    }

    async fn drop_index(&self, schema: &str, index_name: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_index(schema, index_name)).await
    }

    async fn create_foreign_key(
        &self,
        schema: &str,
        table: &str,
        constraint: &ForeignKeyConstraint,
        _tenant_column: Option<&str>,
    ) -> Result<()> {
        match self.ddl.generate_create_foreign_key(schema, table, constraint) {
            Some(sql) => self.run(sql).await,
            None => {
                warn!(
                    table = %format!("{}.{}", schema, table),
                    constraint = %constraint.constraint_name,
                    "PostgreSQL cannot declare an unenforced foreign key; skipped"
                );
                Ok(())
            }
        }
    }

    async fn drop_foreign_key(&self, schema: &str, table: &str, constraint_name: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_foreign_key(schema, table, constraint_name))
            .await
    }

    async fn create_sequence(&self, schema: &str, name: &str, sequence: &Sequence) -> Result<()> {
        self.run(self.ddl.generate_create_sequence(schema, name, sequence)).await
    }

    async fn alter_sequence_restart_with(
        &self,
        schema: &str,
        name: &str,
        restart_with: i64,
        cache: u32,
        increment_by: i64,
    ) -> Result<()> {
        self.run(
            self.ddl
                .generate_alter_sequence_restart(schema, name, restart_with, cache, increment_by),
        )
        .await
    }

    async fn drop_sequence(&self, schema: &str, name: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_sequence(schema, name)).await
    }

    async fn create_view(&self, schema: &str, name: &str, definition: &str) -> Result<()> {
        self.run(self.ddl.generate_create_view(schema, name, definition)).await
    }

    async fn drop_view(&self, schema: &str, name: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_view(schema, name)).await
    }

    async fn create_procedure(&self, schema: &str, name: &str, body: &str) -> Result<()> {
        self.run(self.ddl.generate_create_procedure(schema, name, body)).await
    }

    async fn drop_procedure(&self, schema: &str, name: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_procedure(schema, name)).await
    }

    async fn create_function(&self, schema: &str, name: &str, body: &str) -> Result<()> {
        self.run(self.ddl.generate_create_function(schema, name, body)).await
    }

    async fn drop_function(&self, schema: &str, name: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_function(schema, name)).await
    }

    async fn create_row_type(&self, schema: &str, name: &str, columns: &[ColumnDef]) -> Result<()> {
        self.run(self.ddl.generate_create_row_type(schema, name, columns)).await
    }

    async fn create_row_array_type(
        &self,
        schema: &str,
        name: &str,
        element_type: &str,
        size: u32,
    ) -> Result<()> {
        debug!(
            type_name = %format!("{}.{}", schema, name),
            element = %element_type,
            size,
            "Array types are implicit in PostgreSQL"
        );
        Ok(())
    }

    async fn drop_type(&self, schema: &str, name: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_type(schema, name)).await
    }

    async fn create_tablespace(&self, name: &str, extent_size_kb: u32) -> Result<()> {
        debug!(tablespace = %name, extent_size_kb, "Tablespaces are not managed on PostgreSQL");
        Ok(())
    }

    async fn drop_tablespace(&self, name: &str) -> Result<()> {
        debug!(tablespace = %name, "Tablespaces are not managed on PostgreSQL");
        Ok(())
    }

    async fn create_variable(&self, schema: &str, name: &str, data_type: &ColumnType) -> Result<()> {
        debug!(
            variable = %format!("{}.{}", schema, name),
            data_type = %data_type.to_sql_type(),
            "Session variables are custom settings on PostgreSQL"
        );
        Ok(())
    }

    async fn drop_variable(&self, schema: &str, name: &str) -> Result<()> {
        debug!(variable = %format!("{}.{}", schema, name), "Session variables are custom settings on PostgreSQL");
        Ok(())
    }

    async fn create_permission(
        &self,
        schema: &str,
        permission_name: &str,
        table: &str,
        variable: &str,
        tenant_column: &str,
    ) -> Result<()> {
        self.run(
            self.ddl
                .generate_create_policy(schema, permission_name, table, variable, tenant_column),
        )
        .await
    }

    async fn drop_permission(&self, schema: &str, permission_name: &str, table: &str) -> Result<()> {
        self.run(self.ddl.generate_drop_policy(schema, permission_name, table))
            .await
    }

    async fn activate_row_access_control(&self, schema: &str, table: &str) -> Result<()> {
        self.run(self.ddl.generate_row_security(schema, table, true)).await
    }

    async fn deactivate_row_access_control(&self, schema: &str, table: &str) -> Result<()> {
        self.run(self.ddl.generate_row_security(schema, table, false)).await
    }

    async fn grant_object_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.run_optional(self.ddl.generate_grant("TABLE", schema, name, privileges, user))
            .await
    }

    async fn grant_procedure_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.run_optional(self.ddl.generate_grant("PROCEDURE", schema, name, privileges, user))
            .await
    }

    async fn grant_function_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.run_optional(self.ddl.generate_grant("FUNCTION", schema, name, privileges, user))
            .await
    }

    async fn grant_sequence_privileges(
        &self,
        schema: &str,
        name: &str,
        privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        self.run_optional(self.ddl.generate_grant("SEQUENCE", schema, name, privileges, user))
            .await
    }

    async fn grant_variable_privileges(
        &self,
        schema: &str,
        name: &str,
        _privileges: &BTreeSet<Privilege>,
        user: &str,
    ) -> Result<()> {
        debug!(variable = %format!("{}.{}", schema, name), user = %user, "No grant needed for session variables");
        Ok(())
    }

    async fn create_tenant_partition(
        &self,
        schema: &str,
        table: &str,
        tenant_column: &str,
        tenant_id: i32,
        extent_size_kb: u32,
    ) -> Result<()> {
        debug!(table = %table, tenant_column = %tenant_column, tenant_id, extent_size_kb, "Creating tenant partition");
        self.run(self.ddl.generate_create_partition(schema, table, tenant_id, false))
            .await
    }

    async fn add_new_tenant_partition(
        &self,
        schema: &str,
        table: &str,
        tenant_column: &str,
        tenant_id: i32,
        extent_size_kb: u32,
    ) -> Result<()> {
        debug!(table = %table, tenant_column = %tenant_column, tenant_id, extent_size_kb, "Adding tenant partition");
        self.run(self.ddl.generate_create_partition(schema, table, tenant_id, true))
            .await
    }

    async fn detach_tenant_partition(&self, schema: &str, table: &str, tenant_id: i32) -> Result<()> {
        self.run(self.ddl.generate_detach_partition(schema, table, tenant_id))
            .await
    }

    async fn drop_detached_partition(&self, schema: &str, table: &str, tenant_id: i32) -> Result<()> {
        self.run(self.ddl.generate_drop_partition(schema, table, tenant_id))
            .await
    }

    async fn apply_distribution_rules(
        &self,
        schema: &str,
        table: &str,
        distribution: DistributionType,
        distribution_column: Option<&str>,
    ) -> Result<()> {
        match self
            .ddl
            .generate_distribution(schema, table, distribution, distribution_column)
        {
            Some(statement) => self.run_statement(&statement).await,
            None => Ok(()),
        }
    }

    async fn run_statement(&self, statement: &Statement) -> Result<()> {
        debug!(sql = %statement.sql, params = statement.params.len(), "Executing statement");
        self.executor.execute(&statement.sql, &statement.params).await?;
        Ok(())
    }
}

// ============================================================================
// Transactions
// ============================================================================

/// Opens PostgreSQL transactions on a pool
#[derive(Debug, Clone)]
pub struct PgTransactionProvider {
    pool: PgPool,
    lock_timeout: Option<Duration>,
}

impl PgTransactionProvider {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            lock_timeout: None,
        }
    }

    /// Bound how long a statement waits for a lock. A timeout surfaces as a
    /// lock conflict, which the apply loop retries.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl TransactionProvider for PgTransactionProvider {
    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        let mut tx = self.pool.begin().await?;
        if let Some(timeout) = self.lock_timeout {
            let sql = format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis());
            sqlx::query(&sql).execute(&mut *tx).await?;
        }
        Ok(Box::new(PgTransaction {
            adapter: PostgresAdapter::new(TxExecutor::new(tx)),
            rollback_only: false,
        }))
    }
}

/// An open PostgreSQL transaction
#[derive(Debug)]
pub struct PgTransaction {
    adapter: PostgresAdapter<TxExecutor>,
    rollback_only: bool,
}

#[async_trait]
impl Transaction for PgTransaction {
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
        let Some(tx) = self.adapter.executor().take().await else {
            return Ok(());
        };
        if self.rollback_only {
            debug!("Rolling back transaction");
            tx.rollback().await?;
        } else {
            tx.commit().await?;
        }
        Ok(())
    }
}

// ============================================================================
// Version ledger
// ============================================================================

type LedgerKey = (String, ObjectType, String);

/// Version ledger stored in a table of the admin schema
///
/// The table is read once by [`init`](Self::init); lookups are then served
/// from memory and every recorded version is written through.
#[derive(Debug)]
pub struct PgVersionLedger {
    pool: PgPool,
    admin_schema: String,
    table: String,
    cache: Mutex<HashMap<LedgerKey, i32>>,
}

impl PgVersionLedger {
    pub fn new(pool: PgPool, admin_schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            pool,
            admin_schema: admin_schema.into(),
            table: table.into(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Create the admin schema and ledger table if missing, then load the
    /// recorded versions
    pub async fn init(&self) -> Result<()> {
        let ddl = DdlGenerator::new();
        sqlx::query(&ddl.generate_create_schema(&self.admin_schema))
            .execute(&self.pool)
            .await?;
        sqlx::query(&ddl.generate_create_ledger_table(&self.admin_schema, &self.table))
            .execute(&self.pool)
            .await?;

        let rows = sqlx::query(&ddl.generate_select_ledger(&self.admin_schema, &self.table))
            .fetch_all(&self.pool)
            .await?;

        let mut loaded = HashMap::with_capacity(rows.len());
        for row in rows {
            let schema: String = row.try_get("schema_name")?;
            let type_name: String = row.try_get("object_type")?;
            let name: String = row.try_get("object_name")?;
            let version: i32 = row.try_get("version")?;

            let object_type: ObjectType = serde_json::from_value(serde_json::Value::String(type_name))?;
            loaded.insert((schema, object_type, name), version);
        }

        info!(objects = loaded.len(), ledger = %self.table, "Loaded version ledger");
        *self.lock() = loaded;
        Ok(())
    }

    /// Every version recorded in the ledger table, oldest first
    pub async fn history(&self) -> Result<Vec<LedgerEntry>> {
        let sql = DdlGenerator::new().generate_select_ledger_history(&self.admin_schema, &self.table);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.into_iter()
            .map(|row| -> Result<LedgerEntry> {
                let type_name: String = row.try_get("object_type")?;
                Ok(LedgerEntry {
                    schema_name: row.try_get("schema_name")?,
                    object_type: serde_json::from_value(serde_json::Value::String(type_name))?,
                    object_name: row.try_get("object_name")?,
                    version: row.try_get("version")?,
                    applied: row.try_get("applied")?,
                })
            })
            .collect()
    }

    fn remember(&self, schema: &str, object_type: ObjectType, name: &str, version: i32) {
        let mut cache = self.lock();
        let current = cache
            .entry((schema.to_string(), object_type, name.to_string()))
            .or_insert(0);
        if version > *current {
            *current = version;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<LedgerKey, i32>> {
        match self.cache.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl VersionLedger for PgVersionLedger {
    async fn get_version(&self, schema: &str, object_type: ObjectType, name: &str) -> Result<i32> {
        let key = (schema.to_string(), object_type, name.to_string());
        Ok(self.lock().get(&key).copied().unwrap_or(0))
    }

    async fn add_version(
        &self,
        schema: &str,
        object_type: ObjectType,
        name: &str,
        version: i32,
    ) -> Result<()> {
        let sql = DdlGenerator::new().generate_insert_ledger(&self.admin_schema, &self.table);
        sqlx::query(&sql)
            .bind(schema)
            .bind(object_type.as_str())
            .bind(name)
            .bind(version)
            .execute(&self.pool)
            .await?;

        self.remember(schema, object_type, name, version);
        Ok(())
    }

    fn version_statement(
        &self,
        schema: &str,
        object_type: ObjectType,
        name: &str,
        version: i32,
    ) -> Option<Statement> {
        let sql = DdlGenerator::new().generate_insert_ledger(&self.admin_schema, &self.table);
        Some(
            Statement::new(sql)
                .bind(SqlParam::Text(schema.to_string()))
                .bind(SqlParam::Text(object_type.as_str().to_string()))
                .bind(SqlParam::Text(name.to_string()))
                .bind(SqlParam::Int(i64::from(version))),
        )
    }

    async fn confirm_version(
        &self,
        schema: &str,
        object_type: ObjectType,
        name: &str,
        version: i32,
    ) -> Result<()> {
        self.remember(schema, object_type, name, version);
        Ok(())
    }
}
