//! SchemaMigrator - Main entry point for migrating a PostgreSQL database
//!
//! Connects to the target, makes sure the data and admin schemas and the
//! version ledger exist, and drives a [`PhysicalDataModel`] through its
//! lifecycle: concurrent versioned updates, procedure refresh, tenant
//! partitions, grants and teardown.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tracing::{info, instrument, warn};

use crate::adapter::TransactionProvider;
use crate::config::MigrationConfig;
use crate::error::{Result, SchemaError};
use crate::ledger::VersionLedger;
use crate::model::{PhysicalDataModel, TagRef};
use crate::object::SchemaApplyContext;
use crate::postgres::{CaptureExecutor, PgTransactionProvider, PgVersionLedger, PoolExecutor, PostgresAdapter};
use crate::sql::ddl::DdlGenerator;
use crate::task::TokioTaskCollector;

/// Lock wait bound for migration transactions. Contention past this point
/// is retried by the apply loop.
const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

/// Drives schema migrations against one PostgreSQL database
pub struct SchemaMigrator {
    /// Database connection pool
    pool: PgPool,
    /// Migration configuration
    config: MigrationConfig,
    ledger: Arc<PgVersionLedger>,
    transactions: Arc<PgTransactionProvider>,
}

impl SchemaMigrator {
    /// Create a new SchemaMigrator from configuration
    ///
    /// This will:
    /// 1. Connect to the database
    /// 2. Create the data and admin schemas if they don't exist
    /// 3. Create and load the version ledger
    pub async fn new(config: MigrationConfig) -> Result<Self> {
        let pool = PgPool::connect(&config.database_url)
            .await
            .map_err(|e| SchemaError::database(format!("Database connection failed: {}", e)))?;
        Self::from_pool(pool, config).await
    }

    /// Create a new SchemaMigrator from an existing pool
    pub async fn from_pool(pool: PgPool, config: MigrationConfig) -> Result<Self> {
        let ledger = Arc::new(PgVersionLedger::new(
            pool.clone(),
            config.admin_schema_name.clone(),
            config.ledger_table.clone(),
        ));
        let transactions = Arc::new(PgTransactionProvider::new(pool.clone()).with_lock_timeout(LOCK_TIMEOUT));

        let migrator = Self {
            pool,
            config,
            ledger,
            transactions,
        };
        migrator.ensure_schemas().await?;
        Ok(migrator)
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn ledger(&self) -> &PgVersionLedger {
        &self.ledger
    }

    /// Adapter running each statement in autocommit mode
    pub fn adapter(&self) -> PostgresAdapter<PoolExecutor> {
        PostgresAdapter::from_pool(self.pool.clone())
    }

    async fn ensure_schemas(&self) -> Result<()> {
        let sql = DdlGenerator::new().generate_create_schema(&self.config.schema_name);
        sqlx::query(&sql).execute(&self.pool).await?;
        self.ledger.init().await
    }

    // =========================================================================
    // Schema updates
    // =========================================================================

    /// Bring the database up to `model`
    ///
    /// Every object whose version is newer than the ledger's is applied in
    /// its own transaction, concurrently where dependencies allow. On a
    /// distributed target tables are created without foreign keys; once
    /// every object is in place the tables are distributed and get their
    /// constraints. Those steps are recorded in the ledger as well, so a
    /// rerun after any failure completes them.
    #[instrument(skip_all, fields(schema = %self.config.schema_name, objects = model.len()))]
    pub async fn update_schema(&self, model: Arc<PhysicalDataModel>) -> Result<()> {
        let ctx = self.config.apply_context();

        let mut collector = TokioTaskCollector::new(self.config.max_concurrency)
            .with_failure_policy(self.config.failure_policy);
        let transactions: Arc<dyn TransactionProvider> = self.transactions.clone();
        let ledger: Arc<dyn VersionLedger> = self.ledger.clone();
        model.collect(&mut collector, transactions, ledger, ctx, self.config.retry_policy())?;

        let report = collector.start_and_wait().await;
        for (task, error) in report.failed() {
            warn!(task = %task, error = %error, "Schema object failed");
        }
        let completed = report.completed().count();
        report.into_result()?;
        info!(completed, "Schema objects applied");

        if self.config.distributed {
            model
                .apply_distribution_with_history(self.transactions.as_ref(), self.ledger.as_ref())
                .await?;
        }
        Ok(())
    }

    /// Recreate every procedure and function, regardless of version
    #[instrument(skip_all)]
    pub async fn apply_procedures(&self, model: &PhysicalDataModel) -> Result<()> {
        let ctx = self.config.apply_context();
        let mut tx = self.transactions.begin().await?;
        let outcome = async {
            model.apply_procedures(tx.adapter(), ctx).await?;
            model.apply_functions(tx.adapter(), ctx).await
        }
        .await;
        if outcome.is_err() {
            tx.set_rollback_only();
        }
        tx.close().await?;
        outcome
    }

    /// Drop the model's objects, or only those tagged `tag`
    #[instrument(skip(self, model))]
    pub async fn drop_schema_objects(&self, model: &PhysicalDataModel, tag: Option<(&str, &str)>) -> Result<()> {
        let tag = tag.map(|(group, value)| TagRef::new(group, value));
        model
            .drop_split_transaction(self.transactions.as_ref(), self.config.apply_context(), tag)
            .await
    }

    // =========================================================================
    // Tenants and grants
    // =========================================================================

    /// Create `tenant_id`'s partitions. With `existing` set, only the
    /// partitions missing since the tenant was added are created.
    #[instrument(skip(self, model))]
    pub async fn add_tenant(
        &self,
        model: &PhysicalDataModel,
        tenant_id: i32,
        extent_size_kb: u32,
        existing: bool,
    ) -> Result<()> {
        let adapter = self.adapter();
        if existing {
            model
                .add_new_tenant_partitions(&adapter, tenant_id, extent_size_kb)
                .await
        } else {
            model.add_tenant_partitions(&adapter, tenant_id, extent_size_kb).await
        }
    }

    /// Detach and drop `tenant_id`'s partitions
    #[instrument(skip(self, model))]
    pub async fn remove_tenant(&self, model: &PhysicalDataModel, tenant_id: i32) -> Result<()> {
        let adapter = self.adapter();
        model.detach_tenant_partitions(&adapter, tenant_id).await?;
        model.drop_detached_partitions(&adapter, tenant_id).await
    }

    /// Grant the privileges of `group` on every object to `user`
    #[instrument(skip(self, model))]
    pub async fn grant_privileges(&self, model: &PhysicalDataModel, group: &str, user: &str) -> Result<()> {
        let adapter = self.adapter();
        model.apply_grants(&adapter, group, user).await
    }

    // =========================================================================
    // Dry run
    // =========================================================================

    /// Render the statements that create `model` from scratch, without a
    /// database
    pub async fn render_script(model: &PhysicalDataModel, ctx: SchemaApplyContext) -> Result<String> {
        let adapter = PostgresAdapter::new(CaptureExecutor::new());
        model.apply(&adapter, ctx).await?;
        if ctx.distributed {
            model.apply_distribution_rules(&adapter).await?;
            model
                .apply_foreign_key_constraints(&adapter, ctx.with_foreign_keys(true))
                .await?;
        }
        Ok(adapter.executor().script())
    }
}
