//! Configuration for SchemaMigrator
//!
//! Provides a builder pattern for configuring a migration run. The
//! configuration is also (de)serializable so it can be kept in a JSON file.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::object::SchemaApplyContext;
use crate::retry::RetryPolicy;
use crate::task::FailurePolicy;

/// Lock-conflict retry settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    /// Transactions attempted per object before giving up (default: 10)
    pub max_attempts: u32,
    /// Upper bound of the jittered sleep between attempts (default: 5000)
    pub max_backoff_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            max_backoff_ms: 5000,
        }
    }
}

/// Configuration for a schema migration run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// PostgreSQL database URL
    pub database_url: String,
    /// Schema holding the data model (default: "public")
    #[serde(default = "default_schema_name")]
    pub schema_name: String,
    /// Schema holding the version ledger (default: "schema_admin")
    #[serde(default = "default_admin_schema_name")]
    pub admin_schema_name: String,
    /// Name of the version ledger table (default: "schema_versions")
    #[serde(default = "default_ledger_table")]
    pub ledger_table: String,
    /// Maximum number of objects applied at the same time (default: 8)
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Target is a distributed (Citus) database (default: false)
    #[serde(default)]
    pub distributed: bool,
    /// Lock-conflict retry settings
    #[serde(default)]
    pub retry: RetrySettings,
    /// What happens to pending work after a task fails
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_schema_name() -> String {
    "public".to_string()
}

fn default_admin_schema_name() -> String {
    "schema_admin".to_string()
}

fn default_ledger_table() -> String {
    "schema_versions".to_string()
}

fn default_max_concurrency() -> usize {
    8
}

impl MigrationConfig {
    /// Create a new configuration builder
    pub fn builder(database_url: impl Into<String>) -> MigrationConfigBuilder {
        MigrationConfigBuilder::new(database_url)
    }

    /// Load a configuration from JSON; missing fields take their defaults
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Apply context for the first pass of a schema update. Distributed
    /// targets create tables without foreign keys.
    pub fn apply_context(&self) -> SchemaApplyContext {
        if self.distributed {
            SchemaApplyContext::distributed()
        } else {
            SchemaApplyContext::default()
        }
    }

    /// Retry policy with random jitter
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.max_backoff_ms),
        )
    }
}

/// Builder for MigrationConfig
#[derive(Debug)]
pub struct MigrationConfigBuilder {
    config: MigrationConfig,
}

impl MigrationConfigBuilder {
    /// Create a new builder with the database URL
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            config: MigrationConfig {
                database_url: database_url.into(),
                schema_name: default_schema_name(),
                admin_schema_name: default_admin_schema_name(),
                ledger_table: default_ledger_table(),
                max_concurrency: default_max_concurrency(),
                distributed: false,
                retry: RetrySettings::default(),
                failure_policy: FailurePolicy::default(),
            },
        }
    }

    /// Set the data schema name (default: "public")
    pub fn schema_name(mut self, name: impl Into<String>) -> Self {
        self.config.schema_name = name.into();
        self
    }

    /// Set the admin schema name (default: "schema_admin")
    pub fn admin_schema_name(mut self, name: impl Into<String>) -> Self {
        self.config.admin_schema_name = name.into();
        self
    }

    /// Set the ledger table name (default: "schema_versions")
    pub fn ledger_table(mut self, name: impl Into<String>) -> Self {
        self.config.ledger_table = name.into();
        self
    }

    /// Set the concurrency limit (default: 8, minimum 1)
    pub fn max_concurrency(mut self, limit: usize) -> Self {
        self.config.max_concurrency = limit.max(1);
        self
    }

    /// Enable or disable the distributed flow (default: false)
    pub fn distributed(mut self, enabled: bool) -> Self {
        self.config.distributed = enabled;
        self
    }

    /// Set the number of transactions attempted per object (default: 10)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts.max(1);
        self
    }

    /// Set the ceiling of the retry sleep (default: 5000 ms)
    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.config.retry.max_backoff_ms = backoff.as_millis() as u64;
        self
    }

    /// Set the failure policy (default: best effort)
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    /// Build the configuration
    pub fn build(self) -> MigrationConfig {
        self.config
    }
}
