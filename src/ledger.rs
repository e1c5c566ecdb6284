//! Version ledger
//!
//! The ledger is the single source of truth for what has been applied to
//! the target: one version per (schema, kind, name). It is consulted before
//! and updated after every versioned apply, which makes reruns skip the
//! work that already succeeded.

use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::adapter::SchemaAdapter;
use crate::error::Result;
use crate::types::{ObjectType, Statement};

/// One row of the persisted ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub schema_name: String,
    pub object_type: ObjectType,
    pub object_name: String,
    pub version: i32,
    /// When the version was recorded
    pub applied: DateTime<Utc>,
}

/// Persisted record of applied object versions
#[async_trait]
pub trait VersionLedger: Send + Sync {
    /// Version currently recorded, 0 when the object was never applied
    async fn get_version(&self, schema: &str, object_type: ObjectType, name: &str) -> Result<i32>;

    /// Record that `version` has been applied
    async fn add_version(
        &self,
        schema: &str,
        object_type: ObjectType,
        name: &str,
        version: i32,
    ) -> Result<()>;

    /// Statement that records `version` as part of the caller's
    /// transaction. Ledgers kept outside the database return `None`.
    fn version_statement(
        &self,
        _schema: &str,
        _object_type: ObjectType,
        _name: &str,
        _version: i32,
    ) -> Option<Statement> {
        None
    }

    /// Take note of a version whose transaction has committed. Ledgers
    /// that persisted it through [`version_statement`](Self::version_statement)
    /// only refresh what they hold in memory.
    async fn confirm_version(
        &self,
        schema: &str,
        object_type: ObjectType,
        name: &str,
        version: i32,
    ) -> Result<()> {
        self.add_version(schema, object_type, name, version).await
    }

    /// True if `version` is newer than the recorded one
    async fn applies(
        &self,
        schema: &str,
        object_type: ObjectType,
        name: &str,
        version: i32,
    ) -> Result<bool> {
        Ok(version > self.get_version(schema, object_type, name).await?)
    }
}

type LedgerKey = (String, ObjectType, String);

fn lock_map<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// Transaction-bound ledger
// ============================================================================

/// Ledger view for one open transaction
///
/// Versions recorded here are written with the transaction's adapter, so
/// they commit or roll back together with the object's DDL. The underlying
/// ledger learns about them only when the returned [`StagedVersions`] are
/// confirmed after a successful commit.
pub struct TransactionalLedger<'a> {
    ledger: &'a dyn VersionLedger,
    adapter: &'a dyn SchemaAdapter,
    staged: Mutex<Vec<(LedgerKey, i32)>>,
}

impl<'a> TransactionalLedger<'a> {
    pub fn new(ledger: &'a dyn VersionLedger, adapter: &'a dyn SchemaAdapter) -> Self {
        Self {
            ledger,
            adapter,
            staged: Mutex::new(Vec::new()),
        }
    }

    /// Release the transaction and hand back what was recorded
    pub fn into_staged(self) -> StagedVersions {
        let versions = match self.staged.into_inner() {
            Ok(versions) => versions,
            Err(poisoned) => poisoned.into_inner(),
        };
        StagedVersions { versions }
    }
}

impl fmt::Debug for TransactionalLedger<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionalLedger")
            .field("staged", &lock_map(&self.staged).len())
            .finish()
    }
}

#[async_trait]
impl<'a> VersionLedger for TransactionalLedger<'a> {
    async fn get_version(&self, schema: &str, object_type: ObjectType, name: &str) -> Result<i32> {
        let staged = lock_map(&self.staged)
            .iter()
            .filter(|((s, t, n), _)| s == schema && *t == object_type && n == name)
            .map(|(_, version)| *version)
            .max();
        match staged {
            Some(version) => Ok(version),
            None => self.ledger.get_version(schema, object_type, name).await,
        }
    }

    async fn add_version(
        &self,
        schema: &str,
        object_type: ObjectType,
        name: &str,
        version: i32,
    ) -> Result<()> {
        if let Some(statement) = self.ledger.version_statement(schema, object_type, name, version) {
            self.adapter.run_statement(&statement).await?;
        }
        lock_map(&self.staged).push(((schema.to_string(), object_type, name.to_string()), version));
        Ok(())
    }
}

/// Versions written by a committed transaction, waiting to be confirmed
#[derive(Debug, Default)]
#[must_use]
pub struct StagedVersions {
    versions: Vec<(LedgerKey, i32)>,
}

impl StagedVersions {
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Pass the versions on to `ledger`. Call only after the transaction
    /// that wrote them has committed.
    pub async fn confirm(self, ledger: &dyn VersionLedger) -> Result<()> {
        for ((schema, object_type, name), version) in self.versions {
            ledger.confirm_version(&schema, object_type, &name, version).await?;
        }
        Ok(())
    }
}

// ============================================================================
// In-memory ledger
// ============================================================================

/// Ledger kept in memory. Used for dry runs and tests.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    versions: Mutex<HashMap<LedgerKey, i32>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a recorded version
    pub fn with_version(
        self,
        schema: impl Into<String>,
        object_type: ObjectType,
        name: impl Into<String>,
        version: i32,
    ) -> Self {
        self.record(schema.into(), object_type, name.into(), version);
        self
    }

    /// Number of objects with a recorded version
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of every recorded version
    pub fn snapshot(&self) -> Vec<(String, ObjectType, String, i32)> {
        let mut rows: Vec<_> = self
            .lock()
            .iter()
            .map(|((schema, ty, name), v)| (schema.clone(), *ty, name.clone(), *v))
            .collect();
        rows.sort();
        rows
    }

    fn record(&self, schema: String, object_type: ObjectType, name: String, version: i32) {
        let mut versions = self.lock();
        let current = versions.entry((schema, object_type, name)).or_insert(0);
        if version > *current {
            *current = version;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<LedgerKey, i32>> {
        lock_map(&self.versions)
    }
}

#[async_trait]
impl VersionLedger for InMemoryLedger {
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
        self.record(schema.to_string(), object_type, name.to_string(), version);
        Ok(())
    }
}
