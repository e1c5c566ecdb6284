//! Error types for schema model and migration operations

use thiserror::Error;

/// PostgreSQL SQLSTATE raised when a deadlock is detected
pub const SQLSTATE_DEADLOCK: &str = "40P01";

/// PostgreSQL SQLSTATE raised when a lock cannot be acquired (lock_timeout / NOWAIT)
pub const SQLSTATE_LOCK_NOT_AVAILABLE: &str = "55P03";

/// Errors that can occur while building or applying a schema model
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    #[error("Invalid dependency: {0}")]
    InvalidDependency(String),

    #[error("Unsupported migration: {0}")]
    UnsupportedMigration(String),

    #[error("Lock conflict: {0}")]
    LockConflict(String),

    #[error("Retries exhausted after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("SQL error: {0}")]
    Sql(sqlx::Error),

    #[error("Task error: {0}")]
    Task(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    pub fn duplicate(msg: impl Into<String>) -> Self {
        Self::DuplicateDefinition(msg.into())
    }

    pub fn invalid_dependency(msg: impl Into<String>) -> Self {
        Self::InvalidDependency(msg.into())
    }

    pub fn unsupported_migration(msg: impl Into<String>) -> Self {
        Self::UnsupportedMigration(msg.into())
    }

    pub fn lock_conflict(msg: impl Into<String>) -> Self {
        Self::LockConflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn task(msg: impl Into<String>) -> Self {
        Self::Task(msg.into())
    }

    /// True for deadlocks and lock timeouts, the only errors worth retrying
    pub fn is_lock_conflict(&self) -> bool {
        matches!(self, Self::LockConflict(_))
    }
}

impl From<sqlx::Error> for SchemaError {
    /// Translate driver errors, classifying catalog lock contention as
    /// [`SchemaError::LockConflict`] so the apply loop can retry it.
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if let Some(code) = db_err.code() {
                if code == SQLSTATE_DEADLOCK || code == SQLSTATE_LOCK_NOT_AVAILABLE {
                    return Self::LockConflict(format!("[{}] {}", code, db_err.message()));
                }
            }
        }
        Self::Sql(err)
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;
