//! Storage error types for sigtrace-storage.
//!
//! [`StorageError`] covers all anticipated failure modes in the storage layer:
//! serialization, database and migration failures, rejected contracts and
//! aborted transactions.

use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The SQLite backend reported an error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Applying schema migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A contract or signature was rejected by the core model.
    #[error(transparent)]
    Contract(#[from] sigtrace_core::CoreError),

    /// An atomic unit of work was abandoned and rolled back.
    #[error("transaction aborted: {reason}")]
    TransactionAborted { reason: String },
}
