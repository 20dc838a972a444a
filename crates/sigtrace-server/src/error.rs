//! Server error type.

use sigtrace_storage::StorageError;

/// Errors raised by the ingestion pipeline and the service object.
///
/// Everything except [`ServerError::Config`] ends the current pipeline
/// generation; the supervisor in [`crate::SignatureServer::run_supervised`]
/// then starts a fresh one.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Socket or listener failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Durable store failure outside of a flush.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A thread panicked while holding the durable store lock.
    #[error("durable store lock poisoned")]
    LockPoisoned,

    /// The observation queue consumer is gone.
    #[error("observation queue closed")]
    QueueClosed,

    /// The merge loop thread panicked or was cancelled.
    #[error("merge loop stopped abnormally: {0}")]
    MergeLoopPanicked(String),

    /// An environment variable held an unusable value.
    #[error("invalid configuration {key}: {reason}")]
    Config { key: String, reason: String },
}
