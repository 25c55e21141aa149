//! Error types for the sync layer.

use tandem_store::StoreError;
use thiserror::Error;

/// Result type for engine operations.
///
/// Named apart from [`SyncResult`](crate::SyncResult), which is the report
/// a sync run produces.
pub type EngineResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storage error on either endpoint or the journal.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Record contract error (payload decoding, bad stored values).
    #[error("record error: {0}")]
    Record(#[from] tandem_types::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cloud store cannot be reached, or cloud work is disabled.
    #[error("offline: {0}")]
    Offline(String),

    /// Another run holds the run lock.
    #[error("sync already running")]
    AlreadyRunning,

    /// No handler is registered under this type name.
    #[error("unknown record type: {0}")]
    UnknownType(String),

    /// A handler with this type name is already registered.
    #[error("record type already registered: {0}")]
    DuplicateType(String),

    /// Entry not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The strategy left the conflict unresolved.
    #[error("conflict unresolved: {0}")]
    Unresolved(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A blocking task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(e: tokio::task::JoinError) -> Self {
        SyncError::Task(e.to_string())
    }
}
