//! Error types for the storage layer.

use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Record or journal entry not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A row with the same key already exists.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// The endpoint could not be opened.
    #[error("endpoint {name} unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    /// Invalid data (bad identifiers, unparsable stored values).
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl From<tandem_types::Error> for StoreError {
    fn from(e: tandem_types::Error) -> Self {
        match e {
            tandem_types::Error::Serialization(e) => StoreError::Serialization(e),
            other => StoreError::InvalidData(other.to_string()),
        }
    }
}
