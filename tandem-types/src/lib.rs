//! Core type definitions for tandem.
//!
//! This crate defines the fundamental, domain-agnostic types used by the
//! store and the sync engine:
//! - Record identifiers and the syncable-record contract
//! - Change records produced by change detection
//! - Durable bookkeeping (sync metadata and sync logs)
//! - Connection modes and conflict strategies
//!
//! Business entities (inventory, CRM, finance records) belong to the
//! application. They only need to implement [`SyncRecord`].

mod change;
mod ids;
mod journal;
mod mode;
mod record;
pub mod timestamp;

pub use change::{ChangeRecord, ChangeType};
pub use ids::RecordId;
pub use journal::{
    MetadataStatus, SyncDirection, SyncLog, SyncLogStatus, SyncMetadata, SyncType, TypeSummary,
};
pub use mode::{ConflictStrategy, ConnectionMode};
pub use record::{KeyStrategy, SyncPriority, SyncRecord, Versioned};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),
}
