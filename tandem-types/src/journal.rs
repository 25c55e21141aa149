//! Durable bookkeeping types: per-record sync metadata and per-run logs.

use crate::RecordId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Direction a record travelled in its last sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncDirection {
    /// Local store to cloud store.
    Push,
    /// Cloud store to local store.
    Pull,
    /// Winner written to both stores (manual conflict resolution).
    Both,
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Push => write!(f, "Push"),
            Self::Pull => write!(f, "Pull"),
            Self::Both => write!(f, "Both"),
        }
    }
}

impl FromStr for SyncDirection {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Push" => Ok(Self::Push),
            "Pull" => Ok(Self::Pull),
            "Both" => Ok(Self::Both),
            other => Err(crate::Error::InvalidValue(format!("sync direction: {other}"))),
        }
    }
}

/// State of a record's metadata entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetadataStatus {
    /// Both stores hold the version recorded by the content hash.
    Synced,
    /// A conflict was left unresolved and awaits an operator.
    Conflict,
}

impl fmt::Display for MetadataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synced => write!(f, "Synced"),
            Self::Conflict => write!(f, "Conflict"),
        }
    }
}

impl FromStr for MetadataStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Synced" => Ok(Self::Synced),
            "Conflict" => Ok(Self::Conflict),
            other => Err(crate::Error::InvalidValue(format!("metadata status: {other}"))),
        }
    }
}

/// Durable per-record sync bookkeeping, keyed by (entity type, entity id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Row identifier, assigned by the journal.
    pub id: Option<i64>,
    pub entity_type: String,
    pub entity_id: RecordId,
    /// When the record was last applied.
    pub last_synced_at: DateTime<Utc>,
    /// Content hash of the version that was applied.
    pub content_hash: String,
    pub direction: SyncDirection,
    pub status: MetadataStatus,
    /// Explanation attached to unresolved conflicts.
    pub message: Option<String>,
}

impl SyncMetadata {
    /// Metadata for a successfully applied record.
    #[must_use]
    pub fn synced(
        entity_type: impl Into<String>,
        entity_id: RecordId,
        content_hash: impl Into<String>,
        direction: SyncDirection,
    ) -> Self {
        Self {
            id: None,
            entity_type: entity_type.into(),
            entity_id,
            last_synced_at: Utc::now(),
            content_hash: content_hash.into(),
            direction,
            status: MetadataStatus::Synced,
            message: None,
        }
    }

    /// Returns true if a change observed at `changed_at` still needs to be
    /// processed. Changes without a timestamp are always processed.
    #[must_use]
    pub fn is_stale_for(&self, changed_at: Option<DateTime<Utc>>) -> bool {
        match changed_at {
            Some(ts) => self.last_synced_at < ts,
            None => true,
        }
    }
}

/// Scope of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncType {
    /// Every record of every type, both directions.
    Full,
    /// Changes since the checkpoint, both directions.
    Incremental,
    /// Local to cloud only.
    Push,
    /// Cloud to local only.
    Pull,
    /// One record type, both directions.
    Single,
}

impl SyncType {
    /// Whether a successful run of this type reconciled every registered
    /// type in both directions, and so can serve as a checkpoint.
    #[must_use]
    pub fn is_checkpoint(self) -> bool {
        matches!(self, Self::Full | Self::Incremental)
    }
}

impl fmt::Display for SyncType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "Full"),
            Self::Incremental => write!(f, "Incremental"),
            Self::Push => write!(f, "Push"),
            Self::Pull => write!(f, "Pull"),
            Self::Single => write!(f, "Single"),
        }
    }
}

impl FromStr for SyncType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Full" => Ok(Self::Full),
            "Incremental" => Ok(Self::Incremental),
            "Push" => Ok(Self::Push),
            "Pull" => Ok(Self::Pull),
            "Single" => Ok(Self::Single),
            other => Err(crate::Error::InvalidValue(format!("sync type: {other}"))),
        }
    }
}

/// Final status of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncLogStatus {
    Completed,
    Failed,
}

impl fmt::Display for SyncLogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

impl FromStr for SyncLogStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Completed" => Ok(Self::Completed),
            "Failed" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidValue(format!("sync log status: {other}"))),
        }
    }
}

/// Per-record-type counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub entity_type: String,
    /// Records written to the cloud store.
    pub pushed: u64,
    /// Records written to the local store.
    pub pulled: u64,
    pub failed: u64,
    pub conflicts: u64,
    /// Changes already in sync or superseded by the other side.
    pub skipped: u64,
}

impl TypeSummary {
    #[must_use]
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            ..Default::default()
        }
    }

    /// Records written in either direction.
    #[must_use]
    pub fn synced(&self) -> u64 {
        self.pushed + self.pulled
    }
}

/// One row per sync run. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLog {
    /// Row identifier, assigned by the journal.
    pub id: Option<i64>,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub sync_type: SyncType,
    pub status: SyncLogStatus,
    pub entities_synced: u64,
    pub entities_failed: u64,
    pub conflicts_detected: u64,
    pub conflicts_resolved: u64,
    pub error_message: Option<String>,
    #[serde(default)]
    pub per_type: Vec<TypeSummary>,
    #[serde(default)]
    pub errors: Vec<String>,
}
