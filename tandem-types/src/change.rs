//! Change records produced by change detection.
//!
//! A change record is the unit the orchestrator moves between endpoints.
//! It is ephemeral: it lives for one sync pass and is never persisted as-is.

use crate::{RecordId, SyncRecord, Versioned};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of change observed for a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeType {
    Created,
    Updated,
    Deleted,
}

impl ChangeType {
    /// Infers created vs. updated from the lifecycle timestamps: a record
    /// whose update time is absent or equal to its creation time is new.
    #[must_use]
    pub fn infer(created_at: Option<DateTime<Utc>>, updated_at: Option<DateTime<Utc>>) -> Self {
        match (created_at, updated_at) {
            (Some(_), None) => Self::Created,
            (Some(created), Some(updated)) if created == updated => Self::Created,
            _ => Self::Updated,
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Updated => write!(f, "Updated"),
            Self::Deleted => write!(f, "Deleted"),
        }
    }
}

impl FromStr for ChangeType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Created" => Ok(Self::Created),
            "Updated" => Ok(Self::Updated),
            "Deleted" => Ok(Self::Deleted),
            other => Err(crate::Error::InvalidValue(format!("change type: {other}"))),
        }
    }
}

/// A detected change to a single record, with its payload in opaque form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// The record type's registry tag.
    pub entity_type: String,
    /// The record's identifier.
    pub entity_id: RecordId,
    /// Kind of change.
    pub change_type: ChangeType,
    /// When the change happened, derived from the record's timestamps.
    pub changed_at: Option<DateTime<Utc>>,
    /// Soft-delete flag captured from the record.
    pub is_deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    /// Full serialized record.
    pub payload: serde_json::Value,
    /// Digest of the serialized payload.
    pub content_hash: String,
}

impl ChangeRecord {
    /// Captures a typed record as a change record.
    ///
    /// The change type is inferred from the timestamps unless the caller
    /// tags it explicitly (the deleted-record path does).
    pub fn capture<T: SyncRecord>(
        record: &T,
        change_type: Option<ChangeType>,
        content_hash: impl Into<String>,
    ) -> crate::Result<Self> {
        let change_type = change_type
            .unwrap_or_else(|| ChangeType::infer(record.created_at(), record.updated_at()));
        Ok(Self {
            entity_type: T::TYPE_NAME.to_string(),
            entity_id: record.record_id(),
            change_type,
            changed_at: record.changed_at(),
            is_deleted: record.is_deleted(),
            created_at: record.created_at(),
            updated_at: record.updated_at(),
            deleted_at: record.deleted_at(),
            payload: serde_json::to_value(record)?,
            content_hash: content_hash.into(),
        })
    }

    /// Decodes the payload back into its typed record.
    pub fn decode<T: SyncRecord>(&self) -> crate::Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }

    /// Returns true if this change is a deletion.
    #[must_use]
    pub fn is_deletion(&self) -> bool {
        self.change_type == ChangeType::Deleted
    }
}

impl Versioned for ChangeRecord {
    fn record_id(&self) -> RecordId {
        self.entity_id.clone()
    }

    fn is_deleted(&self) -> bool {
        self.is_deleted
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}
