//! The syncable-record contract.
//!
//! The engine never interprets business fields. All it needs from a record
//! is a stable identifier, a soft-delete flag and the lifecycle timestamps,
//! which is what [`Versioned`] exposes. [`SyncRecord`] adds the static
//! facts the store needs to persist a type.

use crate::RecordId;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a record type's primary key is produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// The key is a natural value supplied by the application.
    Natural,
    /// The key is an integer generated by the owning store. Replicated rows
    /// must keep it verbatim instead of receiving a fresh one.
    Identity,
}

/// Foreign-key tier of a record type. Lower tiers sync first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPriority {
    /// Reference and master data (products, customers, branches).
    Reference,
    /// Transactional data referencing master data (orders, movements).
    Transactional,
    /// Financial data referencing transactions (invoices, payments).
    Financial,
}

impl fmt::Display for SyncPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Transactional => write!(f, "transactional"),
            Self::Financial => write!(f, "financial"),
        }
    }
}

/// Version information every syncable record exposes.
pub trait Versioned {
    /// The record's identifier.
    fn record_id(&self) -> RecordId;

    /// Whether the record is soft-deleted.
    fn is_deleted(&self) -> bool {
        false
    }

    fn created_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn updated_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        None
    }

    /// When the record last changed: the deletion time for deleted records,
    /// otherwise the update time, falling back to the creation time.
    fn changed_at(&self) -> Option<DateTime<Utc>> {
        if self.is_deleted() {
            self.deleted_at()
                .or_else(|| self.updated_at())
                .or_else(|| self.created_at())
        } else {
            self.updated_at().or_else(|| self.created_at())
        }
    }
}

/// A domain record that can be replicated between the two endpoints.
///
/// # Example
///
/// ```
/// use chrono::{DateTime, Utc};
/// use serde::{Deserialize, Serialize};
/// use tandem_types::{KeyStrategy, RecordId, SyncRecord, Versioned};
///
/// #[derive(Clone, Serialize, Deserialize)]
/// struct Branch {
///     code: String,
///     updated_at: Option<DateTime<Utc>>,
/// }
///
/// impl Versioned for Branch {
///     fn record_id(&self) -> RecordId {
///         RecordId::new(&self.code)
///     }
///     fn updated_at(&self) -> Option<DateTime<Utc>> {
///         self.updated_at
///     }
/// }
///
/// impl SyncRecord for Branch {
///     const TYPE_NAME: &'static str = "Branch";
/// }
///
/// assert_eq!(Branch::KEY, KeyStrategy::Natural);
/// assert!(!Branch::SOFT_DELETE);
/// ```
pub trait SyncRecord:
    Versioned + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    /// Registry tag and table name. Letters, digits and underscores only.
    const TYPE_NAME: &'static str;

    /// Whether the type carries soft-delete fields. Types without them are
    /// replicated as insert/update only.
    const SOFT_DELETE: bool = false;

    /// How the primary key is produced.
    const KEY: KeyStrategy = KeyStrategy::Natural;
}
