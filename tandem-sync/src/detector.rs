//! Change detection against one store.
//!
//! Detection reads typed records page by page and captures each one as a
//! [`ChangeRecord`] carrying a SHA-256 fingerprint of its canonical JSON.
//! The functions here block on SQLite; the orchestrator calls them from
//! blocking tasks.

use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::EngineResult;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tandem_store::{RecordStore, RowFilter};
use tandem_types::{ChangeRecord, ChangeType, RecordId, SyncRecord};
use tracing::{debug, warn};

/// Finds records changed since a checkpoint.
#[derive(Debug, Clone, Copy)]
pub struct ChangeDetector {
    batch_size: usize,
}

impl Default for ChangeDetector {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl ChangeDetector {
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Hex SHA-256 of the record's canonical JSON.
    ///
    /// The JSON is produced through `serde_json::Value`, whose object keys
    /// are ordered, so equal field values always give equal hashes.
    pub fn compute_hash<R: Serialize + ?Sized>(record: &R) -> EngineResult<String> {
        let canonical = serde_json::to_string(&serde_json::to_value(record)?)?;
        Ok(hex::encode(Sha256::digest(canonical.as_bytes())))
    }

    /// Live records created or updated after `since` (all of them when
    /// `since` is `None`). Soft-deleted rows are left out.
    pub fn get_changed<T: SyncRecord>(
        &self,
        store: &RecordStore,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<ChangeRecord>> {
        let records = self
            .read_pages::<T>(store, RowFilter::changed_since(since))
            .inspect_err(|e| {
                warn!("Change query for {} on {} failed: {}", T::TYPE_NAME, store.name(), e);
            })?;
        let changes = records
            .iter()
            .map(|record| capture(record, None))
            .collect::<EngineResult<Vec<_>>>()?;
        debug!(
            "Detected {} changed {} record(s) on {}",
            changes.len(),
            T::TYPE_NAME,
            store.name()
        );
        Ok(changes)
    }

    /// Soft-deleted records deleted after `since`. Types without soft-delete
    /// support never report deletions.
    pub fn get_deleted<T: SyncRecord>(
        &self,
        store: &RecordStore,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<ChangeRecord>> {
        if !T::SOFT_DELETE {
            return Ok(Vec::new());
        }
        let records = self
            .read_pages::<T>(store, RowFilter::deleted_since(since))
            .inspect_err(|e| {
                warn!("Deletion query for {} on {} failed: {}", T::TYPE_NAME, store.name(), e);
            })?;
        let changes = records
            .iter()
            .map(|record| capture(record, Some(ChangeType::Deleted)))
            .collect::<EngineResult<Vec<_>>>()?;
        debug!(
            "Detected {} deleted {} record(s) on {}",
            changes.len(),
            T::TYPE_NAME,
            store.name()
        );
        Ok(changes)
    }

    /// Current version of one record on a store, tombstones included.
    pub fn fetch<T: SyncRecord>(
        &self,
        store: &RecordStore,
        id: &RecordId,
    ) -> EngineResult<Option<ChangeRecord>> {
        let Some(record) = store.get::<T>(id)? else {
            return Ok(None);
        };
        let change_type = record.is_deleted().then_some(ChangeType::Deleted);
        Ok(Some(capture(&record, change_type)?))
    }

    fn read_pages<T: SyncRecord>(
        &self,
        store: &RecordStore,
        filter: RowFilter,
    ) -> EngineResult<Vec<T>> {
        let mut records = Vec::new();
        let mut offset = 0;
        loop {
            let page: Vec<T> = store.query(&filter.clone().page(self.batch_size, offset))?;
            let len = page.len();
            records.extend(page);
            if len < self.batch_size {
                break;
            }
            offset += len;
        }
        Ok(records)
    }
}

fn capture<T: SyncRecord>(record: &T, change_type: Option<ChangeType>) -> EngineResult<ChangeRecord> {
    let hash = ChangeDetector::compute_hash(record)?;
    Ok(ChangeRecord::capture(record, change_type, hash)?)
}
