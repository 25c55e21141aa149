//! Registry of syncable record types.
//!
//! Each registered type is represented by a [`RecordHandler`]: a small
//! object bundling the store operations the orchestrator needs for that
//! type, so a run can dispatch over heterogeneous types through one list.
//! The registry is built once at startup and ordered by
//! [`SyncPriority`] tier, then registration order.

use crate::detector::ChangeDetector;
use crate::error::{EngineResult, SyncError};
use chrono::{DateTime, Utc};
use std::marker::PhantomData;
use std::sync::Arc;
use tandem_store::RecordStore;
use tandem_types::{ChangeRecord, RecordId, SyncPriority, SyncRecord};

/// Type-erased store operations for one record type. All methods block.
pub trait RecordHandler: Send + Sync {
    /// Registry tag (the record's `TYPE_NAME`).
    fn type_name(&self) -> &'static str;

    fn priority(&self) -> SyncPriority;

    /// Whether the type carries soft-delete fields.
    fn soft_delete(&self) -> bool;

    /// Creates the type's table on `store` if needed.
    fn prepare(&self, store: &RecordStore) -> EngineResult<()>;

    fn get_changed(
        &self,
        detector: &ChangeDetector,
        store: &RecordStore,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<ChangeRecord>>;

    fn get_deleted(
        &self,
        detector: &ChangeDetector,
        store: &RecordStore,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<ChangeRecord>>;

    /// Current version on `store`, tombstones included.
    fn fetch(
        &self,
        detector: &ChangeDetector,
        store: &RecordStore,
        id: &RecordId,
    ) -> EngineResult<Option<ChangeRecord>>;

    /// Inserts the change's record under its own key.
    fn apply_insert(&self, store: &RecordStore, change: &ChangeRecord) -> EngineResult<()>;

    /// Overwrites the existing row with the change's record.
    fn apply_update(&self, store: &RecordStore, change: &ChangeRecord) -> EngineResult<()>;

    /// Removes the row. Returns false if it was already gone.
    fn apply_delete(&self, store: &RecordStore, id: &RecordId) -> EngineResult<bool>;
}

/// [`RecordHandler`] for a concrete [`SyncRecord`] type.
pub struct TypedHandler<T> {
    priority: SyncPriority,
    _record: PhantomData<fn() -> T>,
}

impl<T: SyncRecord> TypedHandler<T> {
    pub fn new(priority: SyncPriority) -> Self {
        Self {
            priority,
            _record: PhantomData,
        }
    }
}

impl<T: SyncRecord> RecordHandler for TypedHandler<T> {
    fn type_name(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn priority(&self) -> SyncPriority {
        self.priority
    }

    fn soft_delete(&self) -> bool {
        T::SOFT_DELETE
    }

    fn prepare(&self, store: &RecordStore) -> EngineResult<()> {
        Ok(store.ensure_table::<T>()?)
    }

    fn get_changed(
        &self,
        detector: &ChangeDetector,
        store: &RecordStore,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<ChangeRecord>> {
        detector.get_changed::<T>(store, since)
    }

    fn get_deleted(
        &self,
        detector: &ChangeDetector,
        store: &RecordStore,
        since: Option<DateTime<Utc>>,
    ) -> EngineResult<Vec<ChangeRecord>> {
        detector.get_deleted::<T>(store, since)
    }

    fn fetch(
        &self,
        detector: &ChangeDetector,
        store: &RecordStore,
        id: &RecordId,
    ) -> EngineResult<Option<ChangeRecord>> {
        detector.fetch::<T>(store, id)
    }

    fn apply_insert(&self, store: &RecordStore, change: &ChangeRecord) -> EngineResult<()> {
        let record: T = change.decode()?;
        Ok(store.insert(&record)?)
    }

    fn apply_update(&self, store: &RecordStore, change: &ChangeRecord) -> EngineResult<()> {
        let record: T = change.decode()?;
        if store.update(&record)? {
            Ok(())
        } else {
            Err(SyncError::NotFound(format!(
                "{}/{} on {}",
                T::TYPE_NAME,
                change.entity_id,
                store.name()
            )))
        }
    }

    fn apply_delete(&self, store: &RecordStore, id: &RecordId) -> EngineResult<bool> {
        Ok(store.delete::<T>(id)?)
    }
}

/// Ordered set of handlers, one per record type.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: Vec<Arc<dyn RecordHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a record type under its `TYPE_NAME`.
    pub fn register<T: SyncRecord>(&mut self, priority: SyncPriority) -> EngineResult<&mut Self> {
        self.register_handler(Arc::new(TypedHandler::<T>::new(priority)))?;
        Ok(self)
    }

    /// Registers a custom handler. Type names must be unique.
    pub fn register_handler(&mut self, handler: Arc<dyn RecordHandler>) -> EngineResult<()> {
        if self.get(handler.type_name()).is_some() {
            return Err(SyncError::DuplicateType(handler.type_name().to_string()));
        }
        self.handlers.push(handler);
        // Stable: registration order is kept within a tier.
        self.handlers.sort_by_key(|h| h.priority());
        Ok(())
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn RecordHandler>> {
        self.handlers
            .iter()
            .find(|h| h.type_name() == type_name)
            .cloned()
    }

    /// Handlers in sync order.
    pub fn ordered(&self) -> &[Arc<dyn RecordHandler>] {
        &self.handlers
    }

    pub fn type_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.type_name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
