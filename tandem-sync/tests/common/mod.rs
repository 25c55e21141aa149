#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tandem_store::{RecordStore, SyncJournal};
use tandem_sync::{
    EndpointConfig, HandlerRegistry, NetworkProbe, RetryConfig, SyncConfig, SyncOrchestrator,
};
use tandem_types::timestamp::utc;
use tandem_types::{KeyStrategy, RecordId, SyncPriority, SyncRecord, Versioned};
use tempfile::TempDir;
use tokio::sync::Notify;

// ── Record types ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub quantity_on_hand: i64,
    pub is_deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Versioned for Product {
    fn record_id(&self) -> RecordId {
        RecordId::from(self.id)
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

impl SyncRecord for Product {
    const TYPE_NAME: &'static str = "Product";
    const SOFT_DELETE: bool = true;
    const KEY: KeyStrategy = KeyStrategy::Identity;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub code: String,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Versioned for Customer {
    fn record_id(&self) -> RecordId {
        RecordId::new(&self.code)
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

impl SyncRecord for Customer {
    const TYPE_NAME: &'static str = "Customer";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: i64,
    pub customer: String,
    pub total_cents: i64,
    pub is_deleted: bool,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Versioned for Invoice {
    fn record_id(&self) -> RecordId {
        RecordId::from(self.id)
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

impl SyncRecord for Invoice {
    const TYPE_NAME: &'static str = "Invoice";
    const SOFT_DELETE: bool = true;
    const KEY: KeyStrategy = KeyStrategy::Identity;
}

pub fn jan1() -> DateTime<Utc> {
    utc(2024, 1, 1, 0, 0, 0).unwrap()
}

pub fn product(id: i64, name: &str, qty: i64, updated: DateTime<Utc>) -> Product {
    Product {
        id,
        name: name.into(),
        quantity_on_hand: qty,
        is_deleted: false,
        created_at: Some(jan1()),
        updated_at: Some(updated),
        deleted_at: None,
    }
}

pub fn customer(code: &str, name: &str) -> Customer {
    Customer {
        code: code.into(),
        name: name.into(),
        created_at: Some(jan1()),
        updated_at: Some(jan1()),
    }
}

pub fn invoice(id: i64, customer: &str, total_cents: i64) -> Invoice {
    Invoice {
        id,
        customer: customer.into(),
        total_cents,
        is_deleted: false,
        created_at: Some(jan1()),
        updated_at: Some(jan1()),
        deleted_at: None,
    }
}

/// Soft-deletes a product at `at`.
pub fn tombstone(mut p: Product, at: DateTime<Utc>) -> Product {
    p.is_deleted = true;
    p.updated_at = Some(at);
    p.deleted_at = Some(at);
    p
}

/// Soft-deletes a product at `at` without touching its update time, as
/// applications that only stamp `deleted_at` do.
pub fn soft_delete(mut p: Product, at: DateTime<Utc>) -> Product {
    p.is_deleted = true;
    p.deleted_at = Some(at);
    p
}

// ── Network probe ────────────────────────────────────────────────

/// Probe with a switchable answer. `hold_next_call` parks the next caller
/// until the returned handle is notified.
#[derive(Default)]
pub struct FakeProbe {
    online: AtomicBool,
    calls: AtomicUsize,
    hold: Mutex<Option<Arc<Notify>>>,
}

impl FakeProbe {
    pub fn new(online: bool) -> Arc<Self> {
        let probe = Self::default();
        probe.online.store(online, Ordering::SeqCst);
        Arc::new(probe)
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn hold_next_call(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.hold.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }
}

#[async_trait]
impl NetworkProbe for FakeProbe {
    async fn is_network_available(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.hold.lock().unwrap().take();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.online.load(Ordering::SeqCst)
    }
}

// ── Environment ──────────────────────────────────────────────────

pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register::<Invoice>(SyncPriority::Financial)
        .unwrap()
        .register::<Product>(SyncPriority::Reference)
        .unwrap()
        .register::<Customer>(SyncPriority::Reference)
        .unwrap();
    registry
}

pub fn test_config(dir: &TempDir) -> SyncConfig {
    SyncConfig {
        local: EndpointConfig::new("local", dir.path().join("local.db")),
        cloud: EndpointConfig::new("cloud", dir.path().join("cloud.db")),
        retry: RetryConfig {
            max_retries: 2,
            base_delay_ms: 1,
            exponential: false,
        },
        batch_size: 2,
        ..SyncConfig::default()
    }
}

/// Two on-disk endpoints with every test type registered.
pub struct TestEnv {
    pub dir: TempDir,
    pub probe: Arc<FakeProbe>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(customize: impl FnOnce(&mut SyncConfig)) -> Self {
        Self::build(customize, registry())
    }

    pub fn with_registry(registry: HandlerRegistry) -> Self {
        Self::build(|_| {}, registry)
    }

    fn build(customize: impl FnOnce(&mut SyncConfig), registry: HandlerRegistry) -> Self {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(&dir);
        customize(&mut config);
        RecordStore::open(&config.cloud.name, &config.cloud.connection).unwrap();
        let probe = FakeProbe::new(true);
        let orchestrator =
            SyncOrchestrator::from_config(&config, registry, probe.clone()).unwrap();

        let cloud = orchestrator.connectivity().cloud();
        cloud.ensure_table::<Product>().unwrap();
        cloud.ensure_table::<Customer>().unwrap();
        cloud.ensure_table::<Invoice>().unwrap();

        Self {
            dir,
            probe,
            orchestrator: Arc::new(orchestrator),
        }
    }

    pub fn local(&self) -> &RecordStore {
        self.orchestrator.connectivity().local()
    }

    pub fn cloud(&self) -> &RecordStore {
        self.orchestrator.connectivity().cloud()
    }

    pub fn journal(&self) -> &SyncJournal {
        self.orchestrator.journal()
    }
}
