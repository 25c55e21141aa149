mod common;

use chrono::Utc;
use common::{customer, invoice, jan1, product, registry, tombstone, Customer, Invoice, Product};
use std::sync::Arc;
use tandem_store::RecordStore;
use tandem_sync::{ChangeDetector, HandlerRegistry, RecordHandler, SyncError, TypedHandler};
use tandem_types::{RecordId, SyncPriority};
use tempfile::TempDir;

// ── Registry ─────────────────────────────────────────────────────

#[test]
fn handlers_are_ordered_by_priority_then_registration() {
    let registry = registry();
    assert_eq!(registry.len(), 3);
    assert_eq!(registry.type_names(), vec!["Product", "Customer", "Invoice"]);

    let priorities: Vec<SyncPriority> =
        registry.ordered().iter().map(|h| h.priority()).collect();
    assert_eq!(
        priorities,
        vec![
            SyncPriority::Reference,
            SyncPriority::Reference,
            SyncPriority::Financial
        ]
    );
}

#[test]
fn duplicate_type_is_rejected() {
    let mut registry = HandlerRegistry::new();
    registry.register::<Product>(SyncPriority::Reference).unwrap();

    let err = registry
        .register::<Product>(SyncPriority::Transactional)
        .err()
        .unwrap();
    assert!(matches!(err, SyncError::DuplicateType(name) if name == "Product"));
    assert_eq!(registry.len(), 1);
}

#[test]
fn lookup_by_type_name() {
    let registry = registry();
    let handler = registry.get("Invoice").unwrap();
    assert_eq!(handler.type_name(), "Invoice");
    assert!(handler.soft_delete());
    assert!(!registry.get("Customer").unwrap().soft_delete());
    assert!(registry.get("Warehouse").is_none());
}

#[test]
fn empty_registry() {
    let registry = HandlerRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.ordered().is_empty());
}

// ── Typed handler ────────────────────────────────────────────────

#[test]
fn typed_handler_moves_records_between_stores() {
    let dir = TempDir::new().unwrap();
    let source = RecordStore::open("local", dir.path().join("local.db")).unwrap();
    let target = RecordStore::open("cloud", dir.path().join("cloud.db")).unwrap();
    let handler: Arc<dyn RecordHandler> =
        Arc::new(TypedHandler::<Product>::new(SyncPriority::Reference));
    let detector = ChangeDetector::new(10);

    handler.prepare(&source).unwrap();
    handler.prepare(&target).unwrap();
    source.insert(&product(42, "Widget", 10, jan1())).unwrap();

    let changes = handler.get_changed(&detector, &source, None).unwrap();
    assert_eq!(changes.len(), 1);
    handler.apply_insert(&target, &changes[0]).unwrap();
    assert_eq!(
        target.get::<Product>(&RecordId::from(42)).unwrap(),
        Some(product(42, "Widget", 10, jan1()))
    );

    let mut edited = product(42, "Widget", 7, Utc::now());
    edited.name = "Widget v2".into();
    source.update(&edited).unwrap();
    let change = handler
        .fetch(&detector, &source, &RecordId::from(42))
        .unwrap()
        .unwrap();
    handler.apply_update(&target, &change).unwrap();
    assert_eq!(
        target.get::<Product>(&RecordId::from(42)).unwrap(),
        Some(edited)
    );

    assert!(handler.apply_delete(&target, &RecordId::from(42)).unwrap());
    assert!(!handler.apply_delete(&target, &RecordId::from(42)).unwrap());
}

#[test]
fn update_of_missing_row_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open("cloud", dir.path().join("cloud.db")).unwrap();
    let handler = TypedHandler::<Invoice>::new(SyncPriority::Financial);
    handler.prepare(&store).unwrap();

    let other = RecordStore::open("local", dir.path().join("local.db")).unwrap();
    handler.prepare(&other).unwrap();
    other.insert(&invoice(9, "C-1", 1250)).unwrap();
    let change = handler
        .fetch(&ChangeDetector::default(), &other, &RecordId::from(9))
        .unwrap()
        .unwrap();

    let err = handler.apply_update(&store, &change).unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[test]
fn insert_of_existing_key_fails() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open("cloud", dir.path().join("cloud.db")).unwrap();
    let handler = TypedHandler::<Customer>::new(SyncPriority::Reference);
    handler.prepare(&store).unwrap();
    store.insert(&customer("C-1", "Acme")).unwrap();

    let change = handler
        .fetch(&ChangeDetector::default(), &store, &RecordId::new("C-1"))
        .unwrap()
        .unwrap();
    assert!(handler.apply_insert(&store, &change).is_err());
}

#[test]
fn deleted_records_only_for_soft_delete_types() {
    let dir = TempDir::new().unwrap();
    let store = RecordStore::open("local", dir.path().join("local.db")).unwrap();
    let products = TypedHandler::<Product>::new(SyncPriority::Reference);
    let customers = TypedHandler::<Customer>::new(SyncPriority::Reference);
    products.prepare(&store).unwrap();
    customers.prepare(&store).unwrap();

    store
        .insert(&tombstone(product(1, "Gone", 0, jan1()), Utc::now()))
        .unwrap();
    store.insert(&customer("C-1", "Acme")).unwrap();

    let detector = ChangeDetector::new(10);
    assert_eq!(products.get_deleted(&detector, &store, None).unwrap().len(), 1);
    assert!(customers.get_deleted(&detector, &store, None).unwrap().is_empty());
}
