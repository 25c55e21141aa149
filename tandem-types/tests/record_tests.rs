use chrono::{DateTime, Duration, Utc};
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use tandem_types::timestamp::utc;
use tandem_types::{
    ChangeRecord, ChangeType, KeyStrategy, RecordId, SyncPriority, SyncRecord, Versioned,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Item {
    id: i64,
    name: String,
    is_deleted: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Versioned for Item {
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

impl SyncRecord for Item {
    const TYPE_NAME: &'static str = "Item";
    const SOFT_DELETE: bool = true;
    const KEY: KeyStrategy = KeyStrategy::Identity;
}

fn item(created: Option<DateTime<Utc>>, updated: Option<DateTime<Utc>>) -> Item {
    Item {
        id: 1,
        name: "widget".into(),
        is_deleted: false,
        created_at: created,
        updated_at: updated,
        deleted_at: None,
    }
}

fn jan(day: u32) -> DateTime<Utc> {
    utc(2024, 1, day, 0, 0, 0).unwrap()
}

// ── changed_at ───────────────────────────────────────────────────

#[test]
fn changed_at_prefers_updated() {
    assert_eq!(item(Some(jan(1)), Some(jan(5))).changed_at(), Some(jan(5)));
}

#[test]
fn changed_at_falls_back_to_created() {
    assert_eq!(item(Some(jan(1)), None).changed_at(), Some(jan(1)));
}

#[test]
fn changed_at_uses_deleted_at_for_tombstones() {
    let mut it = item(Some(jan(1)), Some(jan(2)));
    it.is_deleted = true;
    it.deleted_at = Some(jan(9));
    assert_eq!(it.changed_at(), Some(jan(9)));
}

#[test]
fn changed_at_for_tombstone_without_deleted_at() {
    let mut it = item(Some(jan(1)), Some(jan(2)));
    it.is_deleted = true;
    assert_eq!(it.changed_at(), Some(jan(2)));
}

#[test]
fn changed_at_none_without_timestamps() {
    assert_eq!(item(None, None).changed_at(), None);
}

// ── ChangeType inference ─────────────────────────────────────────

#[test]
fn infer_created_when_never_updated() {
    assert_eq!(ChangeType::infer(Some(jan(1)), None), ChangeType::Created);
}

#[test]
fn infer_created_when_update_equals_creation() {
    assert_eq!(ChangeType::infer(Some(jan(1)), Some(jan(1))), ChangeType::Created);
}

#[test]
fn infer_updated_otherwise() {
    assert_eq!(ChangeType::infer(Some(jan(1)), Some(jan(2))), ChangeType::Updated);
    assert_eq!(ChangeType::infer(None, Some(jan(2))), ChangeType::Updated);
    assert_eq!(ChangeType::infer(None, None), ChangeType::Updated);
}

#[test]
fn change_type_parse_roundtrip() {
    for ct in [ChangeType::Created, ChangeType::Updated, ChangeType::Deleted] {
        assert_eq!(ct.to_string().parse::<ChangeType>().unwrap(), ct);
    }
    assert!("Moved".parse::<ChangeType>().is_err());
}

// ── ChangeRecord ─────────────────────────────────────────────────

#[test]
fn capture_copies_contract_fields() {
    let it = item(Some(jan(1)), Some(jan(3)));
    let change = ChangeRecord::capture(&it, None, "abc").unwrap();

    assert_eq!(change.entity_type, "Item");
    assert_eq!(change.entity_id, RecordId::from(1));
    assert_eq!(change.change_type, ChangeType::Updated);
    assert_eq!(change.changed_at, Some(jan(3)));
    assert_eq!(change.content_hash, "abc");
    assert!(!change.is_deletion());
    assert_eq!(change.payload["name"], "widget");
}

#[test]
fn capture_respects_explicit_tag() {
    let mut it = item(Some(jan(1)), None);
    it.is_deleted = true;
    it.deleted_at = Some(jan(4));
    let change = ChangeRecord::capture(&it, Some(ChangeType::Deleted), "h").unwrap();
    assert!(change.is_deletion());
    assert!(change.is_deleted());
    assert_eq!(change.changed_at(), Some(jan(4)));
}

#[test]
fn decode_restores_typed_record() {
    let it = item(Some(jan(1)), Some(jan(2)));
    let change = ChangeRecord::capture(&it, None, "h").unwrap();
    let back: Item = change.decode().unwrap();
    assert_eq!(back, it);
}

#[test]
fn record_contract_constants() {
    assert_eq!(Item::TYPE_NAME, "Item");
    assert!(Item::SOFT_DELETE);
    assert_eq!(Item::KEY, KeyStrategy::Identity);
}

#[test]
fn priority_tiers_order() {
    assert!(SyncPriority::Reference < SyncPriority::Transactional);
    assert!(SyncPriority::Transactional < SyncPriority::Financial);
}

// ── Properties ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn changed_at_never_precedes_creation(created in 0i64..10_000, delta in 0i64..10_000) {
        let created_at = jan(1) + Duration::seconds(created);
        let updated_at = created_at + Duration::seconds(delta);
        let it = item(Some(created_at), Some(updated_at));
        prop_assert!(it.changed_at().unwrap() >= created_at);
        let expected = if delta == 0 { ChangeType::Created } else { ChangeType::Updated };
        prop_assert_eq!(ChangeType::infer(it.created_at, it.updated_at), expected);
    }
}
