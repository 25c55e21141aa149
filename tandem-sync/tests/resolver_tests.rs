use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use tandem_sync::{ConflictResolver, Side};
use tandem_types::{ConflictStrategy, RecordId, Versioned};

#[derive(Debug, Clone, PartialEq)]
struct Version {
    tag: &'static str,
    deleted: bool,
    created: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl Versioned for Version {
    fn record_id(&self) -> RecordId {
        RecordId::from(42)
    }
    fn is_deleted(&self) -> bool {
        self.deleted
    }
    fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created
    }
    fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated
    }
    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
}

fn version(tag: &'static str, created: Option<u32>, updated: Option<u32>) -> Version {
    Version {
        tag,
        deleted: false,
        created: created.map(at),
        updated: updated.map(at),
        deleted_at: None,
    }
}

/// A soft delete at `day` that left the update time alone.
fn deleted(mut v: Version, day: u32) -> Version {
    v.deleted = true;
    v.deleted_at = Some(at(day));
    v
}

// ── Conflict detection ───────────────────────────────────────────

#[test]
fn differing_update_times_conflict() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(1), Some(10));
    let cloud = version("cloud", Some(1), Some(15));
    assert!(resolver.has_conflict(&local, &cloud));
}

#[test]
fn equal_update_times_do_not_conflict() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(1), Some(10));
    let cloud = version("cloud", Some(1), Some(10));
    assert!(!resolver.has_conflict(&local, &cloud));
}

#[test]
fn missing_update_time_does_not_conflict() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(1), None);
    let cloud = version("cloud", Some(1), Some(10));
    assert!(!resolver.has_conflict(&local, &cloud));
    assert!(!resolver.has_conflict(&cloud, &local));
}

#[test]
fn deletion_mismatch_conflicts() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(1), Some(10));
    let mut cloud = local.clone();
    cloud.deleted = true;
    assert!(resolver.has_conflict(&local, &cloud));
}

// ── Strategies ───────────────────────────────────────────────────

#[test]
fn last_write_wins_picks_newer_local() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(1), Some(20));
    let cloud = version("cloud", Some(1), Some(15));

    let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::LastWriteWins);
    assert!(resolution.resolved);
    assert_eq!(resolution.side, Some(Side::Local));
    assert_eq!(resolution.winner.map(|v| v.tag), Some("local"));
    assert!(resolution.message.contains("Local version is newer"));
}

#[test]
fn last_write_wins_picks_newer_cloud() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(1), Some(10));
    let cloud = version("cloud", Some(1), Some(15));

    let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.side, Some(Side::Cloud));
    assert_eq!(resolution.winner.map(|v| v.tag), Some("cloud"));
}

#[test]
fn last_write_wins_tie_keeps_local() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(1), Some(10));
    let cloud = version("cloud", Some(2), Some(10));

    let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.side, Some(Side::Local));
}

#[test]
fn last_write_wins_falls_back_to_creation_time() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(5), None);
    let cloud = version("cloud", Some(3), None);

    let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.side, Some(Side::Local));

    // A side with any timestamp beats one without.
    let bare = version("cloud", None, None);
    let resolution = resolver.resolve(&local, &bare, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.side, Some(Side::Local));
    let resolution = resolver.resolve(&bare, &local, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.side, Some(Side::Cloud));
}

#[test]
fn last_write_wins_without_timestamps_keeps_local() {
    let resolver = ConflictResolver::new();
    let local = version("local", None, None);
    let cloud = version("cloud", None, None);

    let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::LastWriteWins);
    assert!(resolution.resolved);
    assert_eq!(resolution.side, Some(Side::Local));
    assert!(resolution.message.contains("Neither version has timestamps"));
}

#[test]
fn first_write_wins_picks_earlier_creation() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(5), Some(28));
    let cloud = version("cloud", Some(2), Some(3));

    let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::FirstWriteWins);
    assert_eq!(resolution.side, Some(Side::Cloud));

    let same = version("cloud", Some(5), Some(3));
    let resolution = resolver.resolve(&local, &same, ConflictStrategy::FirstWriteWins);
    assert_eq!(resolution.side, Some(Side::Local));
}

#[test]
fn first_write_wins_missing_creation_loses() {
    let resolver = ConflictResolver::new();
    let local = version("local", None, Some(1));
    let cloud = version("cloud", Some(20), Some(20));

    let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::FirstWriteWins);
    assert_eq!(resolution.side, Some(Side::Cloud));
}

#[test]
fn keep_strategies_are_unconditional() {
    let resolver = ConflictResolver::new();
    let old = version("local", Some(1), Some(1));
    let new = version("cloud", Some(1), Some(28));

    let keep_local = resolver.resolve(&old, &new, ConflictStrategy::KeepLocal);
    assert_eq!(keep_local.side, Some(Side::Local));
    assert_eq!(keep_local.message, "Keeping local version");

    let keep_cloud = resolver.resolve(&new, &old, ConflictStrategy::KeepCloud);
    assert_eq!(keep_cloud.side, Some(Side::Cloud));
    assert_eq!(keep_cloud.winner.map(|v| v.tag), Some("local"));
}

#[test]
fn manual_strategy_leaves_conflict_unresolved() {
    let resolver = ConflictResolver::new();
    let local = version("local", Some(1), Some(10));
    let cloud = version("cloud", Some(1), Some(15));

    let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::Manual);
    assert!(!resolution.resolved);
    assert!(resolution.winner.is_none());
    assert!(resolution.side.is_none());
    assert_eq!(resolution.message, "Manual resolution required for 42");
}

#[test]
fn last_write_wins_dates_a_deletion_by_its_deletion_time() {
    let resolver = ConflictResolver::new();
    let edit = version("edit", Some(1), Some(10));
    let tombstone = deleted(version("tombstone", Some(1), Some(1)), 12);

    let resolution = resolver.resolve(&edit, &tombstone, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.winner.map(|v| v.tag), Some("tombstone"));
    let resolution = resolver.resolve(&tombstone, &edit, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.winner.map(|v| v.tag), Some("tombstone"));

    // An edit made after the deletion survives it, from either side.
    let late_edit = version("edit", Some(1), Some(20));
    let resolution = resolver.resolve(&late_edit, &tombstone, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.winner.map(|v| v.tag), Some("edit"));
    let resolution = resolver.resolve(&tombstone, &late_edit, ConflictStrategy::LastWriteWins);
    assert_eq!(resolution.winner.map(|v| v.tag), Some("edit"));
}

#[test]
fn manual_strategy_also_parks_deletions() {
    let resolver = ConflictResolver::new();
    let edit = version("edit", Some(1), Some(10));
    let tombstone = deleted(version("tombstone", Some(1), Some(1)), 12);

    assert!(resolver.has_conflict(&edit, &tombstone));
    let resolution = resolver.resolve(&edit, &tombstone, ConflictStrategy::Manual);
    assert!(!resolution.resolved);
}

// ── Properties ───────────────────────────────────────────────────

fn arb_timestamp() -> impl Strategy<Value = Option<DateTime<Utc>>> {
    prop::option::of((0i64..100_000).prop_map(|secs| at(1) + Duration::seconds(secs)))
}

fn arb_version(tag: &'static str) -> impl Strategy<Value = Version> {
    (any::<bool>(), arb_timestamp(), arb_timestamp(), arb_timestamp()).prop_map(
        move |(deleted, created, updated, deleted_at)| Version {
            tag,
            deleted,
            created,
            updated,
            deleted_at: if deleted { deleted_at } else { None },
        },
    )
}

proptest! {
    #[test]
    fn last_write_wins_never_picks_the_older_side(
        local in arb_version("local"),
        cloud in arb_version("cloud"),
    ) {
        let resolver = ConflictResolver::new();
        let resolution = resolver.resolve(&local, &cloud, ConflictStrategy::LastWriteWins);
        prop_assert!(resolution.resolved);

        let l = local.changed_at();
        let c = cloud.changed_at();
        match resolution.side {
            Some(Side::Cloud) => prop_assert!(c > l),
            Some(Side::Local) => prop_assert!(l >= c),
            None => prop_assert!(false, "resolved without a side"),
        }
    }

    #[test]
    fn resolution_is_deterministic(
        local in arb_version("local"),
        cloud in arb_version("cloud"),
    ) {
        let resolver = ConflictResolver::new();
        for strategy in [
            ConflictStrategy::LastWriteWins,
            ConflictStrategy::FirstWriteWins,
            ConflictStrategy::KeepLocal,
            ConflictStrategy::KeepCloud,
        ] {
            let first = resolver.resolve(&local, &cloud, strategy);
            let second = resolver.resolve(&local, &cloud, strategy);
            prop_assert_eq!(first.side, second.side);
            prop_assert_eq!(first.message, second.message);
        }
    }

    #[test]
    fn conflict_detection_is_symmetric(
        local in arb_version("local"),
        cloud in arb_version("cloud"),
    ) {
        let resolver = ConflictResolver::new();
        prop_assert_eq!(
            resolver.has_conflict(&local, &cloud),
            resolver.has_conflict(&cloud, &local)
        );
    }
}
