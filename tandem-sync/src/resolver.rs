//! Conflict detection and resolution between a local and a cloud version.
//!
//! The resolver only looks at the version fields exposed by [`Versioned`],
//! so it works the same for typed records and for change records.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use tandem_types::timestamp::{max_timestamp, min_timestamp};
use tandem_types::{ConflictStrategy, Versioned};

/// Which store a version came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Local,
    Cloud,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

/// Outcome of resolving one conflict.
#[derive(Debug)]
pub struct Resolution<'a, V: ?Sized> {
    /// False when the strategy leaves the decision to an operator.
    pub resolved: bool,
    /// The winning version, when resolved.
    pub winner: Option<&'a V>,
    /// Which side won, when resolved.
    pub side: Option<Side>,
    pub message: String,
}

impl<'a, V: ?Sized> Resolution<'a, V> {
    fn won(winner: &'a V, side: Side, message: impl Into<String>) -> Self {
        Self {
            resolved: true,
            winner: Some(winner),
            side: Some(side),
            message: message.into(),
        }
    }

    fn unresolved(message: impl Into<String>) -> Self {
        Self {
            resolved: false,
            winner: None,
            side: None,
            message: message.into(),
        }
    }
}

/// Stateless conflict resolver.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    /// Two versions conflict if both carry an update time and the times
    /// differ, or if one side is deleted and the other is not.
    pub fn has_conflict<L, C>(&self, local: &L, cloud: &C) -> bool
    where
        L: Versioned + ?Sized,
        C: Versioned + ?Sized,
    {
        if local.is_deleted() != cloud.is_deleted() {
            return true;
        }
        matches!(
            (local.updated_at(), cloud.updated_at()),
            (Some(l), Some(c)) if l != c
        )
    }

    /// Picks a winner under `strategy`.
    ///
    /// `LastWriteWins` compares [`Versioned::changed_at`], so a deletion is
    /// dated by its deletion time and a deletion racing an edit is decided
    /// the same way whichever side deleted. Exact timestamp ties, and versions missing the timestamps a strategy
    /// needs, resolve to the local side.
    pub fn resolve<'a, V>(
        &self,
        local: &'a V,
        cloud: &'a V,
        strategy: ConflictStrategy,
    ) -> Resolution<'a, V>
    where
        V: Versioned + ?Sized,
    {
        match strategy {
            ConflictStrategy::LastWriteWins => {
                let l = local.changed_at();
                let c = cloud.changed_at();
                if l.is_none() && c.is_none() {
                    return Resolution::won(
                        local,
                        Side::Local,
                        "Neither version has timestamps; keeping local",
                    );
                }
                let l = l.unwrap_or_else(min_timestamp);
                let c = c.unwrap_or_else(min_timestamp);
                match c.cmp(&l) {
                    Ordering::Greater => Resolution::won(
                        cloud,
                        Side::Cloud,
                        format!("Cloud version is newer ({c} > {l})"),
                    ),
                    Ordering::Less => Resolution::won(
                        local,
                        Side::Local,
                        format!("Local version is newer ({l} > {c})"),
                    ),
                    Ordering::Equal => Resolution::won(
                        local,
                        Side::Local,
                        format!("Versions written at the same time ({l}); keeping local"),
                    ),
                }
            }
            ConflictStrategy::FirstWriteWins => {
                let l = local.created_at();
                let c = cloud.created_at();
                if l.is_none() && c.is_none() {
                    return Resolution::won(
                        local,
                        Side::Local,
                        "Neither version has a creation time; keeping local",
                    );
                }
                let l = l.unwrap_or_else(max_timestamp);
                let c = c.unwrap_or_else(max_timestamp);
                if c < l {
                    Resolution::won(
                        cloud,
                        Side::Cloud,
                        format!("Cloud version was created first ({c} < {l})"),
                    )
                } else {
                    Resolution::won(
                        local,
                        Side::Local,
                        format!("Local version was created first or at the same time ({l})"),
                    )
                }
            }
            ConflictStrategy::KeepLocal => {
                Resolution::won(local, Side::Local, "Keeping local version")
            }
            ConflictStrategy::KeepCloud => {
                Resolution::won(cloud, Side::Cloud, "Keeping cloud version")
            }
            ConflictStrategy::Manual => Resolution::unresolved(format!(
                "Manual resolution required for {}",
                local.record_id()
            )),
        }
    }
}
