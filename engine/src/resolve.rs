//! Deterministic conflict resolution between record versions.
//!
//! Resolution runs one layer above the record store: the store only ever
//! sees whole winning versions. The chain is fixed:
//!
//! 1. Causal dominance - a strictly later vector clock wins outright.
//! 2. Wall-clock tiebreak - for concurrent clocks, the later `updated_at`
//!    wins.
//! 3. Existence tiebreak - a record beats a concurrent removal when the
//!    wall clocks tie; losing a user's add silently is the worse failure.
//! 4. Device tiebreak - two present versions with equal clocks and equal
//!    timestamps fall to the lexicographically greater `device_id`.
//!
//! Whatever wins carries `merge(local.clock, remote.clock)` so causal
//! history survives into future comparisons.

use crate::{Causality, DeviceId, ItemId, Timestamp, UserId, VectorClock, WatchlistItem};
use serde::{Deserialize, Serialize};

/// Which side a resolution kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolveAction {
    /// The local version stands.
    KeepLocal,
    /// The remote version replaces the local one.
    UpdateFromRemote,
}

/// Result of resolving two present versions of the same record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// The surviving version, clock already merged.
    pub winner: WatchlistItem,
    pub action: ResolveAction,
}

/// A removal intent from another device or session, competing with a
/// still-present local record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovalNotice {
    pub user_id: UserId,
    pub item_id: ItemId,
    /// Clock stamped on the removal when it was issued
    pub vector_clock: VectorClock,
    /// Wall-clock time of the removal
    pub updated_at: Timestamp,
    pub device_id: DeviceId,
}

/// Result of resolving a present record against a removal intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum RemovalOutcome {
    /// The record survives, clock merged with the removal's clock.
    KeepLocal { winner: WatchlistItem },
    /// The removal supersedes the record; delete it.
    Delete,
}

/// Resolve two present versions of the same keyed record.
///
/// Versions for different keys do not conflict; the local version is
/// returned untouched (defensive - dispatch is per key upstream).
pub fn resolve(local: &WatchlistItem, remote: &WatchlistItem) -> Resolution {
    if !local.same_key(remote) {
        return Resolution {
            winner: local.clone(),
            action: ResolveAction::KeepLocal,
        };
    }

    let merged = local.vector_clock.merge(&remote.vector_clock);
    let (mut winner, action) = match local.vector_clock.compare(&remote.vector_clock) {
        Causality::After => (local.clone(), ResolveAction::KeepLocal),
        Causality::Before => (remote.clone(), ResolveAction::UpdateFromRemote),
        Causality::Concurrent => pick_concurrent(local, remote),
    };
    winner.vector_clock = merged;

    Resolution { winner, action }
}

/// Resolve a present local record against a concurrent removal.
pub fn resolve_removal(local: &WatchlistItem, removal: &RemovalNotice) -> RemovalOutcome {
    if local.user_id != removal.user_id || local.item_id != removal.item_id {
        return RemovalOutcome::KeepLocal {
            winner: local.clone(),
        };
    }

    let survives = match local.vector_clock.compare(&removal.vector_clock) {
        Causality::After => true,
        Causality::Before => false,
        // Later wall clock wins; on a full tie the record survives.
        Causality::Concurrent => local.updated_at >= removal.updated_at,
    };

    if survives {
        let mut winner = local.clone();
        winner.vector_clock = local.vector_clock.merge(&removal.vector_clock);
        RemovalOutcome::KeepLocal { winner }
    } else {
        RemovalOutcome::Delete
    }
}

/// Tiebreak for concurrent clocks: later wall clock, then greater device
/// id. Fixed and total - never iteration order.
fn pick_concurrent(local: &WatchlistItem, remote: &WatchlistItem) -> (WatchlistItem, ResolveAction) {
    match local.updated_at.cmp(&remote.updated_at) {
        std::cmp::Ordering::Greater => (local.clone(), ResolveAction::KeepLocal),
        std::cmp::Ordering::Less => (remote.clone(), ResolveAction::UpdateFromRemote),
        std::cmp::Ordering::Equal => {
            if local.device_id >= remote.device_id {
                (local.clone(), ResolveAction::KeepLocal)
            } else {
                (remote.clone(), ResolveAction::UpdateFromRemote)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(
        device: &str,
        clock: VectorClock,
        updated_at: Timestamp,
        title: &str,
    ) -> WatchlistItem {
        let mut record = WatchlistItem::new(
            "42",
            "user-1",
            title,
            "https://img/dune.jpg",
            2021,
            100,
            clock,
            device,
        );
        record.updated_at = updated_at;
        record
    }

    #[test]
    fn dominating_clock_wins_outright() {
        let base = VectorClock::new().increment("device-a");
        let local = item("device-a", base.clone(), 900, "old");
        // Remote saw local's version and edited on top of it.
        let remote = item("device-b", base.increment("device-b"), 100, "new");

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.action, ResolveAction::UpdateFromRemote);
        assert_eq!(resolution.winner.title, "new");
        // Dominance beats wall clock: remote's timestamp is older.
        assert_eq!(resolution.winner.updated_at, 100);
    }

    #[test]
    fn concurrent_clocks_fall_to_wall_clock() {
        let local = item("device-a", VectorClock::new().increment("device-a"), 100, "a");
        let remote = item("device-b", VectorClock::new().increment("device-b"), 200, "b");

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.action, ResolveAction::UpdateFromRemote);
        assert_eq!(resolution.winner.title, "b");
        // Merged clock covers both devices: {A:1, B:1}.
        assert_eq!(resolution.winner.vector_clock.get("device-a"), 1);
        assert_eq!(resolution.winner.vector_clock.get("device-b"), 1);
    }

    #[test]
    fn winner_keeps_merged_clock_when_local_wins() {
        let local = item("device-a", VectorClock::new().increment("device-a"), 300, "a");
        let remote = item("device-b", VectorClock::new().increment("device-b"), 200, "b");

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.action, ResolveAction::KeepLocal);
        assert_eq!(resolution.winner.vector_clock.get("device-b"), 1);
    }

    #[test]
    fn full_tie_falls_to_device_id() {
        let local = item("device-a", VectorClock::new().increment("device-a"), 100, "a");
        let remote = item("device-b", VectorClock::new().increment("device-b"), 100, "b");

        // "device-b" > "device-a" lexicographically, so remote wins; and the
        // same pair resolved from the other side agrees.
        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.action, ResolveAction::UpdateFromRemote);
        let mirrored = resolve(&remote, &local);
        assert_eq!(mirrored.action, ResolveAction::KeepLocal);
        assert_eq!(mirrored.winner.title, resolution.winner.title);
    }

    #[test]
    fn different_keys_never_conflict() {
        let local = item("device-a", VectorClock::new().increment("device-a"), 100, "a");
        let mut remote = item("device-b", VectorClock::new().increment("device-b"), 200, "b");
        remote.item_id = "43".into();

        let resolution = resolve(&local, &remote);
        assert_eq!(resolution.action, ResolveAction::KeepLocal);
        // Local is returned untouched, clock unmerged.
        assert_eq!(resolution.winner, local);
    }

    #[test]
    fn dominated_record_yields_to_removal() {
        let base = VectorClock::new().increment("device-a");
        let local = item("device-a", base.clone(), 900, "a");
        let removal = RemovalNotice {
            user_id: "user-1".into(),
            item_id: "42".into(),
            vector_clock: base.increment("device-b"),
            updated_at: 100,
            device_id: "device-b".into(),
        };

        assert_eq!(resolve_removal(&local, &removal), RemovalOutcome::Delete);
    }

    #[test]
    fn concurrent_removal_loses_wall_clock_tie() {
        // Equal wall clocks: the add survives.
        let local = item("device-a", VectorClock::new().increment("device-a"), 100, "a");
        let removal = RemovalNotice {
            user_id: "user-1".into(),
            item_id: "42".into(),
            vector_clock: VectorClock::new().increment("device-b"),
            updated_at: 100,
            device_id: "device-b".into(),
        };

        match resolve_removal(&local, &removal) {
            RemovalOutcome::KeepLocal { winner } => {
                assert_eq!(winner.title, "a");
                assert_eq!(winner.vector_clock.get("device-b"), 1);
            }
            RemovalOutcome::Delete => panic!("add must beat a concurrent delete"),
        }
    }

    #[test]
    fn later_removal_wins_concurrent_tiebreak() {
        let local = item("device-a", VectorClock::new().increment("device-a"), 100, "a");
        let removal = RemovalNotice {
            user_id: "user-1".into(),
            item_id: "42".into(),
            vector_clock: VectorClock::new().increment("device-b"),
            updated_at: 200,
            device_id: "device-b".into(),
        };

        assert_eq!(resolve_removal(&local, &removal), RemovalOutcome::Delete);
    }

    // Property-based tests using proptest
    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_clock() -> impl Strategy<Value = VectorClock> {
            (0u64..4, 0u64..4).prop_map(|(a, b)| {
                let mut clock = VectorClock::new();
                for _ in 0..a {
                    clock = clock.increment("device-a");
                }
                for _ in 0..b {
                    clock = clock.increment("device-b");
                }
                clock
            })
        }

        proptest! {
            #[test]
            fn prop_resolve_deterministic(
                local_clock in arb_clock(),
                remote_clock in arb_clock(),
                local_at in 0u64..5000,
                remote_at in 0u64..5000,
            ) {
                let local = item("device-a", local_clock, local_at, "local");
                let remote = item("device-b", remote_clock, remote_at, "remote");

                let first = resolve(&local, &remote);
                let second = resolve(&local, &remote);
                prop_assert_eq!(first, second);
            }

            #[test]
            fn prop_resolve_symmetric_winner(
                local_clock in arb_clock(),
                remote_clock in arb_clock(),
                local_at in 0u64..5000,
                remote_at in 0u64..5000,
            ) {
                // Both sides of a sync must agree on the surviving version.
                let a = item("device-a", local_clock, local_at, "a");
                let b = item("device-b", remote_clock, remote_at, "b");

                let from_a = resolve(&a, &b);
                let from_b = resolve(&b, &a);
                prop_assert_eq!(from_a.winner.title, from_b.winner.title);
                prop_assert_eq!(from_a.winner.vector_clock, from_b.winner.vector_clock);
            }

            #[test]
            fn prop_winner_clock_dominates_or_equals_both(
                local_clock in arb_clock(),
                remote_clock in arb_clock(),
            ) {
                let local = item("device-a", local_clock.clone(), 100, "a");
                let remote = item("device-b", remote_clock.clone(), 200, "b");

                let merged = resolve(&local, &remote).winner.vector_clock;
                prop_assert_eq!(merged.get("device-a"),
                    local_clock.get("device-a").max(remote_clock.get("device-a")));
                prop_assert_eq!(merged.get("device-b"),
                    local_clock.get("device-b").max(remote_clock.get("device-b")));
            }
        }
    }
}
