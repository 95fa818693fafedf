//! Vector clocks for causal ordering of record versions.
//!
//! Each device keeps its own counter; a version produced by a device
//! increments that device's entry. Comparing two clocks tells whether one
//! version causally supersedes the other or the two were made concurrently.

use crate::DeviceId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Outcome of comparing two vector clocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Causality {
    /// Every entry of the left clock is <= the right's, at least one strictly.
    Before,
    /// The symmetric case: the left clock strictly dominates the right.
    After,
    /// Neither dominates (equal clocks are also reported as concurrent).
    Concurrent,
}

/// A per-device counter map expressing "happened-before" between versions.
///
/// Missing entries read as 0. `BTreeMap` keeps serialization deterministic,
/// which matters because clocks are persisted and compared across devices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VectorClock {
    entries: BTreeMap<DeviceId, u64>,
}

impl VectorClock {
    /// Create an empty clock (all entries implicitly 0).
    pub fn new() -> Self {
        Self::default()
    }

    /// The counter for a device, 0 if the device has never written.
    pub fn get(&self, device_id: &str) -> u64 {
        self.entries.get(device_id).copied().unwrap_or(0)
    }

    /// Return a new clock with `device_id`'s entry incremented by one and
    /// all other entries unchanged.
    #[must_use]
    pub fn increment(&self, device_id: &str) -> VectorClock {
        let mut entries = self.entries.clone();
        *entries.entry(device_id.to_string()).or_insert(0) += 1;
        Self { entries }
    }

    /// Return the component-wise maximum over the key union of both clocks.
    #[must_use]
    pub fn merge(&self, other: &VectorClock) -> VectorClock {
        let mut entries = self.entries.clone();
        for (device, &counter) in &other.entries {
            let entry = entries.entry(device.clone()).or_insert(0);
            *entry = (*entry).max(counter);
        }
        Self { entries }
    }

    /// Compare this clock against another.
    ///
    /// `Before` iff every entry here is <= the corresponding entry of
    /// `other` with at least one strictly less; `After` is the symmetric
    /// case; everything else (including equal clocks) is `Concurrent`.
    pub fn compare(&self, other: &VectorClock) -> Causality {
        if self.dominated_by(other) {
            Causality::Before
        } else if other.dominated_by(self) {
            Causality::After
        } else {
            Causality::Concurrent
        }
    }

    /// True when `other` strictly dominates this clock.
    fn dominated_by(&self, other: &VectorClock) -> bool {
        let mut strictly_less = false;
        for (device, &counter) in &self.entries {
            let theirs = other.get(device);
            if counter > theirs {
                return false;
            }
            if counter < theirs {
                strictly_less = true;
            }
        }
        for (device, &theirs) in &other.entries {
            if theirs > 0 && !self.entries.contains_key(device) {
                strictly_less = true;
            }
        }
        strictly_less
    }

    /// Number of devices with a non-zero entry.
    pub fn device_count(&self) -> usize {
        self.entries.values().filter(|&&c| c > 0).count()
    }
}
