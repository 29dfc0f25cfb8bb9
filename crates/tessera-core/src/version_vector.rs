//! Version vector: the causal frontier of a replica.
//!
//! A version vector tracks the highest counter seen from each replica. An
//! absent entry means nothing has been seen from that replica. Every CRDT
//! uses it to decide which part of its state another replica is missing.

use crate::timestamp::{ReplicaId, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A version vector tracking the frontier of seen updates per replica.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionVector {
    /// Map from replica ID to highest seen counter.
    entries: BTreeMap<ReplicaId, i64>,
}

impl VersionVector {
    /// Create an empty version vector.
    pub fn new() -> Self {
        VersionVector {
            entries: BTreeMap::new(),
        }
    }

    /// Create a version vector from entries.
    pub fn from_entries<R: Into<ReplicaId>>(entries: impl IntoIterator<Item = (R, i64)>) -> Self {
        let mut vv = VersionVector::new();
        for (replica, counter) in entries {
            vv.raise(replica.into(), counter);
        }
        vv
    }

    /// Get the highest counter seen from a replica, if any.
    pub fn get(&self, replica: &ReplicaId) -> Option<i64> {
        self.entries.get(replica).copied()
    }

    /// Merge with another version vector (component-wise max).
    pub fn update(&mut self, other: &VersionVector) {
        for (replica, &counter) in &other.entries {
            self.raise(replica.clone(), counter);
        }
    }

    /// Alias of [`update`](Self::update).
    pub fn merge(&mut self, other: &VersionVector) {
        self.update(other);
    }

    /// Create a merged version vector without modifying self.
    pub fn merged_with(&self, other: &VersionVector) -> VersionVector {
        let mut result = self.clone();
        result.update(other);
        result
    }

    /// Raise the issuing replica's entry to at least `ts.counter()`.
    pub fn update_timestamp(&mut self, ts: &Timestamp) {
        self.raise(ts.replica().clone(), ts.counter());
    }

    fn raise(&mut self, replica: ReplicaId, counter: i64) {
        self.entries
            .entry(replica)
            .and_modify(|current| *current = (*current).max(counter))
            .or_insert(counter);
    }

    /// True if the event identified by `ts` is already covered.
    pub fn dominates(&self, ts: &Timestamp) -> bool {
        self.get(ts.replica())
            .map_or(false, |counter| counter >= ts.counter())
    }

    /// True if for all replicas, self[r] >= other[r].
    pub fn includes(&self, other: &VersionVector) -> bool {
        other.entries.iter().all(|(replica, &counter)| {
            self.get(replica).map_or(false, |mine| mine >= counter)
        })
    }

    /// Check if two vectors are concurrent (neither includes the other).
    pub fn is_concurrent_with(&self, other: &VersionVector) -> bool {
        !self.includes(other) && !other.includes(self)
    }

    /// Highest counter across all replicas.
    pub fn max_counter(&self) -> Option<i64> {
        self.entries.values().copied().max()
    }

    /// Iterate over all entries.
    pub fn iter(&self) -> impl Iterator<Item = (&ReplicaId, &i64)> {
        self.entries.iter()
    }

    /// Get the number of replicas tracked.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the version vector is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<&'a Timestamp> for VersionVector {
    fn from_iter<I: IntoIterator<Item = &'a Timestamp>>(iter: I) -> Self {
        let mut vv = VersionVector::new();
        for ts in iter {
            vv.update_timestamp(ts);
        }
        vv
    }
}
