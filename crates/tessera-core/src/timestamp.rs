//! Replica identifiers and timestamps.
//!
//! A [`Timestamp`] pairs the replica that issued it with a counter that is
//! unique for that replica. Timestamps are totally ordered: first by counter,
//! then by replica id, so two replicas that issue the same counter still
//! compare deterministically everywhere.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use ulid::Ulid;

/// Identifier of a replica.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicaId(String);

impl ReplicaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Mint a fresh, globally unique replica id.
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReplicaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ReplicaId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for ReplicaId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A replica-unique, monotonically increasing event identifier.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    replica: ReplicaId,
    counter: i64,
}

impl Timestamp {
    pub fn new(replica: impl Into<ReplicaId>, counter: i64) -> Self {
        Self {
            replica: replica.into(),
            counter,
        }
    }

    /// The replica that issued this timestamp.
    pub fn replica(&self) -> &ReplicaId {
        &self.replica
    }

    /// The per-replica counter.
    pub fn counter(&self) -> i64 {
        self.counter
    }
}

impl PartialOrd for Timestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.counter
            .cmp(&other.counter)
            .then_with(|| self.replica.cmp(&other.replica))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.replica, self.counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_orders_first() {
        let a = Timestamp::new("zeta", 1);
        let b = Timestamp::new("alpha", 2);
        assert!(a < b);
    }

    #[test]
    fn test_replica_breaks_ties() {
        let a = Timestamp::new("alpha", 7);
        let b = Timestamp::new("beta", 7);
        assert!(a < b);
        assert_eq!(a.cmp(&a.clone()), Ordering::Equal);
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        assert_ne!(ReplicaId::generate(), ReplicaId::generate());
    }

    #[test]
    fn test_display() {
        assert_eq!(Timestamp::new("r1", 3).to_string(), "r1@3");
    }

    #[test]
    fn test_serialization() {
        let ts = Timestamp::new("r1", 42);
        let json = serde_json::to_string(&ts).unwrap();
        assert_eq!(json, r#"{"replica":"r1","counter":42}"#);
        let back: Timestamp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ts);
    }
}
