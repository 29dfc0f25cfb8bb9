//! PN-Counter (Positive-Negative Counter) CRDT
//!
//! A PN-Counter supports both increment and decrement operations by maintaining
//! two separate grow-only accumulators per replica: one for increments (P) and
//! one for decrements (N). The value is ΣP - ΣN.
//!
//! Each accumulator is stamped with the timestamp of its last change, which is
//! what delta generation compares against a version vector. Only the owning
//! replica ever changes its accumulators, so the join keeps the larger one.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{
    DeltaCrdt, EnvHandle, Environment, Lattice, ReplicaId, Result, Timestamp, VersionVector,
};

/// A replica's running total in one direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulator {
    pub total: i64,
    pub timestamp: Timestamp,
}

impl Accumulator {
    fn supersedes(&self, other: &Accumulator) -> bool {
        (self.total, &self.timestamp) > (other.total, &other.timestamp)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Direction {
    Up,
    Down,
}

/// A Positive-Negative Counter CRDT
///
/// Value = sum(increments) - sum(decrements)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PnCounter {
    /// Per-replica increment accumulators
    #[serde(with = "crate::codec::entries")]
    increments: BTreeMap<ReplicaId, Accumulator>,
    /// Per-replica decrement accumulators
    #[serde(with = "crate::codec::entries")]
    decrements: BTreeMap<ReplicaId, Accumulator>,
    #[serde(skip)]
    env: EnvHandle,
}

impl PnCounter {
    /// Create a zero counter writing through `env`.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            increments: BTreeMap::new(),
            decrements: BTreeMap::new(),
            env: EnvHandle::new(env),
        }
    }

    /// Add `amount` to this replica's increments; a negative amount decrements.
    pub fn increment(&mut self, amount: i64) -> Result<PnCounter> {
        let ts = self.env.tick()?;
        Ok(self.apply_increment(amount, ts))
    }

    /// Add `amount` to this replica's decrements; a negative amount increments.
    pub fn decrement(&mut self, amount: i64) -> Result<PnCounter> {
        let ts = self.env.tick()?;
        Ok(self.apply_decrement(amount, ts))
    }

    pub(crate) fn apply_increment(&mut self, amount: i64, ts: Timestamp) -> PnCounter {
        if amount < 0 {
            self.bump(Direction::Down, amount.saturating_neg(), ts)
        } else {
            self.bump(Direction::Up, amount, ts)
        }
    }

    pub(crate) fn apply_decrement(&mut self, amount: i64, ts: Timestamp) -> PnCounter {
        if amount < 0 {
            self.bump(Direction::Up, amount.saturating_neg(), ts)
        } else {
            self.bump(Direction::Down, amount, ts)
        }
    }

    fn side(&self, direction: Direction) -> &BTreeMap<ReplicaId, Accumulator> {
        match direction {
            Direction::Up => &self.increments,
            Direction::Down => &self.decrements,
        }
    }

    fn side_mut(&mut self, direction: Direction) -> &mut BTreeMap<ReplicaId, Accumulator> {
        match direction {
            Direction::Up => &mut self.increments,
            Direction::Down => &mut self.decrements,
        }
    }

    fn bump(&mut self, direction: Direction, amount: i64, ts: Timestamp) -> PnCounter {
        tracing::trace!(?direction, amount, %ts, "counter update");
        let replica = ts.replica().clone();
        let total = self
            .side(direction)
            .get(&replica)
            .map_or(0, |acc| acc.total)
            .saturating_add(amount);
        let acc = Accumulator {
            total,
            timestamp: ts,
        };
        self.side_mut(direction).insert(replica.clone(), acc.clone());

        let mut delta = PnCounter::default();
        delta.side_mut(direction).insert(replica, acc);
        delta
    }

    /// Get the current value (sum of increments - sum of decrements)
    pub fn get(&self) -> i64 {
        let inc_sum = Self::sum(&self.increments);
        let dec_sum = Self::sum(&self.decrements);
        inc_sum.saturating_sub(dec_sum)
    }

    fn sum(side: &BTreeMap<ReplicaId, Accumulator>) -> i64 {
        side.values().fold(0i64, |sum, acc| sum.saturating_add(acc.total))
    }

    /// Total incremented by a replica
    pub fn increments_of(&self, replica: &ReplicaId) -> i64 {
        self.increments.get(replica).map_or(0, |acc| acc.total)
    }

    /// Total decremented by a replica
    pub fn decrements_of(&self, replica: &ReplicaId) -> i64 {
        self.decrements.get(replica).map_or(0, |acc| acc.total)
    }

    /// True if no replica has touched the counter.
    pub fn is_empty(&self) -> bool {
        self.increments.is_empty() && self.decrements.is_empty()
    }

    fn join_side(
        mine: &mut BTreeMap<ReplicaId, Accumulator>,
        theirs: &BTreeMap<ReplicaId, Accumulator>,
    ) {
        for (replica, acc) in theirs {
            match mine.get_mut(replica) {
                Some(current) if acc.supersedes(current) => *current = acc.clone(),
                Some(_) => {}
                None => {
                    mine.insert(replica.clone(), acc.clone());
                }
            }
        }
    }

    fn unseen(
        side: &BTreeMap<ReplicaId, Accumulator>,
        vv: &VersionVector,
    ) -> BTreeMap<ReplicaId, Accumulator> {
        side.iter()
            .filter(|(_, acc)| !vv.dominates(&acc.timestamp))
            .map(|(replica, acc)| (replica.clone(), acc.clone()))
            .collect()
    }
}

impl Lattice for PnCounter {
    fn bottom() -> Self {
        Self::default()
    }

    /// Component-wise max on both accumulators
    fn join_assign(&mut self, other: &Self) {
        Self::join_side(&mut self.increments, &other.increments);
        Self::join_side(&mut self.decrements, &other.decrements);
    }
}

impl DeltaCrdt for PnCounter {
    fn env(&self) -> &EnvHandle {
        &self.env
    }

    fn env_mut(&mut self) -> &mut EnvHandle {
        &mut self.env
    }

    fn frontier(&self) -> VersionVector {
        self.increments
            .values()
            .chain(self.decrements.values())
            .map(|acc| &acc.timestamp)
            .collect()
    }

    fn generate_delta(&self, vv: &VersionVector) -> Self {
        Self {
            increments: Self::unseen(&self.increments, vv),
            decrements: Self::unseen(&self.decrements, vv),
            env: EnvHandle::detached(),
        }
    }
}
