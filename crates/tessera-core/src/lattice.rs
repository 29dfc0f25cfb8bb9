//! Join-semilattice traits - the mathematical foundation of CRDTs
//!
//! A join-semilattice (S, ⊔) satisfies:
//! - Commutativity: a ⊔ b = b ⊔ a
//! - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//! - Idempotence:  a ⊔ a = a
//!
//! These properties guarantee convergence regardless of message order.

use crate::env::{EnvHandle, Environment};
use crate::version_vector::VersionVector;
use std::cmp::Ordering;
use std::sync::Arc;

/// The core CRDT trait. All state-based CRDTs implement this.
pub trait Lattice: Clone + PartialEq {
    /// The bottom element (identity for join)
    fn bottom() -> Self;

    /// Join-assign: self = self ⊔ other
    /// Must be commutative, associative, and idempotent
    fn join_assign(&mut self, other: &Self);

    /// Join operation (least upper bound)
    fn join(&self, other: &Self) -> Self {
        let mut joined = self.clone();
        joined.join_assign(other);
        joined
    }

    /// Partial order derived from join: a ≤ b iff a ⊔ b = b
    fn partial_cmp_lattice(&self, other: &Self) -> Option<Ordering> {
        let joined = self.join(other);
        if &joined == self && &joined == other {
            Some(Ordering::Equal)
        } else if &joined == other {
            Some(Ordering::Less)
        } else if &joined == self {
            Some(Ordering::Greater)
        } else {
            None // Concurrent/incomparable
        }
    }

    /// Check if self ≤ other in the lattice order
    fn leq(&self, other: &Self) -> bool {
        matches!(
            self.partial_cmp_lattice(other),
            Some(Ordering::Less) | Some(Ordering::Equal)
        )
    }
}

/// A delta-state CRDT bound to a replica environment.
///
/// Every mutating operation returns its delta: a sparse value of the same
/// type such that `x.op()` equals `x ⊔ delta`. Deltas from different
/// operations can be joined together before being shipped.
pub trait DeltaCrdt: Lattice {
    fn env(&self) -> &EnvHandle;

    fn env_mut(&mut self) -> &mut EnvHandle;

    /// Highest counter per replica among the timestamps held in this state.
    fn frontier(&self) -> VersionVector;

    /// The part of this state whose timestamps are not dominated by `vv`.
    fn generate_delta(&self, vv: &VersionVector) -> Self;

    /// Merge remote state or a delta into this one.
    ///
    /// The bound environment, if any, observes the merged timestamps so later
    /// local writes order after them.
    fn merge(&mut self, other: &Self) {
        let frontier = other.frontier();
        tracing::debug!(replicas = frontier.len(), "merging remote state");
        self.join_assign(other);
        self.env().observe_all(&frontier);
    }

    /// Bind an environment, turning a merge-only value into a writable one.
    fn bind(&mut self, env: Arc<dyn Environment>) {
        env.observe_all(&self.frontier());
        *self.env_mut() = EnvHandle::new(env);
    }
}
