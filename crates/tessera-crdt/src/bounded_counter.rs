//! Bounded counter: a PN-Counter whose decrements are capped by rights.
//!
//! Every replica owns the rights it created by incrementing. It may spend
//! them by decrementing or hand them to another replica with a transfer.
//! Since a replica only ever spends rights it provably holds, the global
//! value cannot be driven below zero by concurrent decrements.
//!
//! Transfers live in a grow-only ledger keyed by the timestamp of the
//! transfer, so ledgers merge by plain union.

use crate::pn_counter::PnCounter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{
    DeltaCrdt, EnvHandle, Environment, Error, Lattice, ReplicaId, Result, Timestamp,
    VersionVector,
};

/// Rights moved from one replica to another.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub from: ReplicaId,
    pub to: ReplicaId,
    pub amount: i64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundedCounter {
    counter: PnCounter,
    #[serde(with = "crate::codec::entries")]
    transfers: BTreeMap<Timestamp, Transfer>,
    #[serde(skip)]
    env: EnvHandle,
}

impl BoundedCounter {
    /// Create a zero counter writing through `env`.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            counter: PnCounter::default(),
            transfers: BTreeMap::new(),
            env: EnvHandle::new(env),
        }
    }

    /// Global value; transfers move rights around but never change it.
    pub fn get(&self) -> i64 {
        self.counter.get()
    }

    /// Rights currently held by `replica`.
    pub fn local_rights(&self, replica: &ReplicaId) -> i64 {
        let mut rights = self
            .counter
            .increments_of(replica)
            .saturating_sub(self.counter.decrements_of(replica));
        for transfer in self.transfers.values() {
            if &transfer.from == replica {
                rights = rights.saturating_sub(transfer.amount);
            }
            if &transfer.to == replica {
                rights = rights.saturating_add(transfer.amount);
            }
        }
        rights
    }

    /// Rights held by the bound environment's replica.
    pub fn rights(&self) -> Result<i64> {
        let replica = self.env.replica_id().ok_or(Error::NoEnvironment)?;
        Ok(self.local_rights(replica))
    }

    /// Create `amount` new rights; a negative amount spends rights instead.
    pub fn increment(&mut self, amount: i64) -> Result<BoundedCounter> {
        if amount < 0 {
            return self.decrement(amount.saturating_neg());
        }
        let ts = self.env.tick()?;
        let counter = self.counter.apply_increment(amount, ts);
        Ok(self.counter_delta(counter))
    }

    /// Spend `amount` rights; fails if this replica does not hold them.
    pub fn decrement(&mut self, amount: i64) -> Result<BoundedCounter> {
        if amount < 0 {
            return self.increment(amount.saturating_neg());
        }
        let env = self.env.writable()?;
        self.ensure_rights(env.replica_id(), amount)?;
        let ts = env.new_timestamp()?;
        let counter = self.counter.apply_decrement(amount, ts);
        Ok(self.counter_delta(counter))
    }

    /// Hand `amount` of this replica's rights to `to`.
    pub fn transfer(&mut self, amount: i64, to: impl Into<ReplicaId>) -> Result<BoundedCounter> {
        if amount < 0 {
            return Err(Error::InvalidAmount(amount));
        }
        let env = self.env.writable()?;
        self.ensure_rights(env.replica_id(), amount)?;
        let ts = env.new_timestamp()?;
        let transfer = Transfer {
            from: ts.replica().clone(),
            to: to.into(),
            amount,
        };
        tracing::debug!(from = %transfer.from, to = %transfer.to, amount, %ts, "rights transfer");
        self.transfers.insert(ts.clone(), transfer.clone());

        let mut delta = BoundedCounter::default();
        delta.transfers.insert(ts, transfer);
        Ok(delta)
    }

    /// Ledger entries in timestamp order.
    pub fn transfers(&self) -> impl Iterator<Item = (&Timestamp, &Transfer)> {
        self.transfers.iter()
    }

    fn ensure_rights(&self, replica: &ReplicaId, requested: i64) -> Result<()> {
        let available = self.local_rights(replica);
        if requested > available {
            tracing::debug!(%replica, requested, available, "insufficient rights");
            return Err(Error::InsufficientRights {
                requested,
                available,
            });
        }
        Ok(())
    }

    fn counter_delta(&self, counter: PnCounter) -> BoundedCounter {
        BoundedCounter {
            counter,
            ..Default::default()
        }
    }
}

impl Lattice for BoundedCounter {
    fn bottom() -> Self {
        Self::default()
    }

    fn join_assign(&mut self, other: &Self) {
        self.counter.join_assign(&other.counter);
        for (ts, transfer) in &other.transfers {
            self.transfers
                .entry(ts.clone())
                .or_insert_with(|| transfer.clone());
        }
    }
}

impl DeltaCrdt for BoundedCounter {
    fn env(&self) -> &EnvHandle {
        &self.env
    }

    fn env_mut(&mut self) -> &mut EnvHandle {
        &mut self.env
    }

    fn frontier(&self) -> VersionVector {
        let mut vv = self.counter.frontier();
        for ts in self.transfers.keys() {
            vv.update_timestamp(ts);
        }
        vv
    }

    fn generate_delta(&self, vv: &VersionVector) -> Self {
        Self {
            counter: self.counter.generate_delta(vv),
            transfers: self
                .transfers
                .iter()
                .filter(|(ts, _)| !vv.dominates(ts))
                .map(|(ts, transfer)| (ts.clone(), transfer.clone()))
                .collect(),
            env: EnvHandle::detached(),
        }
    }
}
