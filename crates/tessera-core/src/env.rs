//! The environment a replica's CRDTs write through.
//!
//! An [`Environment`] owns the replica's clock: it issues fresh timestamps,
//! exposes the causal frontier as a [`VersionVector`], and can be switched to
//! read-only mode, in which every write path fails with [`Error::ReadOnly`].
//!
//! Timestamps follow the Lamport rule: a new counter is one more than the
//! highest counter the replica has observed from anyone. Merges feed remote
//! timestamps back through [`Environment::observe_all`], so a local write
//! always orders after everything it could have seen.
//!
//! All CRDTs of one replica share a single environment through an
//! `Arc<dyn Environment>`, held in an [`EnvHandle`].

use crate::error::{Error, Result};
use crate::timestamp::{ReplicaId, Timestamp};
use crate::version_vector::VersionVector;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Clock and write-permission source for a replica.
pub trait Environment: Send + Sync + fmt::Debug {
    /// The replica this environment issues timestamps for.
    fn replica_id(&self) -> &ReplicaId;

    /// Issue and record a fresh timestamp.
    fn new_timestamp(&self) -> Result<Timestamp>;

    /// The replica's current causal frontier.
    fn current_version_vector(&self) -> VersionVector;

    fn is_read_only(&self) -> bool;

    /// Record a timestamp received from elsewhere.
    fn observe(&self, ts: &Timestamp);

    /// Record every entry of a received frontier.
    fn observe_all(&self, vv: &VersionVector);
}

/// Configuration for [`SimpleEnvironment`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Replica id; a fresh one is generated by default.
    pub replica_id: ReplicaId,
    /// Start in read-only mode.
    pub read_only: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            replica_id: ReplicaId::generate(),
            read_only: false,
        }
    }
}

impl EnvironmentConfig {
    pub fn for_replica(replica_id: impl Into<ReplicaId>) -> Self {
        Self {
            replica_id: replica_id.into(),
            ..Default::default()
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }
}

/// In-memory reference environment.
#[derive(Debug)]
pub struct SimpleEnvironment {
    replica_id: ReplicaId,
    read_only: AtomicBool,
    frontier: Mutex<VersionVector>,
}

impl SimpleEnvironment {
    pub fn new(replica_id: impl Into<ReplicaId>) -> Self {
        Self::with_config(EnvironmentConfig::for_replica(replica_id))
    }

    pub fn with_config(config: EnvironmentConfig) -> Self {
        Self {
            replica_id: config.replica_id,
            read_only: AtomicBool::new(config.read_only),
            frontier: Mutex::new(VersionVector::new()),
        }
    }

    /// Convenience constructor returning the shared form CRDTs expect.
    pub fn shared(replica_id: impl Into<ReplicaId>) -> Arc<Self> {
        Arc::new(Self::new(replica_id))
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }
}

impl Environment for SimpleEnvironment {
    fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    fn new_timestamp(&self) -> Result<Timestamp> {
        if self.is_read_only() {
            tracing::warn!(replica = %self.replica_id, "write rejected: environment is read-only");
            return Err(Error::ReadOnly);
        }
        let mut frontier = self.frontier.lock();
        let counter = match frontier.max_counter() {
            Some(max) => max.checked_add(1).ok_or(Error::CounterOverflow)?,
            None => 1,
        };
        let ts = Timestamp::new(self.replica_id.clone(), counter);
        frontier.update_timestamp(&ts);
        tracing::trace!(%ts, "issued timestamp");
        Ok(ts)
    }

    fn current_version_vector(&self) -> VersionVector {
        self.frontier.lock().clone()
    }

    fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    fn observe(&self, ts: &Timestamp) {
        self.frontier.lock().update_timestamp(ts);
    }

    fn observe_all(&self, vv: &VersionVector) {
        self.frontier.lock().update(vv);
    }
}

/// Optional environment binding carried by every CRDT.
///
/// A CRDT without an environment is merge-only: it can absorb remote state
/// but cannot originate writes. Deltas and freshly decoded values are
/// merge-only. The binding is not part of the replicated state, so two
/// handles always compare equal and it is never serialized.
#[derive(Clone, Debug, Default)]
pub struct EnvHandle(Option<Arc<dyn Environment>>);

impl EnvHandle {
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self(Some(env))
    }

    /// A merge-only handle.
    pub fn detached() -> Self {
        Self(None)
    }

    pub fn get(&self) -> Option<&Arc<dyn Environment>> {
        self.0.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.0.is_some()
    }

    /// The bound environment, provided it accepts writes.
    pub fn writable(&self) -> Result<&Arc<dyn Environment>> {
        let env = self.0.as_ref().ok_or(Error::NoEnvironment)?;
        if env.is_read_only() {
            tracing::warn!(replica = %env.replica_id(), "write rejected: environment is read-only");
            return Err(Error::ReadOnly);
        }
        Ok(env)
    }

    /// Issue a fresh timestamp from the bound environment.
    pub fn tick(&self) -> Result<Timestamp> {
        self.writable()?.new_timestamp()
    }

    pub fn replica_id(&self) -> Option<&ReplicaId> {
        self.0.as_ref().map(|env| env.replica_id())
    }

    /// Forward a merged frontier to the environment, if any.
    pub fn observe_all(&self, vv: &VersionVector) {
        if let Some(env) = &self.0 {
            env.observe_all(vv);
        }
    }
}

impl PartialEq for EnvHandle {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl From<Arc<dyn Environment>> for EnvHandle {
    fn from(env: Arc<dyn Environment>) -> Self {
        Self::new(env)
    }
}
