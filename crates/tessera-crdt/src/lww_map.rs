//! Last-Writer-Wins (LWW) register map
//!
//! Every slot `(key, kind)` holds a single value together with the timestamp
//! of the write that produced it. The value with the highest timestamp always
//! wins, locally and across merges. Timestamps are unique, so there is never
//! a tie to break.
//!
//! Deleting writes a tombstone (`None`) with a fresh timestamp. Tombstones
//! are kept forever so that a stale write arriving later cannot resurrect the
//! slot; there is no garbage collection.

use crate::value::{SlotKey, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{
    DeltaCrdt, EnvHandle, Environment, Lattice, Result, Timestamp, VersionVector,
};

/// A single LWW slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LwwEntry {
    /// The current value; `None` is a tombstone.
    pub value: Option<Value>,
    /// The timestamp of the last write
    pub timestamp: Timestamp,
}

/// A map of last-writer-wins registers keyed by `(key, kind)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LwwMap {
    #[serde(with = "crate::codec::entries")]
    entries: BTreeMap<SlotKey, LwwEntry>,
    #[serde(skip)]
    env: EnvHandle,
}

impl LwwMap {
    /// Create an empty map writing through `env`.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            entries: BTreeMap::new(),
            env: EnvHandle::new(env),
        }
    }

    /// Write `value` into the slot `(key, value.kind())`.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<LwwMap> {
        let value = value.into();
        value.validate()?;
        let slot = SlotKey::new(key, value.kind());
        let ts = self.env.tick()?;
        Ok(self.apply(slot, Some(value), ts))
    }

    /// Write a tombstone into the slot `(key, kind)`.
    pub fn delete(&mut self, key: impl Into<String>, kind: ValueKind) -> Result<LwwMap> {
        let slot = SlotKey::new(key, kind);
        let ts = self.env.tick()?;
        Ok(self.apply(slot, None, ts))
    }

    /// Apply a write stamped by the caller and return its delta.
    pub(crate) fn apply(&mut self, slot: SlotKey, value: Option<Value>, ts: Timestamp) -> LwwMap {
        tracing::trace!(key = %slot.key, kind = ?slot.kind, %ts, "lww write");
        let entry = LwwEntry {
            value,
            timestamp: ts,
        };
        self.offer(slot.clone(), &entry);

        let mut delta = LwwMap::default();
        delta.entries.insert(slot, entry);
        delta
    }

    /// Keep `entry` if it is newer than what the slot holds.
    fn offer(&mut self, slot: SlotKey, entry: &LwwEntry) {
        match self.entries.get_mut(&slot) {
            Some(current) if current.timestamp >= entry.timestamp => {}
            Some(current) => *current = entry.clone(),
            None => {
                self.entries.insert(slot, entry.clone());
            }
        }
    }

    /// Get the live value of a slot.
    pub fn get(&self, key: &str, kind: ValueKind) -> Option<&Value> {
        self.entries
            .get(&SlotKey::new(key, kind))
            .and_then(|entry| entry.value.as_ref())
    }

    pub fn get_boolean(&self, key: &str) -> Option<bool> {
        self.get(key, ValueKind::Boolean).and_then(Value::as_boolean)
    }

    pub fn get_double(&self, key: &str) -> Option<f64> {
        self.get(key, ValueKind::Double).and_then(Value::as_double)
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        self.get(key, ValueKind::Integer).and_then(Value::as_integer)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key, ValueKind::String).and_then(Value::as_str)
    }

    /// Get the raw slot, tombstones included.
    pub fn entry(&self, key: &str, kind: ValueKind) -> Option<&LwwEntry> {
        self.entries.get(&SlotKey::new(key, kind))
    }

    /// Iterate over live slots in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries
            .iter()
            .filter_map(|(slot, entry)| entry.value.as_ref().map(|v| (slot.key.as_str(), v)))
    }

    /// Iterate over live slots of one kind.
    pub fn iter_kind(&self, kind: ValueKind) -> impl Iterator<Item = (&str, &Value)> {
        self.iter().filter(move |(_, value)| value.kind() == kind)
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Lattice for LwwMap {
    fn bottom() -> Self {
        Self::default()
    }

    /// Per slot, keep the entry with the greater timestamp
    fn join_assign(&mut self, other: &Self) {
        for (slot, entry) in &other.entries {
            self.offer(slot.clone(), entry);
        }
    }
}

impl DeltaCrdt for LwwMap {
    fn env(&self) -> &EnvHandle {
        &self.env
    }

    fn env_mut(&mut self) -> &mut EnvHandle {
        &mut self.env
    }

    fn frontier(&self) -> VersionVector {
        self.entries.values().map(|entry| &entry.timestamp).collect()
    }

    fn generate_delta(&self, vv: &VersionVector) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(_, entry)| !vv.dominates(&entry.timestamp))
            .map(|(slot, entry)| (slot.clone(), entry.clone()))
            .collect();
        Self {
            entries,
            env: EnvHandle::detached(),
        }
    }
}
