//! Multi-Value (MV) register map
//!
//! Each slot `(key, kind)` keeps every value written concurrently instead of
//! choosing a winner. A slot carries a causal context: the version vector of
//! every write the slot has seen. A write drops everything the context
//! covers, so sequential writes replace each other while concurrent writes
//! survive side by side until one replica overwrites them all.
//!
//! Deletion writes a tombstone value. A slot whose surviving values are all
//! tombstones reads as absent.

use crate::value::{SlotKey, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{
    DeltaCrdt, EnvHandle, Environment, Lattice, Result, Timestamp, VersionVector,
};

/// The concurrent values of one slot and the writes they supersede.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MvSlot {
    /// Surviving values keyed by the timestamp of their write; `None` is a tombstone.
    #[serde(with = "crate::codec::entries")]
    values: BTreeMap<Timestamp, Option<Value>>,
    /// Every write this slot has observed.
    context: VersionVector,
}

impl MvSlot {
    pub fn values(&self) -> impl Iterator<Item = (&Timestamp, Option<&Value>)> {
        self.values.iter().map(|(ts, v)| (ts, v.as_ref()))
    }

    pub fn context(&self) -> &VersionVector {
        &self.context
    }

    fn live(&self) -> Vec<&Value> {
        self.values.values().flatten().collect()
    }

    fn is_unseen_by(&self, vv: &VersionVector) -> bool {
        self.values.keys().any(|ts| !vv.dominates(ts))
            || self
                .context
                .iter()
                .any(|(replica, &counter)| vv.get(replica).map_or(true, |seen| seen < counter))
    }

    /// Join another replica's view of the same slot.
    fn join_slot(&mut self, other: &MvSlot) {
        let mut values = BTreeMap::new();
        for (ts, value) in &self.values {
            if other.values.contains_key(ts) || !other.context.dominates(ts) {
                values.insert(ts.clone(), value.clone());
            }
        }
        for (ts, value) in &other.values {
            if !values.contains_key(ts) && !self.context.dominates(ts) {
                values.insert(ts.clone(), value.clone());
            }
        }
        self.values = values;
        self.context.update(&other.context);
    }
}

/// A map of multi-value registers keyed by `(key, kind)`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MvMap {
    #[serde(with = "crate::codec::entries")]
    slots: BTreeMap<SlotKey, MvSlot>,
    #[serde(skip)]
    env: EnvHandle,
}

impl MvMap {
    /// Create an empty map writing through `env`.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            slots: BTreeMap::new(),
            env: EnvHandle::new(env),
        }
    }

    /// Write `value` into the slot `(key, value.kind())`, superseding every
    /// value this replica has seen there.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<MvMap> {
        let value = value.into();
        value.validate()?;
        let slot = SlotKey::new(key, value.kind());
        let ts = self.env.tick()?;
        Ok(self.apply(slot, Some(value), ts))
    }

    /// Write a tombstone into the slot `(key, kind)`.
    pub fn delete(&mut self, key: impl Into<String>, kind: ValueKind) -> Result<MvMap> {
        let slot = SlotKey::new(key, kind);
        let ts = self.env.tick()?;
        Ok(self.apply(slot, None, ts))
    }

    /// Apply a write stamped by the caller and return its delta.
    pub(crate) fn apply(&mut self, slot: SlotKey, value: Option<Value>, ts: Timestamp) -> MvMap {
        tracing::trace!(key = %slot.key, kind = ?slot.kind, %ts, "mv write");
        let entry = self.slots.entry(slot.clone()).or_default();
        let MvSlot { values, context } = &mut *entry;
        values.retain(|seen, _| !context.dominates(seen));
        values.insert(ts.clone(), value);
        context.update_timestamp(&ts);

        let mut delta = MvMap::default();
        delta.slots.insert(slot, entry.clone());
        delta
    }

    /// The live values of a slot; more than one means concurrent writes.
    ///
    /// Returns `None` when the slot was never written or only tombstones survive.
    pub fn get(&self, key: &str, kind: ValueKind) -> Option<Vec<&Value>> {
        let live = self.slots.get(&SlotKey::new(key, kind))?.live();
        if live.is_empty() {
            None
        } else {
            Some(live)
        }
    }

    pub fn get_booleans(&self, key: &str) -> Option<Vec<bool>> {
        self.get(key, ValueKind::Boolean)
            .map(|values| values.into_iter().filter_map(Value::as_boolean).collect())
    }

    pub fn get_doubles(&self, key: &str) -> Option<Vec<f64>> {
        self.get(key, ValueKind::Double)
            .map(|values| values.into_iter().filter_map(Value::as_double).collect())
    }

    pub fn get_integers(&self, key: &str) -> Option<Vec<i64>> {
        self.get(key, ValueKind::Integer)
            .map(|values| values.into_iter().filter_map(Value::as_integer).collect())
    }

    pub fn get_strings(&self, key: &str) -> Option<Vec<&str>> {
        self.get(key, ValueKind::String)
            .map(|values| values.into_iter().filter_map(Value::as_str).collect())
    }

    /// Get the raw slot, tombstones and context included.
    pub fn slot(&self, key: &str, kind: ValueKind) -> Option<&MvSlot> {
        self.slots.get(&SlotKey::new(key, kind))
    }

    /// Iterate over slots that have at least one live value.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Vec<&Value>)> {
        self.slots.iter().filter_map(|(slot, entry)| {
            let live = entry.live();
            (!live.is_empty()).then(|| (slot.key.as_str(), live))
        })
    }

    pub fn iter_kind(&self, kind: ValueKind) -> impl Iterator<Item = (&str, Vec<&Value>)> {
        self.slots
            .iter()
            .filter(move |(slot, _)| slot.kind == kind)
            .filter_map(|(slot, entry)| {
                let live = entry.live();
                (!live.is_empty()).then(|| (slot.key.as_str(), live))
            })
    }

    /// Number of slots with live values.
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Lattice for MvMap {
    fn bottom() -> Self {
        Self::default()
    }

    /// Per slot: keep a value unless the other side has seen and dropped it,
    /// then union the contexts
    fn join_assign(&mut self, other: &Self) {
        for (slot, theirs) in &other.slots {
            self.slots.entry(slot.clone()).or_default().join_slot(theirs);
        }
    }
}

impl DeltaCrdt for MvMap {
    fn env(&self) -> &EnvHandle {
        &self.env
    }

    fn env_mut(&mut self) -> &mut EnvHandle {
        &mut self.env
    }

    fn frontier(&self) -> VersionVector {
        let mut vv = VersionVector::new();
        for slot in self.slots.values() {
            vv.update(&slot.context);
        }
        vv
    }

    /// Every slot holding a value or a context entry `vv` does not cover,
    /// shipped whole. A partial slot would carry a context that drops the
    /// receiver's copies of values the sender still holds.
    fn generate_delta(&self, vv: &VersionVector) -> Self {
        let mut delta = MvMap::default();
        for (slot, entry) in &self.slots {
            if entry.is_unseen_by(vv) {
                delta.slots.insert(slot.clone(), entry.clone());
            }
        }
        delta
    }
}
