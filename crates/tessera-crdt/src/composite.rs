//! Composite map: LWW registers, MV registers and counters under one key space.
//!
//! A user key addresses several unrelated slots at once: one LWW register and
//! one MV register per [`ValueKind`], plus one counter. Writes to one slot
//! never touch another, and merge simply joins the three embedded structures.
//!
//! The embedded structures are merge-only; every write is stamped through the
//! composite's own environment.

use crate::lww_map::LwwMap;
use crate::mv_map::MvMap;
use crate::pn_counter::PnCounter;
use crate::value::{SlotKey, Value, ValueKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tessera_core::{DeltaCrdt, EnvHandle, Environment, Lattice, Result, VersionVector};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeMap {
    lww: LwwMap,
    mv: MvMap,
    counters: BTreeMap<String, PnCounter>,
    #[serde(skip)]
    env: EnvHandle,
}

impl CompositeMap {
    /// Create an empty map writing through `env`.
    pub fn new(env: Arc<dyn Environment>) -> Self {
        Self {
            lww: LwwMap::default(),
            mv: MvMap::default(),
            counters: BTreeMap::new(),
            env: EnvHandle::new(env),
        }
    }

    // === LWW slots ===

    pub fn put_lww(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<CompositeMap> {
        let value = value.into();
        value.validate()?;
        let slot = SlotKey::new(key, value.kind());
        let ts = self.env.tick()?;
        let lww = self.lww.apply(slot, Some(value), ts);
        Ok(Self::delta(lww, MvMap::default(), BTreeMap::new()))
    }

    pub fn delete_lww(&mut self, key: impl Into<String>, kind: ValueKind) -> Result<CompositeMap> {
        let slot = SlotKey::new(key, kind);
        let ts = self.env.tick()?;
        let lww = self.lww.apply(slot, None, ts);
        Ok(Self::delta(lww, MvMap::default(), BTreeMap::new()))
    }

    pub fn get_lww(&self, key: &str, kind: ValueKind) -> Option<&Value> {
        self.lww.get(key, kind)
    }

    pub fn get_lww_boolean(&self, key: &str) -> Option<bool> {
        self.lww.get_boolean(key)
    }

    pub fn get_lww_double(&self, key: &str) -> Option<f64> {
        self.lww.get_double(key)
    }

    pub fn get_lww_integer(&self, key: &str) -> Option<i64> {
        self.lww.get_integer(key)
    }

    pub fn get_lww_string(&self, key: &str) -> Option<&str> {
        self.lww.get_string(key)
    }

    // === MV slots ===

    pub fn put_mv(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<CompositeMap> {
        let value = value.into();
        value.validate()?;
        let slot = SlotKey::new(key, value.kind());
        let ts = self.env.tick()?;
        let mv = self.mv.apply(slot, Some(value), ts);
        Ok(Self::delta(LwwMap::default(), mv, BTreeMap::new()))
    }

    pub fn delete_mv(&mut self, key: impl Into<String>, kind: ValueKind) -> Result<CompositeMap> {
        let slot = SlotKey::new(key, kind);
        let ts = self.env.tick()?;
        let mv = self.mv.apply(slot, None, ts);
        Ok(Self::delta(LwwMap::default(), mv, BTreeMap::new()))
    }

    pub fn get_mv(&self, key: &str, kind: ValueKind) -> Option<Vec<&Value>> {
        self.mv.get(key, kind)
    }

    // === Counter slots ===

    pub fn increment(&mut self, key: impl Into<String>, amount: i64) -> Result<CompositeMap> {
        let key = key.into();
        let ts = self.env.tick()?;
        let counter = self
            .counters
            .entry(key.clone())
            .or_default()
            .apply_increment(amount, ts);
        Ok(Self::counter_delta(key, counter))
    }

    pub fn decrement(&mut self, key: impl Into<String>, amount: i64) -> Result<CompositeMap> {
        let key = key.into();
        let ts = self.env.tick()?;
        let counter = self
            .counters
            .entry(key.clone())
            .or_default()
            .apply_decrement(amount, ts);
        Ok(Self::counter_delta(key, counter))
    }

    /// Value of the counter under `key`, if it was ever touched.
    pub fn get_counter(&self, key: &str) -> Option<i64> {
        self.counters.get(key).map(PnCounter::get)
    }

    // === Iteration ===

    pub fn iter_lww(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.lww.iter()
    }

    pub fn iter_mv(&self) -> impl Iterator<Item = (&str, Vec<&Value>)> {
        self.mv.iter()
    }

    pub fn iter_counters(&self) -> impl Iterator<Item = (&str, i64)> {
        self.counters
            .iter()
            .map(|(key, counter)| (key.as_str(), counter.get()))
    }

    pub fn is_empty(&self) -> bool {
        self.lww.is_empty() && self.mv.is_empty() && self.counters.is_empty()
    }

    fn delta(lww: LwwMap, mv: MvMap, counters: BTreeMap<String, PnCounter>) -> CompositeMap {
        CompositeMap {
            lww,
            mv,
            counters,
            env: EnvHandle::detached(),
        }
    }

    fn counter_delta(key: String, counter: PnCounter) -> CompositeMap {
        let mut counters = BTreeMap::new();
        counters.insert(key, counter);
        Self::delta(LwwMap::default(), MvMap::default(), counters)
    }
}

impl Lattice for CompositeMap {
    fn bottom() -> Self {
        Self::default()
    }

    fn join_assign(&mut self, other: &Self) {
        self.lww.join_assign(&other.lww);
        self.mv.join_assign(&other.mv);
        for (key, counter) in &other.counters {
            self.counters
                .entry(key.clone())
                .or_default()
                .join_assign(counter);
        }
    }
}

impl DeltaCrdt for CompositeMap {
    fn env(&self) -> &EnvHandle {
        &self.env
    }

    fn env_mut(&mut self) -> &mut EnvHandle {
        &mut self.env
    }

    fn frontier(&self) -> VersionVector {
        let mut vv = self.lww.frontier();
        vv.update(&self.mv.frontier());
        for counter in self.counters.values() {
            vv.update(&counter.frontier());
        }
        vv
    }

    fn generate_delta(&self, vv: &VersionVector) -> Self {
        let counters = self
            .counters
            .iter()
            .map(|(key, counter)| (key.clone(), counter.generate_delta(vv)))
            .filter(|(_, delta)| !delta.is_empty())
            .collect();
        Self::delta(self.lww.generate_delta(vv), self.mv.generate_delta(vv), counters)
    }
}
