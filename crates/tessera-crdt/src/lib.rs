//! # tessera-crdt
//!
//! Delta-state CRDTs built on [`tessera_core`]:
//! - [`LwwMap`]: last-writer-wins registers keyed by `(key, kind)`
//! - [`MvMap`]: multi-value registers that surface concurrent writes
//! - [`PnCounter`]: increment/decrement counter
//! - [`BoundedCounter`]: counter whose decrements are capped by transferable rights
//! - [`Rga`]: replicated sequence
//! - [`CompositeMap`]: LWW, MV and counter slots under one key space
//!
//! Every write returns its delta, and every type can compute the delta a
//! peer is missing from that peer's version vector. All state encodes to
//! canonical JSON through [`Codec`].
//!
//! ## Tombstones
//!
//! Deletes in the maps and removals in [`Rga`] leave tombstones behind, and
//! nothing ever collects them. Long-lived replicas grow with their full
//! write history; callers that need bounded space must snapshot and rebuild
//! out of band.

pub mod bounded_counter;
pub mod codec;
pub mod composite;
pub mod lww_map;
pub mod mv_map;
pub mod pn_counter;
pub mod rga;
pub mod value;

pub use bounded_counter::{BoundedCounter, Transfer};
pub use codec::{Codec, CrdtKind};
pub use composite::CompositeMap;
pub use lww_map::{LwwEntry, LwwMap};
pub use mv_map::{MvMap, MvSlot};
pub use pn_counter::{Accumulator, PnCounter};
pub use rga::{Element, Rga};
pub use value::{SlotKey, Value, ValueKind};

use serde::de::DeserializeOwned;
use serde::Serialize;

impl Codec for LwwMap {
    const KIND: CrdtKind = CrdtKind::LwwMap;
}

impl Codec for MvMap {
    const KIND: CrdtKind = CrdtKind::MvMap;
}

impl Codec for PnCounter {
    const KIND: CrdtKind = CrdtKind::PnCounter;
}

impl Codec for BoundedCounter {
    const KIND: CrdtKind = CrdtKind::BCounter;
}

impl<T: Serialize + DeserializeOwned> Codec for Rga<T> {
    const KIND: CrdtKind = CrdtKind::Rga;
}

impl Codec for CompositeMap {
    const KIND: CrdtKind = CrdtKind::Map;
}
