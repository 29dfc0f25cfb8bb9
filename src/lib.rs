//! # Tessera
//!
//! Delta-state CRDTs for replicas that write without coordination and
//! reconcile later through a deterministic merge.
//!
//! ## Architecture
//!
//! - **tessera-core**: replica ids, timestamps, version vectors, the
//!   [`Environment`] clock, and the [`Lattice`] / [`DeltaCrdt`] traits
//! - **tessera-crdt**: the data types ([`LwwMap`], [`MvMap`], [`PnCounter`],
//!   [`BoundedCounter`], [`Rga`], [`CompositeMap`]) and their JSON [`Codec`]
//!
//! ## Example
//!
//! ```
//! use tessera::{DeltaCrdt, Rga, SimpleEnvironment};
//!
//! let mut a: Rga<char> = Rga::new(SimpleEnvironment::shared("A"));
//! let mut b: Rga<char> = Rga::new(SimpleEnvironment::shared("B"));
//!
//! let delta = a.push('x').unwrap();
//! b.merge(&delta);
//! b.push('y').unwrap();
//! a.merge(&b);
//!
//! assert_eq!(a.to_vec(), vec!['x', 'y']);
//! assert_eq!(a, b);
//! ```
//!
//! Tombstones left by deletes and removals are never garbage collected.

pub use tessera_core::{
    DeltaCrdt, EnvHandle, Environment, EnvironmentConfig, Error, Lattice, ReplicaId, Result,
    SimpleEnvironment, Timestamp, VersionVector,
};
pub use tessera_crdt::{
    Accumulator, BoundedCounter, Codec, CompositeMap, CrdtKind, Element, LwwEntry, LwwMap,
    MvMap, MvSlot, PnCounter, Rga, SlotKey, Transfer, Value, ValueKind,
};
