//! # tessera-core
//!
//! The causality substrate shared by every Tessera CRDT:
//! - [`ReplicaId`] and [`Timestamp`]: unique, totally ordered event ids
//! - [`VersionVector`]: per-replica high-water marks and dominance queries
//! - [`Environment`]: the clock a replica writes through, with
//!   [`SimpleEnvironment`] as the in-memory implementation
//! - [`Lattice`] and [`DeltaCrdt`]: the merge and delta contract
//! - [`Error`]: the error taxonomy for write paths and decoding

pub mod env;
pub mod error;
pub mod lattice;
pub mod timestamp;
pub mod version_vector;

pub use env::{EnvHandle, Environment, EnvironmentConfig, SimpleEnvironment};
pub use error::{Error, Result};
pub use lattice::{DeltaCrdt, Lattice};
pub use timestamp::{ReplicaId, Timestamp};
pub use version_vector::VersionVector;
