//! Error types shared by every Tessera CRDT.

use thiserror::Error;

/// Errors raised by write paths and by decoding.
///
/// `merge` and `generate_delta` never fail, so none of these variants can
/// come out of them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Index out of range: {index} (length: {len})")]
    OutOfRange { index: usize, len: usize },

    #[error("Insufficient rights: requested {requested}, available {available}")]
    InsufficientRights { requested: i64, available: i64 },

    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Timestamp counter exhausted")]
    CounterOverflow,

    #[error("Environment is read-only")]
    ReadOnly,

    #[error("No environment bound; value is merge-only")]
    NoEnvironment,

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Deserialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
