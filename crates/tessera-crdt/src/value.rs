//! Values stored in the register maps.
//!
//! A map slot is addressed by a user key together with a [`ValueKind`], so
//! the same key can hold a boolean, a double, an integer and a string side
//! by side without the writes interfering.

use serde::{Deserialize, Serialize};
use std::fmt;
use tessera_core::{Error, Result};

/// Discriminator of a [`Value`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    Boolean,
    Double,
    Integer,
    String,
}

/// A register value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Value {
    Boolean(bool),
    Double(f64),
    Integer(i64),
    String(String),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Boolean(_) => ValueKind::Boolean,
            Value::Double(_) => ValueKind::Double,
            Value::Integer(_) => ValueKind::Integer,
            Value::String(_) => ValueKind::String,
        }
    }

    /// Reject values that cannot be replicated. A non-finite double has no
    /// JSON form and NaN never equals itself, so neither may be written.
    pub fn validate(&self) -> Result<()> {
        match self {
            Value::Double(d) if !d.is_finite() => Err(Error::InvalidValue(d.to_string())),
            _ => Ok(()),
        }
    }

    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Double(d) => write!(f, "{}", d),
            Value::Integer(i) => write!(f, "{}", i),
            Value::String(s) => write!(f, "{:?}", s),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Self {
        Value::Double(d)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

/// Address of one map slot: a user key plus the kind of value it holds.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub key: String,
    pub kind: ValueKind,
}

impl SlotKey {
    pub fn new(key: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            key: key.into(),
            kind,
        }
    }
}
