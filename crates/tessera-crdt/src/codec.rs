//! JSON encoding of CRDT state.
//!
//! Each type is wrapped in an envelope `{"type": <kind>, "state": ...}` so a
//! decoder can refuse state of the wrong type. All internal collections are
//! ordered maps written out as sequences, which makes the encoding
//! canonical: `encode(decode(encode(x))) == encode(x)` byte for byte.
//!
//! Decoded values carry no environment; call
//! [`DeltaCrdt::bind`](tessera_core::DeltaCrdt::bind) before writing.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tessera_core::{Error, Result};

/// Type discriminator written in the envelope.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrdtKind {
    LwwMap,
    MvMap,
    PnCounter,
    BCounter,
    Rga,
    Map,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    #[serde(rename = "type")]
    kind: CrdtKind,
    state: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(rename = "type")]
    kind: CrdtKind,
    state: T,
}

/// Canonical JSON encoding of a CRDT's full internal state.
pub trait Codec: Serialize + DeserializeOwned {
    const KIND: CrdtKind;

    fn to_json(&self) -> Result<String> {
        let envelope = EnvelopeRef {
            kind: Self::KIND,
            state: self,
        };
        Ok(serde_json::to_string(&envelope)?)
    }

    fn from_json(json: &str) -> Result<Self> {
        let envelope: Envelope<Self> = serde_json::from_str(json)?;
        if envelope.kind != Self::KIND {
            return Err(Error::Deserialization(format!(
                "expected {:?} state, found {:?}",
                Self::KIND,
                envelope.kind
            )));
        }
        Ok(envelope.state)
    }
}

/// Serialize an ordered map as a sequence of `[key, value]` pairs.
///
/// JSON object keys must be strings; slot keys and timestamps are not.
pub(crate) mod entries {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<K, V, S>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        serializer.collect_seq(map.iter())
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Ord,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}
