//! Value codecs for the membership store.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Wire format of values stored under a key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    /// Human-readable, easy to inspect with the store's own tooling.
    #[default]
    Json,
    /// Compact binary encoding.
    Bincode,
}

impl Codec {
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Bytes> {
        let bytes = match self {
            Codec::Json => serde_json::to_vec(value)?,
            Codec::Bincode => bincode::serialize(value)?,
        };
        Ok(Bytes::from(bytes))
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        Ok(match self {
            Codec::Json => serde_json::from_slice(bytes)?,
            Codec::Bincode => bincode::deserialize(bytes)?,
        })
    }
}
