//! The membership store contract.
//!
//! The store is a set of compare-and-swap registers keyed by string. The
//! ring lives under a single key as one serialized value, so every write
//! races against the whole ring and conflicts are resolved by optimistic
//! retry (see [`crate::cas_loop`]).

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::error::Result;

/// A value together with the version it was written at.
///
/// Versions are per key, strictly increasing and never reused, including
/// across deletes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned {
    pub version: u64,
    pub value: Bytes,
}

/// Compare-and-swap key-value store holding the ring.
#[async_trait]
pub trait KvClient: Send + Sync + 'static {
    /// Current value of `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Versioned>>;

    /// Write `value` only if `key` is still at `expected` (`None`: absent).
    ///
    /// Returns the new version, or `None` when another writer got there first.
    async fn cas(&self, key: &str, expected: Option<u64>, value: Bytes) -> Result<Option<u64>>;

    /// Remove `key`. Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Stream of values written to `key`, starting with the current one.
    ///
    /// Slow consumers may skip intermediate values; the latest one is always
    /// delivered.
    fn watch_key(&self, key: &str) -> BoxStream<'static, Versioned>;
}
