//! Typed read-modify-write over a [`KvClient`] key.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backoff::{Backoff, BackoffConfig};
use crate::client::KvClient;
use crate::codec::Codec;
use crate::error::Result;

/// Read and decode the value stored under `key`.
pub async fn get_typed<T: DeserializeOwned>(client: &dyn KvClient, codec: Codec, key: &str) -> Result<Option<T>> {
    match client.get(key).await? {
        Some(versioned) => Ok(Some(codec.decode(&versioned.value)?)),
        None => Ok(None),
    }
}

/// Apply `f` to the current value of `key` and write back its result.
///
/// `f` receives the decoded value (`None` if the key is absent) and returns
/// the value to store, or `None` to leave the key untouched. When a
/// concurrent writer wins the race, the value is reloaded and `f` runs
/// again after a backoff. Conflicts are retried without limit; store and
/// codec errors are returned immediately.
///
/// Returns the value that was written, if any.
pub async fn cas_loop<T, F>(
    client: &dyn KvClient,
    codec: Codec,
    key: &str,
    backoff: &BackoffConfig,
    mut f: F,
) -> Result<Option<T>>
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Option<T>) -> Option<T>,
{
    let mut backoff = Backoff::new(backoff.clone());
    loop {
        let current = client.get(key).await?;
        let (version, decoded) = match current {
            Some(v) => (Some(v.version), Some(codec.decode::<T>(&v.value)?)),
            None => (None, None),
        };

        let Some(updated) = f(decoded) else {
            return Ok(None);
        };

        let encoded = codec.encode(&updated)?;
        if client.cas(key, version, encoded).await?.is_some() {
            return Ok(Some(updated));
        }

        metrics::counter!("kv_cas_retries_total").increment(1);
        tracing::debug!(key, retries = backoff.retries(), "CAS conflict, retrying");
        backoff.wait().await;
    }
}
