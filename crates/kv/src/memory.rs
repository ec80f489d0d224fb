//! In-process membership store.
//!
//! Backs single-process deployments and tests. Each key carries a version
//! counter and a `watch` channel; CAS compares versions under the map's
//! per-shard lock.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

use crate::client::{KvClient, Versioned};
use crate::error::Result;

struct Slot {
    current: Option<Versioned>,
    /// Last version ever handed out for this key.
    last_version: u64,
    tx: watch::Sender<Option<Versioned>>,
}

impl Slot {
    fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            current: None,
            last_version: 0,
            tx,
        }
    }
}

/// Mutex-free, in-memory [`KvClient`].
#[derive(Default)]
pub struct InMemoryClient {
    slots: DashMap<String, Slot>,
}

impl InMemoryClient {
    pub fn new() -> Self {
        Self::default()
    }
}

impl std::fmt::Debug for InMemoryClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryClient")
            .field("keys", &self.slots.len())
            .finish()
    }
}

#[async_trait]
impl KvClient for InMemoryClient {
    async fn get(&self, key: &str) -> Result<Option<Versioned>> {
        Ok(self.slots.get(key).and_then(|slot| slot.current.clone()))
    }

    async fn cas(&self, key: &str, expected: Option<u64>, value: Bytes) -> Result<Option<u64>> {
        let mut slot = self.slots.entry(key.to_owned()).or_insert_with(Slot::new);
        let current = slot.current.as_ref().map(|v| v.version);
        if current != expected {
            tracing::trace!(key, ?current, ?expected, "CAS version mismatch");
            return Ok(None);
        }

        slot.last_version += 1;
        let written = Versioned {
            version: slot.last_version,
            value,
        };
        slot.current = Some(written.clone());
        slot.tx.send_replace(Some(written));
        Ok(Some(slot.last_version))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        if let Some(mut slot) = self.slots.get_mut(key) {
            slot.current = None;
            slot.tx.send_replace(None);
        }
        Ok(())
    }

    fn watch_key(&self, key: &str) -> BoxStream<'static, Versioned> {
        let rx = self
            .slots
            .entry(key.to_owned())
            .or_insert_with(Slot::new)
            .tx
            .subscribe();

        stream::unfold((rx, true), |(mut rx, mut initial)| async move {
            loop {
                if !initial && rx.changed().await.is_err() {
                    return None;
                }
                initial = false;
                let current = rx.borrow_and_update().clone();
                if let Some(value) = current {
                    return Some((value, (rx, false)));
                }
            }
        })
        .boxed()
    }
}
