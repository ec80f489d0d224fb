//! Change notifications for replication sets.

use std::sync::Weak;

use corelib::Operation;
use futures::stream::{self, BoxStream};
use tokio::sync::watch;

use crate::replication_set::{has_replication_set_changed, ReplicationSet};
use crate::ring::Ring;

/// Yields the healthy replication set for one operation whenever it changes.
///
/// Ring updates that only move heartbeat timestamps are swallowed. An empty
/// ring is reported as an empty set.
pub struct ReplicationSetWatcher {
    ring: Weak<Ring>,
    updates: watch::Receiver<u64>,
    op: Operation,
    last: Option<ReplicationSet>,
}

impl ReplicationSetWatcher {
    pub(crate) fn new(ring: Weak<Ring>, updates: watch::Receiver<u64>, op: Operation) -> Self {
        Self {
            ring,
            updates,
            op,
            last: None,
        }
    }

    /// The next distinct replication set. The first call returns the current
    /// one right away. `None` once the ring is gone.
    pub async fn changed(&mut self) -> Option<ReplicationSet> {
        loop {
            if self.last.is_some() {
                self.updates.changed().await.ok()?;
            }

            let current = self.ring.upgrade()?.get_all_healthy_or_empty(self.op);
            let changed = match &self.last {
                Some(previous) => has_replication_set_changed(previous, &current),
                None => true,
            };
            if changed {
                self.last = Some(current.clone());
                return Some(current);
            }
        }
    }

    pub fn into_stream(self) -> BoxStream<'static, ReplicationSet> {
        Box::pin(stream::unfold(self, |mut watcher| async move {
            let set = watcher.changed().await?;
            Some((set, watcher))
        }))
    }
}
