//! The ring service.
//!
//! A `Ring` holds the latest snapshot of the membership ring and answers
//! lookups against it. Snapshots are immutable and swapped atomically, so
//! lookups never block on updates and always see one consistent version.
//!
//! Updates come either straight from the caller (`update`) or from a
//! background task following the ring key in the membership store
//! (`watch`).

use std::collections::BTreeSet;
use std::sync::Arc;

use arc_swap::ArcSwap;
use corelib::{unix_now, Error, InstanceState, Operation, Result, RingDesc, RingSnapshot};
use futures::StreamExt;
use kv::KvClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::RingConfig;
use crate::replication_set::ReplicationSet;
use crate::strategy::{DefaultReplicationStrategy, ReplicationStrategy};
use crate::subscribe::ReplicationSetWatcher;

/// Read side of the ring, as needed by request routing and discovery.
pub trait ReadRing: Send + Sync {
    /// Replication set for the key `key`, using `replication_factor`.
    fn get(&self, key: u32, op: Operation, replication_factor: usize) -> Result<ReplicationSet>;

    /// Every member healthy for `op`, with no failures tolerated.
    fn get_all_healthy(&self, op: Operation) -> Result<ReplicationSet>;

    /// Set covering every member, for operations that must reach all of
    /// them (queries over the whole ring, for instance).
    fn get_replication_set_for_operation(&self, op: Operation) -> Result<ReplicationSet>;

    fn replication_factor(&self) -> usize;

    fn instances_count(&self) -> usize;
}

pub struct Ring {
    config: RingConfig,
    strategy: Arc<dyn ReplicationStrategy>,
    snapshot: ArcSwap<RingSnapshot>,
    updates: watch::Sender<u64>,
}

impl Ring {
    /// Ring with the default replication strategy and no members.
    pub fn new(config: RingConfig) -> Result<Self> {
        Self::with_strategy(config, Arc::new(DefaultReplicationStrategy))
    }

    pub fn with_strategy(config: RingConfig, strategy: Arc<dyn ReplicationStrategy>) -> Result<Self> {
        config.validate()?;
        let (updates, _) = watch::channel(0);
        Ok(Self {
            config,
            strategy,
            snapshot: ArcSwap::from_pointee(RingSnapshot::default()),
            updates,
        })
    }

    pub fn config(&self) -> &RingConfig {
        &self.config
    }

    /// Replace the ring with `desc` and notify subscribers.
    pub fn update(&self, desc: RingDesc) {
        for (state, count) in desc.instances_by_state() {
            metrics::gauge!("ring_members", "state" => state.as_str()).set(count as f64);
        }

        let snapshot = RingSnapshot::build(desc);
        metrics::gauge!("ring_tokens").set(snapshot.tokens().len() as f64);
        debug!(
            instances = snapshot.instances_count(),
            tokens = snapshot.tokens().len(),
            zones = snapshot.zones_count(),
            "Ring updated"
        );

        self.snapshot.store(Arc::new(snapshot));
        self.updates.send_modify(|generation| *generation += 1);
    }

    /// The current snapshot. Holding it does not block updates.
    pub fn snapshot(&self) -> Arc<RingSnapshot> {
        self.snapshot.load_full()
    }

    pub fn zones_count(&self) -> usize {
        self.snapshot.load().zones_count()
    }

    pub fn has_instance(&self, id: &str) -> bool {
        self.snapshot.load().has_instance(id)
    }

    pub fn instance_state(&self, id: &str) -> Result<InstanceState> {
        self.snapshot
            .load()
            .desc()
            .instance(id)
            .map(|i| i.state)
            .ok_or_else(|| Error::InstanceNotFound(id.to_string()))
    }

    /// Watch replication sets for `op` and get notified only when they change.
    pub fn subscribe(self: &Arc<Self>, op: Operation) -> ReplicationSetWatcher {
        ReplicationSetWatcher::new(Arc::downgrade(self), self.updates.subscribe(), op)
    }

    pub(crate) fn get_all_healthy_or_empty(&self, op: Operation) -> ReplicationSet {
        self.get_all_healthy(op).unwrap_or_default()
    }

    /// Follow the ring key in `client` until `cancel` fires.
    ///
    /// Values that fail to decode are logged and skipped; the ring keeps its
    /// last good snapshot.
    pub fn watch(self: &Arc<Self>, client: Arc<dyn KvClient>, cancel: CancellationToken) -> JoinHandle<()> {
        let ring = Arc::clone(self);
        tokio::spawn(async move {
            let key = ring.config.key.clone();
            let codec = ring.config.codec;
            let mut values = client.watch_key(&key);
            info!(key = %key, "Watching ring");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = values.next() => {
                        let Some(value) = next else {
                            warn!(key = %key, "Ring watch stream ended");
                            break;
                        };
                        match codec.decode::<RingDesc>(&value.value) {
                            Ok(desc) => ring.update(desc),
                            Err(e) => warn!(key = %key, version = value.version, error = %e, "Failed to decode ring"),
                        }
                    }
                }
            }

            debug!(key = %key, "Ring watcher stopped");
        })
    }
}

impl ReadRing for Ring {
    fn get(&self, key: u32, op: Operation, replication_factor: usize) -> Result<ReplicationSet> {
        let snapshot = self.snapshot.load();
        let zone_aware = self.config.zone_awareness_enabled;
        let candidates = snapshot.walk(key, op, replication_factor, zone_aware)?;
        let (instances, max_errors) = self.strategy.filter(
            candidates,
            op,
            replication_factor,
            self.config.heartbeat_timeout,
            unix_now(),
            zone_aware,
        )?;
        Ok(ReplicationSet::new(instances, max_errors, 0))
    }

    fn get_all_healthy(&self, op: Operation) -> Result<ReplicationSet> {
        let snapshot = self.snapshot.load();
        if snapshot.is_empty() {
            return Err(Error::EmptyRing);
        }

        let now = unix_now();
        let instances = snapshot
            .instances()
            .iter()
            .filter(|i| i.is_healthy(op, self.config.heartbeat_timeout, now))
            .cloned()
            .collect();
        Ok(ReplicationSet::new(instances, 0, 0))
    }

    fn get_replication_set_for_operation(&self, op: Operation) -> Result<ReplicationSet> {
        let snapshot = self.snapshot.load();
        if snapshot.is_empty() {
            return Err(Error::EmptyRing);
        }

        let rf = self.config.replication_factor;
        let zone_aware = self.config.zone_awareness_enabled;
        let now = unix_now();

        let members = snapshot.instances();
        let mut healthy = Vec::with_capacity(members.len());
        let mut failed_zones = BTreeSet::new();
        for instance in members {
            if instance.is_healthy(op, self.config.heartbeat_timeout, now) {
                healthy.push(instance.clone());
            } else {
                failed_zones.insert(instance.zone.clone());
            }
        }

        if !zone_aware {
            // Tolerate rf/2 failures, as a single key would.
            let required = members.len().max(rf) - rf / 2;
            if healthy.len() < required {
                return Err(Error::TooManyUnhealthy {
                    required,
                    found: healthy.len(),
                    zone_aware,
                });
            }
            let max_errors = healthy.len() - required;
            return Ok(ReplicationSet::new(healthy, max_errors, 0));
        }

        // Only the zone budget applies here: a whole zone may be down.
        let replicated_zones = snapshot.zones_count().min(rf);
        let max_unavailable_zones = replicated_zones / 2;
        if failed_zones.len() > max_unavailable_zones {
            return Err(Error::TooManyUnhealthy {
                required: replicated_zones - max_unavailable_zones,
                found: replicated_zones.saturating_sub(failed_zones.len()),
                zone_aware,
            });
        }

        // A zone with one unhealthy member is treated as unavailable as a
        // whole; its healthy members are not asked.
        healthy.retain(|i| !failed_zones.contains(&i.zone));
        Ok(ReplicationSet::new(healthy, 0, max_unavailable_zones - failed_zones.len()))
    }

    fn replication_factor(&self) -> usize {
        self.config.replication_factor
    }

    fn instances_count(&self) -> usize {
        self.snapshot.load().instances_count()
    }
}
