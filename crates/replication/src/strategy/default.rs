//! Quorum replication strategy.
//!
//! A request needs answers from a majority of the replica set:
//! `minSuccess = max(rf, candidates) / 2 + 1`. The replica set can be larger
//! than `rf` when the ring walk extended it over LEAVING members.
//!
//! Unhealthy members are dropped but still count in `minSuccess`, so too
//! many dead members fail the request before anything is sent.

use std::time::Duration;

use corelib::{Error, InstanceDesc, Operation, Result};

use crate::strategy::ReplicationStrategy;

/// Majority-quorum replication strategy.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReplicationStrategy;

impl DefaultReplicationStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ReplicationStrategy for DefaultReplicationStrategy {
    fn filter(
        &self,
        mut instances: Vec<InstanceDesc>,
        op: Operation,
        replication_factor: usize,
        heartbeat_timeout: Duration,
        now: i64,
        zone_aware: bool,
    ) -> Result<(Vec<InstanceDesc>, usize)> {
        let replica_set_size = replication_factor.max(instances.len());
        let min_success = replica_set_size / 2 + 1;

        instances.retain(|i| i.is_healthy(op, heartbeat_timeout, now));

        if instances.len() < min_success {
            return Err(Error::TooManyUnhealthy {
                required: min_success,
                found: instances.len(),
                zone_aware,
            });
        }

        let max_errors = instances.len() - min_success;
        Ok((instances, max_errors))
    }

    fn name(&self) -> &'static str {
        "DefaultReplicationStrategy"
    }
}
