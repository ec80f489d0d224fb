//! Best-effort replication strategy: every healthy member is used, none may
//! fail. Used where any single live replica can answer, e.g. looking up
//! which members own blocks.

use std::time::Duration;

use corelib::{Error, InstanceDesc, Operation, Result};

use crate::strategy::ReplicationStrategy;

#[derive(Debug, Clone, Copy, Default)]
pub struct IgnoreUnhealthyInstancesReplicationStrategy;

impl IgnoreUnhealthyInstancesReplicationStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl ReplicationStrategy for IgnoreUnhealthyInstancesReplicationStrategy {
    fn filter(
        &self,
        mut instances: Vec<InstanceDesc>,
        op: Operation,
        _replication_factor: usize,
        heartbeat_timeout: Duration,
        now: i64,
        zone_aware: bool,
    ) -> Result<(Vec<InstanceDesc>, usize)> {
        instances.retain(|i| i.is_healthy(op, heartbeat_timeout, now));

        if instances.is_empty() {
            return Err(Error::TooManyUnhealthy {
                required: 1,
                found: 0,
                zone_aware,
            });
        }
        Ok((instances, 0))
    }

    fn name(&self) -> &'static str {
        "IgnoreUnhealthyInstancesReplicationStrategy"
    }
}
