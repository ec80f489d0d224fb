//! Replication strategy abstractions.
//!
//! After the ring walk picked candidate members for a key, a replication
//! strategy decides which of them the request actually goes to and how many
//! of those may fail:
//!
//! - **DefaultReplicationStrategy**: quorum of the replica set, unhealthy
//!   members count as failures already spent
//! - **IgnoreUnhealthyInstancesReplicationStrategy**: any healthy member is
//!   enough, no failures tolerated

pub mod default;
pub mod ignore_unhealthy;

pub use default::DefaultReplicationStrategy;
pub use ignore_unhealthy::IgnoreUnhealthyInstancesReplicationStrategy;

use std::time::Duration;

use corelib::{InstanceDesc, Operation, Result};

/// Trait for replication strategies.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (Send + Sync) as the ring shares one
/// strategy across every concurrent lookup.
pub trait ReplicationStrategy: Send + Sync + 'static {
    /// Drop members that cannot serve `op` and compute the error budget.
    ///
    /// # Arguments
    /// * `instances` - Candidates in ring-walk order
    /// * `op` - Operation the set is built for
    /// * `replication_factor` - Configured number of replicas
    /// * `heartbeat_timeout` - Members silent for longer are unhealthy
    /// * `now` - Current time, unix seconds
    /// * `zone_aware` - Whether candidates were spread across zones
    ///
    /// # Returns
    /// The healthy members (walk order preserved) and `max_errors`.
    fn filter(
        &self,
        instances: Vec<InstanceDesc>,
        op: Operation,
        replication_factor: usize,
        heartbeat_timeout: Duration,
        now: i64,
        zone_aware: bool,
    ) -> Result<(Vec<InstanceDesc>, usize)>;

    /// Get the strategy name (for logging/debugging).
    fn name(&self) -> &'static str;
}
