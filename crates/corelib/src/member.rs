//! Member descriptors for the replication ring.
//!
//! An `InstanceDesc` is the record one node publishes about itself in the
//! shared ring value: identity, dialable address, availability zone, owned
//! tokens, lifecycle state and heartbeat timestamps.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::operation::{is_healthy_for, Operation};

/// Lifecycle state of a ring member.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceState {
    /// Registered with tokens, not yet serving reads.
    Joining,
    /// Fully serving traffic.
    Active,
    /// Shutting down; flushing or handing off its data.
    Leaving,
    /// Shutdown work finished; tokens no longer count.
    Left,
}

impl InstanceState {
    pub const ALL: [InstanceState; 4] = [
        InstanceState::Joining,
        InstanceState::Active,
        InstanceState::Leaving,
        InstanceState::Left,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceState::Joining => "JOINING",
            InstanceState::Active => "ACTIVE",
            InstanceState::Leaving => "LEAVING",
            InstanceState::Left => "LEFT",
        }
    }

    /// Whether the lifecycle state machine allows moving from `self` to `to`.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, to: InstanceState) -> bool {
        use InstanceState::*;
        matches!(
            (self, to),
            (Joining, Active) | (Joining, Leaving) | (Active, Leaving) | (Leaving, Left)
        ) || *self == to
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One node of the ring, as stored in the membership store.
///
/// Cheap enough to clone per request: replication sets hand owned copies to
/// every per-replica task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDesc {
    /// Stable identity (usually hostname, or hostname plus port).
    pub id: String,
    /// Address replicas are dialed on.
    pub addr: String,
    /// Availability zone; empty means the member takes no part in zone-awareness.
    #[serde(default)]
    pub zone: String,
    /// Ring positions owned by this member, sorted ascending.
    #[serde(default)]
    pub tokens: Vec<u32>,
    pub state: InstanceState,
    /// Last heartbeat, unix seconds.
    pub timestamp: i64,
    /// First registration, unix seconds.
    #[serde(default)]
    pub registered_timestamp: i64,
}

impl InstanceDesc {
    pub fn new(
        id: impl Into<String>,
        addr: impl Into<String>,
        zone: impl Into<String>,
        mut tokens: Vec<u32>,
        state: InstanceState,
        now: i64,
    ) -> Self {
        tokens.sort_unstable();
        Self {
            id: id.into(),
            addr: addr.into(),
            zone: zone.into(),
            tokens,
            state,
            timestamp: now,
            registered_timestamp: now,
        }
    }

    /// Heartbeat check. A zero timeout disables it.
    pub fn is_heartbeat_healthy(&self, heartbeat_timeout: Duration, now: i64) -> bool {
        if heartbeat_timeout.is_zero() {
            return true;
        }
        now.saturating_sub(self.timestamp) <= heartbeat_timeout.as_secs() as i64
    }

    /// Whether this member can serve `op` right now.
    pub fn is_healthy(&self, op: Operation, heartbeat_timeout: Duration, now: i64) -> bool {
        is_healthy_for(self.state, op) && self.is_heartbeat_healthy(heartbeat_timeout, now)
    }

    /// Structural equality that ignores the heartbeat timestamp.
    pub fn same_ignoring_timestamp(&self, other: &InstanceDesc) -> bool {
        self.id == other.id
            && self.addr == other.addr
            && self.zone == other.zone
            && self.tokens == other.tokens
            && self.state == other.state
            && self.registered_timestamp == other.registered_timestamp
    }
}

/// Current wall-clock time in unix seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
