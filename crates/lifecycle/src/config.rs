//! Lifecycler configuration.

use std::time::Duration;

use corelib::Error;
use kv::{BackoffConfig, Codec};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecyclerConfig {
    /// Instance id, unique in the ring.
    pub id: String,
    /// Address other members dial.
    pub addr: String,
    /// Availability zone, empty if unknown.
    pub zone: String,
    /// Tokens claimed on join.
    pub num_tokens: usize,
    pub heartbeat_period: Duration,
    /// Members whose last heartbeat is older than this are removed from the
    /// ring by whoever notices first. Zero disables forgetting.
    pub forget_period: Duration,
    /// Remove our entry from the ring once we have left.
    pub unregister_on_shutdown: bool,
    pub ring_key: String,
    pub codec: Codec,
    pub backoff: BackoffConfig,
}

impl Default for LifecyclerConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            addr: String::new(),
            zone: String::new(),
            num_tokens: 128,
            heartbeat_period: Duration::from_secs(5),
            forget_period: Duration::from_secs(10 * 60),
            unregister_on_shutdown: true,
            ring_key: "ring".to_string(),
            codec: Codec::default(),
            backoff: BackoffConfig::default(),
        }
    }
}

impl LifecyclerConfig {
    pub fn validate(&self) -> corelib::Result<()> {
        if self.id.is_empty() {
            return Err(Error::Config("instance id must not be empty".into()));
        }
        if self.addr.is_empty() {
            return Err(Error::Config("instance address must not be empty".into()));
        }
        if self.num_tokens == 0 {
            return Err(Error::Config("num_tokens must be at least 1".into()));
        }
        if self.heartbeat_period.is_zero() {
            return Err(Error::Config("heartbeat period must be positive".into()));
        }
        if self.ring_key.is_empty() {
            return Err(Error::Config("ring key must not be empty".into()));
        }
        if !self.forget_period.is_zero() && self.forget_period <= self.heartbeat_period {
            return Err(Error::Config("forget period must be longer than the heartbeat period".into()));
        }
        Ok(())
    }
}
