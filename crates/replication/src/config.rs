//! Ring configuration.

use std::time::Duration;

use corelib::{Error, Result};
use kv::Codec;
use serde::{Deserialize, Serialize};

/// How the ring is read and how replica sets are sized.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Key of the ring value in the membership store.
    pub key: String,
    /// Encoding of the ring value.
    pub codec: Codec,
    /// Number of distinct members (or zones) each key is replicated to.
    pub replication_factor: usize,
    /// Members that have not heartbeated for longer are unhealthy. Zero
    /// disables the check.
    pub heartbeat_timeout: Duration,
    /// Spread replicas over distinct availability zones.
    pub zone_awareness_enabled: bool,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            key: "ring".to_string(),
            codec: Codec::default(),
            replication_factor: 3,
            heartbeat_timeout: Duration::from_secs(60),
            zone_awareness_enabled: false,
        }
    }
}

impl RingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.key.is_empty() {
            return Err(Error::Config("ring key must not be empty".into()));
        }
        if self.replication_factor == 0 {
            return Err(Error::Config("replication factor must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_replication_factor_rejected() {
        let config = RingConfig {
            replication_factor: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }
}
