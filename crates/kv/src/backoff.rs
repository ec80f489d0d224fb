//! Exponential backoff with jitter for retry loops.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounds of the retry delay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Delay doubles on every retry up to `max_backoff`; the actual sleep is
/// drawn uniformly from `[delay / 2, delay]`.
#[derive(Debug)]
pub struct Backoff {
    config: BackoffConfig,
    retries: u32,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        Self { config, retries: 0 }
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn reset(&mut self) {
        self.retries = 0;
    }

    /// Delay before the next attempt; advances the retry counter.
    pub fn next_delay(&mut self) -> Duration {
        let ceiling = self
            .config
            .min_backoff
            .saturating_mul(1u32 << self.retries.min(16))
            .min(self.config.max_backoff);
        self.retries = self.retries.saturating_add(1);

        let millis = ceiling.as_millis() as u64;
        if millis < 2 {
            return ceiling;
        }
        Duration::from_millis(rand::thread_rng().gen_range(millis / 2..=millis))
    }

    pub async fn wait(&mut self) {
        let delay = self.next_delay();
        tokio::time::sleep(delay).await;
    }
}
