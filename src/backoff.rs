//! Retry delay schedule for transient request failures.

use crate::config::{Config, UpdateConfig};
use rand::Rng;
use std::time::Duration;

/// Doubling delay: `base`, `2 * base`, `4 * base`, ... capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base_ms: u64,
    max_ms: u64,
    jitter_percent: u64,
}

impl ExponentialBackoff {
    pub const fn new(base_ms: u64, max_ms: u64) -> Self {
        Self {
            base_ms,
            max_ms,
            jitter_percent: 0,
        }
    }

    pub fn from_config(config: &UpdateConfig) -> Self {
        Self::new(config.retry_base_delay_ms, Config::RETRY_MAX_DELAY_MS)
    }

    /// Add up to `jitter_percent`% of random extra delay on top of each step.
    pub fn with_jitter(mut self, jitter_percent: u64) -> Self {
        self.jitter_percent = jitter_percent;
        self
    }

    /// Delay before retry number `retry` (0 = first retry).
    pub fn delay(&self, retry: u32) -> Duration {
        let exponential_delay = self
            .base_ms
            .saturating_mul(2u64.saturating_pow(retry.min(20)));
        let capped_delay = exponential_delay.min(self.max_ms);
        let jitter = if self.jitter_percent > 0 {
            rand::thread_rng().gen_range(0..=capped_delay * self.jitter_percent / 100)
        } else {
            0
        };
        Duration::from_millis(capped_delay + jitter)
    }
}
