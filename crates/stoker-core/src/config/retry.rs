//! Retry and backoff policy configuration.

use std::time::Duration;

use rand::RngExt;
use serde::{Deserialize, Serialize};

/// Retry policy applied to transient job failures.
///
/// Delays grow exponentially (`base * 2^(attempt-1)`), are capped at
/// `max_delay_ms`, and carry a random jitter of up to `jitter` times the
/// capped delay in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt (0 = no retries).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base delay before the first retry, in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,
    /// Upper bound on the computed delay, in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,
    /// Jitter factor (0.0-1.0) to add randomness.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl RetryConfig {
    /// Calculate the backoff delay for a given retry attempt (1-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay_ms as f64;
        let max_ms = self.max_delay_ms as f64;
        let exp = 2_f64.powi((attempt - 1).min(63) as i32);
        let delay_ms = (base_ms * exp).min(max_ms);

        let jitter_ms = if self.jitter > 0.0 && delay_ms > 0.0 {
            let range = delay_ms * self.jitter;
            rand::rng().random_range(-range..=range)
        } else {
            0.0
        };

        Duration::from_millis((delay_ms + jitter_ms).max(0.0) as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    1_000
}

fn default_max_delay() -> u64 {
    300_000
}

fn default_jitter() -> f64 {
    0.1
}
