//! Time-delay scheduler configuration.

use serde::{Deserialize, Serialize};

/// Time-delay scheduler configuration.
///
/// The poll interval trades promotion latency for store load: a delayed
/// job may be promoted up to one interval after its due time, never
/// before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Interval in milliseconds between due-job polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1_000
}
