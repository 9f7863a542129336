//! Recurring trigger configuration.

use serde::{Deserialize, Serialize};

/// Recurring trigger configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerConfig {
    /// Interval in milliseconds between due-definition polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> u64 {
    1_000
}
