//! Terminal job retention configuration.

use serde::{Deserialize, Serialize};

/// Retention policy for terminal jobs.
///
/// Jobs in a terminal state remain queryable through `status()` for the
/// retention window and are then purged by a periodic sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// How long terminal jobs are kept, in seconds.
    #[serde(default = "default_retain_for")]
    pub retain_for_seconds: u64,
    /// Interval between purge sweeps, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retain_for_seconds: default_retain_for(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

fn default_retain_for() -> u64 {
    86_400
}

fn default_sweep_interval() -> u64 {
    60
}
