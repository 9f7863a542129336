//! Worker pool configuration.

use serde::{Deserialize, Serialize};

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent job processing tasks.
    #[serde(default = "default_count")]
    pub count: usize,
    /// Per-job execution timeout in milliseconds. A handler still running
    /// when this elapses is treated as a failed attempt; the engine stops
    /// waiting but does not force-terminate non-cooperative work.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout_ms: u64,
    /// How long a graceful shutdown waits for in-flight jobs before
    /// abandoning them, in milliseconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            count: default_count(),
            execution_timeout_ms: default_execution_timeout(),
            shutdown_grace_ms: default_shutdown_grace(),
        }
    }
}

fn default_count() -> usize {
    5
}

fn default_execution_timeout() -> u64 {
    300_000
}

fn default_shutdown_grace() -> u64 {
    30_000
}
