//! Engine configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Every field carries a default so an embedder can run the
//! engine from `EngineConfig::default()` without any file at all.

pub mod logging;
pub mod queues;
pub mod retention;
pub mod retry;
pub mod scheduler;
pub mod trigger;
pub mod worker;

use serde::{Deserialize, Serialize};

use self::logging::LoggingConfig;
use self::queues::QueuesConfig;
use self::retention::RetentionConfig;
use self::retry::RetryConfig;
use self::scheduler::SchedulerConfig;
use self::trigger::TriggerConfig;
use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root engine configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Named queues in priority order.
    #[serde(default)]
    pub queues: QueuesConfig,
    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Time-delay scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Recurring trigger settings.
    #[serde(default)]
    pub trigger: TriggerConfig,
    /// Retry and backoff policy.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Terminal job retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `STOKER_`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("STOKER")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }

    /// Check the configuration for values the engine cannot run with.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.queues.names.is_empty() {
            return Err(AppError::configuration(
                "at least one queue must be configured",
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for name in &self.queues.names {
            if name.is_empty() {
                return Err(AppError::configuration("queue names must be non-empty"));
            }
            if !seen.insert(name.as_str()) {
                return Err(AppError::configuration(format!(
                    "duplicate queue name '{name}'"
                )));
            }
        }
        if self.worker.count == 0 {
            return Err(AppError::configuration("worker.count must be at least 1"));
        }
        if self.worker.execution_timeout_ms == 0 {
            return Err(AppError::configuration(
                "worker.execution_timeout_ms must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return Err(AppError::configuration(
                "retry.jitter must be between 0.0 and 1.0",
            ));
        }
        Ok(())
    }
}
