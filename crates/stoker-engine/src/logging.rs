//! Logging initialization for engine embedders.

use tracing_subscriber::{EnvFilter, fmt};

use stoker_core::config::logging::LoggingConfig;

/// Initialize tracing/logging.
///
/// The `RUST_LOG` environment variable overrides the configured level when
/// set. Installs the global subscriber, so call it once at process
/// startup; embedders that install their own subscriber skip this.
pub fn init_logging(config: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}
