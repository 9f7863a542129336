//! Retention sweeper — purges terminal jobs past the retention window.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tokio::sync::watch;
use tokio::time;
use tracing;

use stoker_core::config::retention::RetentionConfig;
use stoker_core::result::AppResult;
use stoker_store::JobStore;

/// Periodic task that removes `Succeeded`, `Failed`, and `Deleted` jobs
/// once they have been terminal for longer than the retention window.
/// Active jobs are never touched.
#[derive(Debug)]
pub struct RetentionSweeper {
    /// Store to purge.
    store: Arc<dyn JobStore>,
    /// Retention settings.
    config: RetentionConfig,
}

impl RetentionSweeper {
    /// Create a new sweeper.
    pub fn new(store: Arc<dyn JobStore>, config: RetentionConfig) -> Self {
        Self { store, config }
    }

    /// Run the sweep loop until the cancel signal is received.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            "Retention sweeper started with retain_for={}s, sweep_interval={}s",
            self.config.retain_for_seconds,
            self.config.sweep_interval_seconds
        );

        let interval = Duration::from_secs(self.config.sweep_interval_seconds);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        tracing::info!("Retention sweeper received shutdown signal");
                        break;
                    }
                }
                _ = time::sleep(interval) => {
                    match self.sweep().await {
                        Ok(0) => {}
                        Ok(purged) => tracing::info!("Purged {} terminal jobs", purged),
                        Err(e) => tracing::error!("Retention sweep failed: {}", e),
                    }
                }
            }
        }

        tracing::info!("Retention sweeper stopped");
    }

    /// Purge terminal jobs older than the retention window once.
    pub async fn sweep(&self) -> AppResult<u64> {
        let cutoff = Utc::now() - ChronoDuration::seconds(self.config.retain_for_seconds as i64);
        self.store.purge_terminal(cutoff).await
    }
}
