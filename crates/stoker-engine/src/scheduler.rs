//! Time-delay scheduler — promotes due jobs into their queues.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time;
use tracing;

use stoker_core::config::scheduler::SchedulerConfig;
use stoker_core::result::AppResult;
use stoker_entity::job::JobState;
use stoker_store::{JobStore, JobUpdate};

use crate::dispatcher::Dispatcher;

/// Upper bound on jobs promoted per polling pass.
const PROMOTE_BATCH: usize = 100;

/// Periodic task that moves `Scheduled` jobs whose due time has passed
/// into the `Enqueued` state.
///
/// Promotion happens at polling resolution: a job fires at most one
/// interval after its due time and never before it. Each promotion is a
/// compare-and-swap, so a cancellation racing in first simply makes the
/// swap fail and the job is skipped.
#[derive(Debug)]
pub struct DelayScheduler {
    /// Store queried for due jobs.
    store: Arc<dyn JobStore>,
    /// Dispatcher notified after every promotion.
    dispatcher: Arc<Dispatcher>,
    /// Scheduler configuration.
    config: SchedulerConfig,
}

impl DelayScheduler {
    /// Create a new scheduler.
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            config,
        }
    }

    /// Run the polling loop until the cancel signal is received.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        tracing::info!(
            "Time-delay scheduler started with poll_interval={}ms",
            self.config.poll_interval_ms
        );

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        tracing::info!("Time-delay scheduler received shutdown signal");
                        break;
                    }
                }
                _ = time::sleep(poll_interval) => {
                    if let Err(e) = self.promote_due().await {
                        tracing::error!("Promotion pass failed: {}", e);
                    }
                }
            }
        }

        tracing::info!("Time-delay scheduler stopped");
    }

    /// Promote every `Scheduled` job whose due time has passed.
    ///
    /// Returns the number of jobs promoted in this pass.
    pub async fn promote_due(&self) -> AppResult<usize> {
        let now = Utc::now();
        let due = self.store.list_due(None, now, PROMOTE_BATCH).await?;

        let mut promoted = 0;
        for job in due {
            let update = JobUpdate::to_state(JobState::Enqueued)
                .enqueued_at(Some(Utc::now()))
                .due_at(None);

            match self.store.update_job(job.id, job.version, update).await {
                Ok(_) => {
                    promoted += 1;
                    self.dispatcher.notify();
                    tracing::debug!("Promoted due job: id={}, queue='{}'", job.id, job.queue);
                }
                Err(e) if e.is_conflict() || e.is_not_found() => {
                    // Raced with a cancellation or another mutation; the
                    // next pass sees the record's current truth.
                    tracing::debug!("Skipped promotion of job {}: {}", job.id, e);
                }
                Err(e) => {
                    tracing::error!("Failed to promote job {}: {}", job.id, e);
                }
            }
        }

        Ok(promoted)
    }
}
