//! Recurring trigger — materializes jobs from cron definitions.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tokio::sync::watch;
use tokio::time;
use tracing;

use stoker_core::config::trigger::TriggerConfig;
use stoker_core::error::AppError;
use stoker_core::result::AppResult;
use stoker_entity::job::Job;
use stoker_store::JobStore;

use crate::dispatcher::Dispatcher;

/// Upper bound on definitions fired per polling pass.
const FIRE_BATCH: usize = 100;

/// Compute the next occurrence of a cron expression strictly after `after`.
///
/// Expressions use the seconds-resolution format `sec min hour day-of-month
/// month day-of-week`. A malformed expression or one with no future
/// occurrence is a validation error.
pub fn next_occurrence(cron_expr: &str, after: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
    let schedule = Schedule::from_str(cron_expr).map_err(|e| {
        AppError::validation(format!("invalid cron expression '{cron_expr}': {e}"))
    })?;

    schedule.after(&after).next().ok_or_else(|| {
        AppError::validation(format!(
            "cron expression '{cron_expr}' has no future occurrence"
        ))
    })
}

/// Periodic task that fires due recurring definitions.
///
/// Each due definition materializes one fresh `Enqueued` job and advances
/// `next_due_at` to the next occurrence strictly after the current time,
/// so slots missed while the engine was down collapse into a single fire.
/// The advance is a compare-and-swap on the stored `next_due_at`: of two
/// pollers racing on the same slot, exactly one fires.
#[derive(Debug)]
pub struct RecurringTrigger {
    /// Store holding the definitions.
    store: Arc<dyn JobStore>,
    /// Dispatcher notified after every fire.
    dispatcher: Arc<Dispatcher>,
    /// Trigger configuration.
    config: TriggerConfig,
}

impl RecurringTrigger {
    /// Create a new trigger.
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        config: TriggerConfig,
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
            "Recurring trigger started with poll_interval={}ms",
            self.config.poll_interval_ms
        );

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            tokio::select! {
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        tracing::info!("Recurring trigger received shutdown signal");
                        break;
                    }
                }
                _ = time::sleep(poll_interval) => {
                    if let Err(e) = self.fire_due().await {
                        tracing::error!("Recurring fire pass failed: {}", e);
                    }
                }
            }
        }

        tracing::info!("Recurring trigger stopped");
    }

    /// Fire every definition whose `next_due_at` has passed.
    ///
    /// Returns the number of jobs materialized in this pass.
    pub async fn fire_due(&self) -> AppResult<usize> {
        let now = Utc::now();
        let due = self.store.list_recurring_due(now, FIRE_BATCH).await?;

        let mut fired = 0;
        for def in due {
            let next = match next_occurrence(&def.cron, now) {
                Ok(next) => next,
                Err(e) => {
                    // Registration validates expressions, so this only
                    // happens if the stored definition was corrupted.
                    tracing::warn!("Recurring '{}' has an unusable schedule: {}", def.id, e);
                    continue;
                }
            };

            let job = Job::enqueued(def.action.clone(), &def.queue, def.max_retries);
            match self
                .store
                .fire_recurring(&def.id, def.next_due_at, next, &job)
                .await
            {
                Ok(Some(job_id)) => {
                    fired += 1;
                    self.dispatcher.notify();
                    tracing::debug!(
                        "Recurring '{}' fired job {} (next occurrence {})",
                        def.id,
                        job_id,
                        next
                    );
                }
                Ok(None) => {
                    // Definition removed, replaced, or its slot consumed
                    // by a concurrent poll since we listed it.
                    tracing::debug!("Recurring '{}' slot was no longer available", def.id);
                }
                Err(e) => {
                    tracing::error!("Failed to fire recurring '{}': {}", def.id, e);
                }
            }
        }

        Ok(fired)
    }
}
