//! Client facade for submitting and managing jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing;

use stoker_core::config::EngineConfig;
use stoker_core::error::AppError;
use stoker_core::result::AppResult;
use stoker_core::types::JobId;
use stoker_entity::continuation::ContinuationCondition;
use stoker_entity::job::{ActionInvocation, Job, JobState};
use stoker_entity::recurring::RecurringDefinition;
use stoker_store::JobStore;

use crate::continuation::ContinuationGraph;
use crate::dispatcher::Dispatcher;
use crate::registry::ActionRegistry;
use crate::trigger::next_occurrence;

/// Management surface of the engine.
///
/// Every submission is validated synchronously: an unknown action name, an
/// unconfigured queue, a malformed cron expression, or a cyclic
/// continuation is rejected before anything reaches the store. The client
/// is cheap to clone and can be used from a process that runs no workers
/// at all.
#[derive(Debug, Clone)]
pub struct JobClient {
    /// Store jobs are persisted in.
    store: Arc<dyn JobStore>,
    /// Dispatcher signalled when a submission is immediately runnable.
    dispatcher: Arc<Dispatcher>,
    /// Graph for continuation submissions and cancel cascades.
    graph: Arc<ContinuationGraph>,
    /// Registry used to validate action names.
    registry: Arc<ActionRegistry>,
    /// Engine configuration for defaults and queue validation.
    config: EngineConfig,
}

impl JobClient {
    /// Create a new client.
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        graph: Arc<ContinuationGraph>,
        registry: Arc<ActionRegistry>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            graph,
            registry,
            config,
        }
    }

    /// Submit an immediate job to the default queue.
    pub async fn enqueue(&self, action: ActionInvocation) -> AppResult<JobId> {
        self.enqueue_on(self.config.queues.default_queue(), action)
            .await
    }

    /// Submit an immediate job to a named queue.
    pub async fn enqueue_on(&self, queue: &str, action: ActionInvocation) -> AppResult<JobId> {
        self.validate_action(&action)?;
        self.validate_queue(queue)?;

        let job = Job::enqueued(action, queue, self.config.retry.max_retries);
        self.store.create_job(&job).await?;
        self.dispatcher.notify();

        tracing::debug!(
            "Enqueued job: id={}, action='{}', queue='{}'",
            job.id,
            job.action.name,
            job.queue
        );
        Ok(job.id)
    }

    /// Submit a job that runs after a delay, on the default queue.
    pub async fn schedule(&self, action: ActionInvocation, delay: Duration) -> AppResult<JobId> {
        self.schedule_on(self.config.queues.default_queue(), action, delay)
            .await
    }

    /// Submit a job that runs after a delay, on a named queue.
    pub async fn schedule_on(
        &self,
        queue: &str,
        action: ActionInvocation,
        delay: Duration,
    ) -> AppResult<JobId> {
        let due_at = Utc::now() + ChronoDuration::milliseconds(delay.as_millis() as i64);
        self.schedule_at_on(queue, action, due_at).await
    }

    /// Submit a job that runs at an absolute time, on the default queue.
    pub async fn schedule_at(
        &self,
        action: ActionInvocation,
        due_at: DateTime<Utc>,
    ) -> AppResult<JobId> {
        self.schedule_at_on(self.config.queues.default_queue(), action, due_at)
            .await
    }

    /// Submit a job that runs at an absolute time, on a named queue.
    ///
    /// A due time in the past is not an error; the job is promoted on the
    /// scheduler's next pass.
    pub async fn schedule_at_on(
        &self,
        queue: &str,
        action: ActionInvocation,
        due_at: DateTime<Utc>,
    ) -> AppResult<JobId> {
        self.validate_action(&action)?;
        self.validate_queue(queue)?;

        let job = Job::scheduled(action, queue, due_at, self.config.retry.max_retries);
        self.store.create_job(&job).await?;

        tracing::debug!(
            "Scheduled job: id={}, action='{}', queue='{}', due_at={}",
            job.id,
            job.action.name,
            job.queue,
            due_at
        );
        Ok(job.id)
    }

    /// Create or replace a recurring definition on the default queue.
    pub async fn define_recurring(
        &self,
        id: &str,
        cron: &str,
        action: ActionInvocation,
    ) -> AppResult<()> {
        self.define_recurring_on(self.config.queues.default_queue(), id, cron, action)
            .await
    }

    /// Create or replace a recurring definition on a named queue.
    ///
    /// Redefinition replaces schedule and template wholesale; future
    /// firings follow only the new schedule. Jobs already materialized
    /// from the old definition are unaffected.
    pub async fn define_recurring_on(
        &self,
        queue: &str,
        id: &str,
        cron: &str,
        action: ActionInvocation,
    ) -> AppResult<()> {
        if id.is_empty() {
            return Err(AppError::validation("recurring id must be non-empty"));
        }
        self.validate_action(&action)?;
        self.validate_queue(queue)?;
        let next_due_at = next_occurrence(cron, Utc::now())?;

        let def = RecurringDefinition::new(
            id,
            action,
            queue,
            cron,
            self.config.retry.max_retries,
            next_due_at,
        );
        self.store.upsert_recurring(&def).await?;

        tracing::info!(
            "Defined recurring '{}': cron='{}', queue='{}', first fire {}",
            id,
            cron,
            queue,
            next_due_at
        );
        Ok(())
    }

    /// Remove a recurring definition. Returns whether it existed.
    pub async fn remove_recurring(&self, id: &str) -> AppResult<bool> {
        self.store.remove_recurring(id).await
    }

    /// Materialize one instance of a recurring definition immediately,
    /// without altering its schedule.
    pub async fn trigger_recurring_now(&self, id: &str) -> AppResult<JobId> {
        let def = self
            .store
            .get_recurring(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("recurring definition '{id}' not found")))?;

        let job = Job::enqueued(def.action, &def.queue, def.max_retries);
        self.store.create_job(&job).await?;
        self.dispatcher.notify();

        tracing::info!("Manually triggered recurring '{}' as job {}", id, job.id);
        Ok(job.id)
    }

    /// Submit a continuation of `parent_id` on the default queue.
    ///
    /// The child is returned immediately in `AwaitingParent`; whether it
    /// ever runs is decided by the parent's outcome and `condition`.
    pub async fn continue_with(
        &self,
        parent_id: JobId,
        action: ActionInvocation,
        condition: ContinuationCondition,
    ) -> AppResult<JobId> {
        self.continue_with_on(
            self.config.queues.default_queue(),
            parent_id,
            action,
            condition,
        )
        .await
    }

    /// Submit a continuation of `parent_id` on a named queue.
    pub async fn continue_with_on(
        &self,
        queue: &str,
        parent_id: JobId,
        action: ActionInvocation,
        condition: ContinuationCondition,
    ) -> AppResult<JobId> {
        self.validate_action(&action)?;
        self.validate_queue(queue)?;

        let child = Job::awaiting_parent(action, queue, self.config.retry.max_retries);
        self.graph.link(parent_id, &child, condition).await?;
        Ok(child.id)
    }

    /// Cancel a job.
    ///
    /// Returns `true` if this call transitioned the job to `Deleted`,
    /// `false` if it was already terminal or absent. Safe to call at any
    /// time; a job currently executing finishes its run but its outcome
    /// is dropped. Continuations of a cancelled job are discarded.
    pub async fn cancel(&self, id: JobId) -> AppResult<bool> {
        match self.store.delete_job(id).await? {
            Some(job) => {
                tracing::info!("Job {} cancelled", id);
                self.graph.resolve(job.id, JobState::Deleted).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Fetch a job snapshot.
    pub async fn status(&self, id: JobId) -> AppResult<Job> {
        self.store
            .get_job(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("job {id} not found")))
    }

    /// Count jobs per state.
    pub async fn counts(&self) -> AppResult<StateCounts> {
        Ok(StateCounts {
            scheduled: self.store.count_by_state(JobState::Scheduled).await?,
            enqueued: self.store.count_by_state(JobState::Enqueued).await?,
            processing: self.store.count_by_state(JobState::Processing).await?,
            succeeded: self.store.count_by_state(JobState::Succeeded).await?,
            failed: self.store.count_by_state(JobState::Failed).await?,
            deleted: self.store.count_by_state(JobState::Deleted).await?,
            awaiting_parent: self.store.count_by_state(JobState::AwaitingParent).await?,
        })
    }

    fn validate_action(&self, action: &ActionInvocation) -> AppResult<()> {
        if !self.registry.has_handler(&action.name) {
            return Err(AppError::validation(format!(
                "no handler registered for action '{}'",
                action.name
            )));
        }
        Ok(())
    }

    fn validate_queue(&self, queue: &str) -> AppResult<()> {
        if !self.config.queues.contains(queue) {
            return Err(AppError::validation(format!(
                "queue '{queue}' is not configured"
            )));
        }
        Ok(())
    }
}

/// Per-state job counts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateCounts {
    /// Jobs waiting for their due time.
    pub scheduled: u64,
    /// Jobs waiting in a queue.
    pub enqueued: u64,
    /// Jobs currently executing.
    pub processing: u64,
    /// Jobs that completed successfully.
    pub succeeded: u64,
    /// Jobs that failed terminally.
    pub failed: u64,
    /// Jobs that were cancelled or discarded.
    pub deleted: u64,
    /// Continuation children waiting on a parent.
    pub awaiting_parent: u64,
}
