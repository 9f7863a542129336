//! Job store trait for pluggable persistence backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use stoker_core::result::AppResult;
use stoker_core::types::JobId;
use stoker_entity::continuation::ContinuationEdge;
use stoker_entity::job::{Job, JobState};
use stoker_entity::recurring::RecurringDefinition;

/// A partial job mutation applied through compare-and-swap.
///
/// Every mutation targets a new state; the remaining fields are patches
/// where `None` leaves the stored value untouched and `Some(None)` clears
/// it. Version and `updated_at` bookkeeping belong to the store, never to
/// the caller.
#[derive(Debug, Clone)]
pub struct JobUpdate {
    /// The state the job transitions to.
    pub state: JobState,
    /// New due time.
    pub due_at: Option<Option<DateTime<Utc>>>,
    /// New enqueue time.
    pub enqueued_at: Option<Option<DateTime<Utc>>>,
    /// New execution start time.
    pub started_at: Option<Option<DateTime<Utc>>>,
    /// New terminal time.
    pub finished_at: Option<Option<DateTime<Utc>>>,
    /// Handler result payload.
    pub result: Option<Option<Value>>,
    /// Most recent failure message.
    pub last_error: Option<Option<String>>,
    /// Claiming worker.
    pub claimed_by: Option<Option<String>>,
    /// New retry count.
    pub retry_count: Option<u32>,
}

impl JobUpdate {
    /// Start an update transitioning the job to `state`.
    pub fn to_state(state: JobState) -> Self {
        Self {
            state,
            due_at: None,
            enqueued_at: None,
            started_at: None,
            finished_at: None,
            result: None,
            last_error: None,
            claimed_by: None,
            retry_count: None,
        }
    }

    /// Set or clear the due time.
    pub fn due_at(mut self, due_at: Option<DateTime<Utc>>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Set or clear the enqueue time.
    pub fn enqueued_at(mut self, enqueued_at: Option<DateTime<Utc>>) -> Self {
        self.enqueued_at = Some(enqueued_at);
        self
    }

    /// Set or clear the execution start time.
    pub fn started_at(mut self, started_at: Option<DateTime<Utc>>) -> Self {
        self.started_at = Some(started_at);
        self
    }

    /// Set or clear the terminal time.
    pub fn finished_at(mut self, finished_at: Option<DateTime<Utc>>) -> Self {
        self.finished_at = Some(finished_at);
        self
    }

    /// Set the handler result payload.
    pub fn result(mut self, result: Option<Value>) -> Self {
        self.result = Some(result);
        self
    }

    /// Set the failure message.
    pub fn last_error(mut self, last_error: impl Into<String>) -> Self {
        self.last_error = Some(Some(last_error.into()));
        self
    }

    /// Set or clear the claiming worker.
    pub fn claimed_by(mut self, claimed_by: Option<String>) -> Self {
        self.claimed_by = Some(claimed_by);
        self
    }

    /// Set the retry count.
    pub fn retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    /// Apply the patch to a job record. State machine and version checks
    /// are the store's responsibility and happen before this is called.
    pub fn apply_to(&self, job: &mut Job) {
        job.state = self.state;
        if let Some(due_at) = self.due_at {
            job.due_at = due_at;
        }
        if let Some(enqueued_at) = self.enqueued_at {
            job.enqueued_at = enqueued_at;
        }
        if let Some(started_at) = self.started_at {
            job.started_at = started_at;
        }
        if let Some(finished_at) = self.finished_at {
            job.finished_at = finished_at;
        }
        if let Some(ref result) = self.result {
            job.result = result.clone();
        }
        if let Some(ref last_error) = self.last_error {
            job.last_error = last_error.clone();
        }
        if let Some(ref claimed_by) = self.claimed_by {
            job.claimed_by = claimed_by.clone();
        }
        if let Some(retry_count) = self.retry_count {
            job.retry_count = retry_count;
        }
    }
}

/// Trait for job store backends.
///
/// Implementations must make `update_job` linearizable per job id: of two
/// concurrent CAS attempts against the same version, exactly one succeeds
/// and the other observes a conflict. `claim_next` must guarantee a job is
/// handed to at most one worker.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a new job. The initial state must be `Scheduled`,
    /// `Enqueued`, or `AwaitingParent`; a duplicate id is a conflict.
    async fn create_job(&self, job: &Job) -> AppResult<()>;

    /// Fetch a job snapshot by id.
    async fn get_job(&self, id: JobId) -> AppResult<Option<Job>>;

    /// Compare-and-swap a job mutation.
    ///
    /// Fails with a conflict if the stored version differs from
    /// `expected_version`, with a validation error if the transition is
    /// illegal, and with not-found if the job does not exist. Returns the
    /// updated snapshot on success.
    async fn update_job(
        &self,
        id: JobId,
        expected_version: u64,
        update: JobUpdate,
    ) -> AppResult<Job>;

    /// Transition a non-terminal job to `Deleted` regardless of version.
    ///
    /// Returns the updated snapshot if a transition happened, `None` if
    /// the job is absent or already terminal. Never fails on domain
    /// grounds; cancellation is always safe to call.
    async fn delete_job(&self, id: JobId) -> AppResult<Option<Job>>;

    /// Atomically claim the oldest `Enqueued` job in a queue for a worker,
    /// transitioning it to `Processing`.
    async fn claim_next(&self, queue: &str, worker: &str) -> AppResult<Option<Job>>;

    /// List `Scheduled` jobs whose due time has passed, oldest due first,
    /// optionally restricted to one queue.
    async fn list_due(
        &self,
        queue: Option<&str>,
        before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Job>>;

    /// Count jobs currently in a given state.
    async fn count_by_state(&self, state: JobState) -> AppResult<u64>;

    /// Permanently remove terminal jobs that finished before the cutoff.
    /// Returns the number of jobs removed.
    async fn purge_terminal(&self, finished_before: DateTime<Utc>) -> AppResult<u64>;

    /// Create or replace a recurring definition by id. An existing
    /// definition keeps its original `created_at`.
    async fn upsert_recurring(&self, def: &RecurringDefinition) -> AppResult<()>;

    /// Fetch a recurring definition snapshot by id.
    async fn get_recurring(&self, id: &str) -> AppResult<Option<RecurringDefinition>>;

    /// Remove a recurring definition. Returns whether it existed.
    async fn remove_recurring(&self, id: &str) -> AppResult<bool>;

    /// List definitions whose `next_due_at` has passed, oldest first.
    async fn list_recurring_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<RecurringDefinition>>;

    /// Atomically materialize one fire of a recurring definition.
    ///
    /// Persists `job` and advances the definition's `next_due_at` to
    /// `next_due_at` in one step, but only if the stored `next_due_at`
    /// still equals `expected_next_due_at`. Returns `None` without firing
    /// when the definition was removed or the slot was already taken by a
    /// concurrent poll, so the same slot never fires twice.
    async fn fire_recurring(
        &self,
        id: &str,
        expected_next_due_at: DateTime<Utc>,
        next_due_at: DateTime<Utc>,
        job: &Job,
    ) -> AppResult<Option<JobId>>;

    /// Register a continuation edge. A child can have at most one parent.
    async fn add_edge(&self, edge: &ContinuationEdge) -> AppResult<()>;

    /// List edges where the given job is the parent.
    async fn edges_by_parent(&self, parent_id: JobId) -> AppResult<Vec<ContinuationEdge>>;

    /// Look up the edge where the given job is the child, if any.
    async fn parent_of(&self, child_id: JobId) -> AppResult<Option<ContinuationEdge>>;
}
