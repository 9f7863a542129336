//! Job entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use stoker_core::types::JobId;

use super::action::ActionInvocation;
use super::state::JobState;

/// A background job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier, assigned at creation.
    pub id: JobId,
    /// The registered action to invoke.
    pub action: ActionInvocation,
    /// Queue name; determines dispatch priority.
    pub queue: String,
    /// Current job state.
    pub state: JobState,
    /// Monotonically incremented on every mutation; CAS guard.
    pub version: u64,
    /// Number of retries performed so far.
    pub retry_count: u32,
    /// Maximum allowed retries after the first attempt.
    pub max_retries: u32,
    /// Time before which the job must not be dispatched (None = immediate).
    pub due_at: Option<DateTime<Utc>>,
    /// When the job entered its queue. FIFO dispatch key.
    pub enqueued_at: Option<DateTime<Utc>>,
    /// When the current (or last) execution attempt started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal state.
    pub finished_at: Option<DateTime<Utc>>,
    /// Result data returned by the handler on success.
    pub result: Option<Value>,
    /// Message from the most recent failed attempt.
    pub last_error: Option<String>,
    /// Worker that claimed the job.
    pub claimed_by: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Job {
    /// Create an immediate job, entering its queue directly.
    pub fn enqueued(action: ActionInvocation, queue: impl Into<String>, max_retries: u32) -> Self {
        let now = Utc::now();
        let mut job = Self::base(action, queue, max_retries, JobState::Enqueued, now);
        job.enqueued_at = Some(now);
        job
    }

    /// Create a delayed job that becomes dispatchable at `due_at`.
    pub fn scheduled(
        action: ActionInvocation,
        queue: impl Into<String>,
        due_at: DateTime<Utc>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        let mut job = Self::base(action, queue, max_retries, JobState::Scheduled, now);
        job.due_at = Some(due_at);
        job
    }

    /// Create a continuation child that waits for its parent's outcome.
    pub fn awaiting_parent(
        action: ActionInvocation,
        queue: impl Into<String>,
        max_retries: u32,
    ) -> Self {
        let now = Utc::now();
        Self::base(action, queue, max_retries, JobState::AwaitingParent, now)
    }

    fn base(
        action: ActionInvocation,
        queue: impl Into<String>,
        max_retries: u32,
        state: JobState,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::new(),
            action,
            queue: queue.into(),
            state,
            version: 0,
            retry_count: 0,
            max_retries,
            due_at: None,
            enqueued_at: None,
            started_at: None,
            finished_at: None,
            result: None,
            last_error: None,
            claimed_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if another retry is allowed after a transient failure.
    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }
}
