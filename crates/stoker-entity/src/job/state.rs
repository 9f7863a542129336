//! Job state enumeration and the legal transition relation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// State of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting for a future due time before becoming dispatchable.
    Scheduled,
    /// In a queue, waiting for a worker slot.
    Enqueued,
    /// Currently being executed by a worker.
    Processing,
    /// Completed successfully.
    Succeeded,
    /// Failed after all retry attempts.
    Failed,
    /// Cancelled, or discarded because its parent never satisfied the
    /// continuation condition.
    Deleted,
    /// Waiting for a parent job to reach a terminal state.
    AwaitingParent,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Deleted)
    }

    /// Check whether moving to `next` is a legal state machine step.
    ///
    /// `Deleted` is reachable from every non-terminal state; terminal
    /// states have no outgoing transitions. `Processing -> Scheduled` is
    /// the retry re-entry: a transient failure with retries remaining goes
    /// back to `Scheduled` with a backoff due time.
    pub fn can_transition_to(&self, next: JobState) -> bool {
        use JobState::*;
        match (self, next) {
            (Scheduled, Enqueued) => true,
            (Enqueued, Processing) => true,
            (Processing, Succeeded) => true,
            (Processing, Failed) => true,
            (Processing, Scheduled) => true,
            (AwaitingParent, Enqueued) => true,
            (from, Deleted) => !from.is_terminal(),
            _ => false,
        }
    }

    /// Return the state as a snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Enqueued => "enqueued",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Deleted => "deleted",
            Self::AwaitingParent => "awaiting_parent",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
