//! Continuation edge entity model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stoker_core::types::JobId;

use crate::job::state::JobState;

/// Condition governing whether a continuation child fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContinuationCondition {
    /// The child runs only if the parent succeeds.
    OnSuccess,
    /// The child runs on any executed outcome, success or failure.
    OnAny,
}

impl ContinuationCondition {
    /// Check whether a parent's terminal outcome satisfies this condition.
    ///
    /// A `Deleted` parent satisfies neither condition: it never produced an
    /// outcome, so its children are discarded rather than run.
    pub fn satisfied_by(&self, outcome: JobState) -> bool {
        match self {
            Self::OnSuccess => outcome == JobState::Succeeded,
            Self::OnAny => matches!(outcome, JobState::Succeeded | JobState::Failed),
        }
    }
}

/// A directed parent -> child dependency between two jobs.
///
/// The child is created in `AwaitingParent` state and stays invisible to
/// the dispatcher until the parent reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinuationEdge {
    /// The job whose terminal outcome is awaited.
    pub parent_id: JobId,
    /// The waiting child job.
    pub child_id: JobId,
    /// When the child becomes dispatchable.
    pub condition: ContinuationCondition,
    /// When the edge was registered.
    pub created_at: DateTime<Utc>,
}

impl ContinuationEdge {
    /// Create a new edge.
    pub fn new(parent_id: JobId, child_id: JobId, condition: ContinuationCondition) -> Self {
        Self {
            parent_id,
            child_id,
            condition,
            created_at: Utc::now(),
        }
    }
}
