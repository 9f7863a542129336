//! Continuation graph — releases or discards children on parent outcomes.

use std::sync::Arc;

use chrono::Utc;
use tracing;

use stoker_core::error::AppError;
use stoker_core::result::AppResult;
use stoker_core::types::JobId;
use stoker_entity::continuation::{ContinuationCondition, ContinuationEdge};
use stoker_entity::job::{Job, JobState};
use stoker_store::{JobStore, JobUpdate};

use crate::dispatcher::Dispatcher;

/// Tracks parent -> child dependencies and reacts to terminal outcomes.
///
/// Children are created in `AwaitingParent` and stay invisible to the
/// dispatcher until their parent reaches a terminal state. An outcome that
/// satisfies the edge's condition releases the child into its queue; any
/// other outcome discards it, and a discarded child counts as a `Deleted`
/// outcome for its own children in turn.
#[derive(Debug)]
pub struct ContinuationGraph {
    /// Store holding jobs and edges.
    store: Arc<dyn JobStore>,
    /// Dispatcher notified when a child is released.
    dispatcher: Arc<Dispatcher>,
}

impl ContinuationGraph {
    /// Create a new graph.
    pub fn new(store: Arc<dyn JobStore>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Register `child` as a continuation of `parent_id`.
    ///
    /// The child must be a fresh `AwaitingParent` job; it is persisted
    /// here together with the edge. Fails with not-found if the parent
    /// does not exist and with a validation error if the edge would make
    /// the child transitively depend on itself.
    ///
    /// A parent that is already terminal is resolved immediately, so a
    /// continuation added after the fact is never orphaned.
    pub async fn link(
        &self,
        parent_id: JobId,
        child: &Job,
        condition: ContinuationCondition,
    ) -> AppResult<()> {
        self.store
            .get_job(parent_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("parent job {parent_id} not found")))?;

        // Walk the ancestor chain; every job has at most one parent, so
        // this terminates.
        let mut ancestor = Some(parent_id);
        while let Some(id) = ancestor {
            if id == child.id {
                return Err(AppError::validation(format!(
                    "continuation of job {parent_id} would make job {} depend on itself",
                    child.id
                )));
            }
            ancestor = self.store.parent_of(id).await?.map(|edge| edge.parent_id);
        }

        self.store.create_job(child).await?;
        self.store
            .add_edge(&ContinuationEdge::new(parent_id, child.id, condition))
            .await?;

        tracing::debug!(
            "Linked continuation: parent={}, child={}, condition={:?}",
            parent_id,
            child.id,
            condition
        );

        // The parent may have finished between the existence check and the
        // edge write; re-read so the child is not left waiting forever.
        match self.store.get_job(parent_id).await? {
            Some(parent) if parent.state.is_terminal() => {
                self.resolve(parent_id, parent.state).await;
            }
            Some(_) => {}
            None => {
                // Purged from retention; treat like a parent that never
                // produced an outcome.
                self.resolve(parent_id, JobState::Deleted).await;
            }
        }

        Ok(())
    }

    /// React to a job reaching a terminal outcome.
    ///
    /// Releases every child whose condition the outcome satisfies and
    /// discards the rest. Discarded children cascade: their own children
    /// are resolved against a `Deleted` outcome. Races with cancellations
    /// are logged and skipped, never surfaced.
    pub async fn resolve(&self, job_id: JobId, outcome: JobState) {
        let mut worklist = vec![(job_id, outcome)];

        while let Some((parent_id, outcome)) = worklist.pop() {
            let edges = match self.store.edges_by_parent(parent_id).await {
                Ok(edges) => edges,
                Err(e) => {
                    tracing::error!("Failed to load continuations of job {}: {}", parent_id, e);
                    continue;
                }
            };

            for edge in edges {
                if edge.condition.satisfied_by(outcome) {
                    self.release(&edge).await;
                } else if self.discard(&edge).await {
                    worklist.push((edge.child_id, JobState::Deleted));
                }
            }
        }
    }

    /// Move a waiting child into its queue.
    async fn release(&self, edge: &ContinuationEdge) {
        let child = match self.store.get_job(edge.child_id).await {
            Ok(Some(child)) => child,
            Ok(None) => return,
            Err(e) => {
                tracing::error!("Failed to load continuation child {}: {}", edge.child_id, e);
                return;
            }
        };
        if child.state != JobState::AwaitingParent {
            // Cancelled or already resolved by a racing caller.
            return;
        }

        let update = JobUpdate::to_state(JobState::Enqueued).enqueued_at(Some(Utc::now()));
        match self.store.update_job(child.id, child.version, update).await {
            Ok(_) => {
                self.dispatcher.notify();
                tracing::debug!(
                    "Released continuation child {} of parent {}",
                    child.id,
                    edge.parent_id
                );
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("Continuation child {} changed underneath us", child.id);
            }
            Err(e) => {
                tracing::error!("Failed to release continuation child {}: {}", child.id, e);
            }
        }
    }

    /// Discard a child whose condition was not satisfied.
    ///
    /// Returns whether this call performed the transition to `Deleted`.
    async fn discard(&self, edge: &ContinuationEdge) -> bool {
        let child = match self.store.get_job(edge.child_id).await {
            Ok(Some(child)) => child,
            Ok(None) => return false,
            Err(e) => {
                tracing::error!("Failed to load continuation child {}: {}", edge.child_id, e);
                return false;
            }
        };
        if child.state != JobState::AwaitingParent {
            return false;
        }

        let update = JobUpdate::to_state(JobState::Deleted).finished_at(Some(Utc::now()));
        match self.store.update_job(child.id, child.version, update).await {
            Ok(_) => {
                tracing::debug!(
                    "Discarded continuation child {} of parent {}",
                    child.id,
                    edge.parent_id
                );
                true
            }
            Err(e) if e.is_conflict() => {
                tracing::debug!("Continuation child {} changed underneath us", child.id);
                false
            }
            Err(e) => {
                tracing::error!("Failed to discard continuation child {}: {}", child.id, e);
                false
            }
        }
    }
}
