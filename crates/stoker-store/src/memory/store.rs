//! In-memory job store implementation using dashmap.

use std::collections::VecDeque;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, trace};

use stoker_core::error::AppError;
use stoker_core::result::AppResult;
use stoker_core::types::JobId;
use stoker_entity::continuation::ContinuationEdge;
use stoker_entity::job::{Job, JobState};
use stoker_entity::recurring::RecurringDefinition;

use crate::store::{JobStore, JobUpdate};

/// In-memory, non-durable job store.
///
/// Per-job CAS linearizability comes from dashmap's entry locks: a job's
/// version check and mutation happen under its record lock. The per-queue
/// FIFO index is a `VecDeque` of job ids; popping under the queue's entry
/// lock gives the exactly-once claim guarantee.
///
/// Lock order is queue index, then job record. `update_job` therefore
/// releases the record lock before pushing into the index. Index entries
/// are removed lazily: an id whose job was deleted or purged is dropped
/// the next time a claim encounters it.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    /// All live job records.
    jobs: DashMap<JobId, Job>,
    /// FIFO index of `Enqueued` job ids per queue name.
    queues: DashMap<String, VecDeque<JobId>>,
    /// Recurring definitions by caller-chosen id.
    recurring: DashMap<String, RecurringDefinition>,
    /// Continuation edges indexed by parent.
    children: DashMap<JobId, Vec<ContinuationEdge>>,
    /// Continuation edges indexed by child.
    parents: DashMap<JobId, ContinuationEdge>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create_job(&self, job: &Job) -> AppResult<()> {
        match job.state {
            JobState::Scheduled | JobState::Enqueued | JobState::AwaitingParent => {}
            other => {
                return Err(AppError::validation(format!(
                    "cannot create job in state '{other}'"
                )));
            }
        }

        // Ids are random UUIDs, so check-then-insert is acceptable for
        // single-node in-memory use.
        if self.jobs.contains_key(&job.id) {
            return Err(AppError::conflict(format!("job {} already exists", job.id)));
        }
        self.jobs.insert(job.id, job.clone());

        if job.state == JobState::Enqueued {
            self.queues
                .entry(job.queue.clone())
                .or_default()
                .push_back(job.id);
        }

        trace!(job_id = %job.id, queue = %job.queue, state = %job.state, "created job");
        Ok(())
    }

    async fn get_job(&self, id: JobId) -> AppResult<Option<Job>> {
        Ok(self.jobs.get(&id).map(|entry| entry.value().clone()))
    }

    async fn update_job(
        &self,
        id: JobId,
        expected_version: u64,
        update: JobUpdate,
    ) -> AppResult<Job> {
        let (snapshot, was_enqueued) = {
            let mut entry = self
                .jobs
                .get_mut(&id)
                .ok_or_else(|| AppError::not_found(format!("job {id} not found")))?;
            let job = entry.value_mut();

            if job.version != expected_version {
                return Err(AppError::conflict(format!(
                    "job {id} is at version {}, expected {expected_version}",
                    job.version
                )));
            }
            if !job.state.can_transition_to(update.state) {
                return Err(AppError::validation(format!(
                    "illegal transition {} -> {} for job {id}",
                    job.state, update.state
                )));
            }

            let was_enqueued = job.state == JobState::Enqueued;
            update.apply_to(job);
            job.version += 1;
            job.updated_at = Utc::now();
            (job.clone(), was_enqueued)
        };

        // Record lock is released above; the index push must not run while
        // holding it because claims take the queue lock first.
        if snapshot.state == JobState::Enqueued && !was_enqueued {
            self.queues
                .entry(snapshot.queue.clone())
                .or_default()
                .push_back(id);
        }

        trace!(job_id = %id, state = %snapshot.state, version = snapshot.version, "updated job");
        Ok(snapshot)
    }

    async fn delete_job(&self, id: JobId) -> AppResult<Option<Job>> {
        let Some(mut entry) = self.jobs.get_mut(&id) else {
            return Ok(None);
        };
        let job = entry.value_mut();
        if job.state.is_terminal() {
            return Ok(None);
        }

        let now = Utc::now();
        job.state = JobState::Deleted;
        job.finished_at = Some(now);
        job.version += 1;
        job.updated_at = now;
        let snapshot = job.clone();
        drop(entry);

        debug!(job_id = %id, "deleted job");
        Ok(Some(snapshot))
    }

    async fn claim_next(&self, queue: &str, worker: &str) -> AppResult<Option<Job>> {
        let Some(mut ids) = self.queues.get_mut(queue) else {
            return Ok(None);
        };

        // The queue lock is held across the record mutation so no other
        // worker can pop the same id.
        while let Some(id) = ids.pop_front() {
            let Some(mut entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            let job = entry.value_mut();
            if job.state != JobState::Enqueued {
                // Stale index entry, e.g. the job was cancelled.
                continue;
            }

            job.state = JobState::Processing;
            job.started_at = Some(Utc::now());
            job.claimed_by = Some(worker.to_string());
            job.version += 1;
            job.updated_at = Utc::now();

            trace!(job_id = %id, queue, worker, "claimed job");
            return Ok(Some(job.clone()));
        }

        Ok(None)
    }

    async fn list_due(
        &self,
        queue: Option<&str>,
        before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<Job>> {
        let mut due: Vec<Job> = self
            .jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.state == JobState::Scheduled
                    && job.due_at.is_some_and(|t| t <= before)
                    && queue.map_or(true, |q| job.queue == q)
            })
            .map(|entry| entry.value().clone())
            .collect();

        due.sort_by_key(|job| job.due_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn count_by_state(&self, state: JobState) -> AppResult<u64> {
        let count = self
            .jobs
            .iter()
            .filter(|entry| entry.value().state == state)
            .count();
        Ok(count as u64)
    }

    async fn purge_terminal(&self, finished_before: DateTime<Utc>) -> AppResult<u64> {
        let victims: Vec<JobId> = self
            .jobs
            .iter()
            .filter(|entry| {
                let job = entry.value();
                job.state.is_terminal()
                    && job.finished_at.is_some_and(|t| t < finished_before)
            })
            .map(|entry| *entry.key())
            .collect();

        let mut purged = 0u64;
        for id in victims {
            if self.jobs.remove(&id).is_some() {
                purged += 1;
            }
            self.children.remove(&id);
            self.parents.remove(&id);
        }

        if purged > 0 {
            debug!(purged, "purged terminal jobs");
        }
        Ok(purged)
    }

    async fn upsert_recurring(&self, def: &RecurringDefinition) -> AppResult<()> {
        let created_at = self.recurring.get(&def.id).map(|entry| entry.created_at);

        let mut stored = def.clone();
        if let Some(created_at) = created_at {
            stored.created_at = created_at;
        }
        self.recurring.insert(stored.id.clone(), stored);

        debug!(recurring_id = %def.id, cron = %def.cron, "registered recurring definition");
        Ok(())
    }

    async fn get_recurring(&self, id: &str) -> AppResult<Option<RecurringDefinition>> {
        Ok(self.recurring.get(id).map(|entry| entry.value().clone()))
    }

    async fn remove_recurring(&self, id: &str) -> AppResult<bool> {
        let removed = self.recurring.remove(id).is_some();
        if removed {
            debug!(recurring_id = %id, "removed recurring definition");
        }
        Ok(removed)
    }

    async fn list_recurring_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<RecurringDefinition>> {
        let mut due: Vec<RecurringDefinition> = self
            .recurring
            .iter()
            .filter(|entry| entry.value().is_due(now))
            .map(|entry| entry.value().clone())
            .collect();

        due.sort_by_key(|def| def.next_due_at);
        due.truncate(limit);
        Ok(due)
    }

    async fn fire_recurring(
        &self,
        id: &str,
        expected_next_due_at: DateTime<Utc>,
        next_due_at: DateTime<Utc>,
        job: &Job,
    ) -> AppResult<Option<JobId>> {
        let Some(mut entry) = self.recurring.get_mut(id) else {
            trace!(recurring_id = %id, "definition removed before firing, dropping fire");
            return Ok(None);
        };
        let def = entry.value_mut();

        if def.next_due_at != expected_next_due_at {
            trace!(recurring_id = %id, "slot already fired by a concurrent poll");
            return Ok(None);
        }

        if self.jobs.contains_key(&job.id) {
            return Err(AppError::conflict(format!("job {} already exists", job.id)));
        }
        self.jobs.insert(job.id, job.clone());
        if job.state == JobState::Enqueued {
            self.queues
                .entry(job.queue.clone())
                .or_default()
                .push_back(job.id);
        }

        let now = Utc::now();
        def.next_due_at = next_due_at;
        def.last_fired_at = Some(now);
        def.updated_at = now;

        debug!(recurring_id = %id, job_id = %job.id, "materialized recurring job");
        Ok(Some(job.id))
    }

    async fn add_edge(&self, edge: &ContinuationEdge) -> AppResult<()> {
        if self.parents.contains_key(&edge.child_id) {
            return Err(AppError::conflict(format!(
                "job {} already has a parent",
                edge.child_id
            )));
        }
        self.parents.insert(edge.child_id, edge.clone());
        self.children
            .entry(edge.parent_id)
            .or_default()
            .push(edge.clone());

        trace!(parent_id = %edge.parent_id, child_id = %edge.child_id, "added continuation edge");
        Ok(())
    }

    async fn edges_by_parent(&self, parent_id: JobId) -> AppResult<Vec<ContinuationEdge>> {
        Ok(self
            .children
            .get(&parent_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default())
    }

    async fn parent_of(&self, child_id: JobId) -> AppResult<Option<ContinuationEdge>> {
        Ok(self.parents.get(&child_id).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stoker_entity::continuation::ContinuationCondition;
    use stoker_entity::job::ActionInvocation;

    fn immediate(queue: &str) -> Job {
        Job::enqueued(ActionInvocation::named("noop"), queue, 3)
    }

    fn delayed(queue: &str, due_at: DateTime<Utc>) -> Job {
        Job::scheduled(ActionInvocation::named("noop"), queue, due_at, 3)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = MemoryJobStore::new();
        let job = immediate("default");
        store.create_job(&job).await.unwrap();

        let fetched = store.get_job(job.id).await.unwrap().expect("job exists");
        assert_eq!(fetched.state, JobState::Enqueued);
        assert_eq!(fetched.version, 0);
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let store = MemoryJobStore::new();
        let job = immediate("default");
        store.create_job(&job).await.unwrap();
        let err = store.create_job(&job).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_create_in_processing_rejected() {
        let store = MemoryJobStore::new();
        let mut job = immediate("default");
        job.state = JobState::Processing;
        let err = store.create_job(&job).await.unwrap_err();
        assert_eq!(err.kind, stoker_core::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_cas_bumps_version() {
        let store = MemoryJobStore::new();
        let job = immediate("default");
        store.create_job(&job).await.unwrap();

        let updated = store
            .update_job(
                job.id,
                0,
                JobUpdate::to_state(JobState::Deleted).finished_at(Some(Utc::now())),
            )
            .await
            .unwrap();
        assert_eq!(updated.version, 1);
        assert_eq!(updated.state, JobState::Deleted);
    }

    #[tokio::test]
    async fn test_cas_version_mismatch_conflicts() {
        let store = MemoryJobStore::new();
        let job = immediate("default");
        store.create_job(&job).await.unwrap();

        let err = store
            .update_job(job.id, 7, JobUpdate::to_state(JobState::Deleted))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // The record is untouched by the failed CAS.
        let fetched = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(fetched.version, 0);
        assert_eq!(fetched.state, JobState::Enqueued);
    }

    #[tokio::test]
    async fn test_cas_illegal_transition_rejected() {
        let store = MemoryJobStore::new();
        let job = immediate("default");
        store.create_job(&job).await.unwrap();

        let err = store
            .update_job(job.id, 0, JobUpdate::to_state(JobState::Succeeded))
            .await
            .unwrap_err();
        assert_eq!(err.kind, stoker_core::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_claim_is_fifo() {
        let store = MemoryJobStore::new();
        let first = immediate("default");
        let second = immediate("default");
        store.create_job(&first).await.unwrap();
        store.create_job(&second).await.unwrap();

        let claimed = store.claim_next("default", "w1").await.unwrap().unwrap();
        assert_eq!(claimed.id, first.id);
        assert_eq!(claimed.state, JobState::Processing);
        assert_eq!(claimed.claimed_by.as_deref(), Some("w1"));

        let claimed = store.claim_next("default", "w2").await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);
    }

    #[tokio::test]
    async fn test_claim_skips_cancelled() {
        let store = MemoryJobStore::new();
        let first = immediate("default");
        let second = immediate("default");
        store.create_job(&first).await.unwrap();
        store.create_job(&second).await.unwrap();

        store.delete_job(first.id).await.unwrap();

        let claimed = store.claim_next("default", "w1").await.unwrap().unwrap();
        assert_eq!(claimed.id, second.id);
        assert!(store.claim_next("default", "w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_claim_empty_queue() {
        let store = MemoryJobStore::new();
        assert!(store.claim_next("default", "w1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_promoted_job_becomes_claimable() {
        let store = MemoryJobStore::new();
        let job = delayed("default", Utc::now() - chrono::Duration::seconds(1));
        store.create_job(&job).await.unwrap();

        // Not claimable while Scheduled.
        assert!(store.claim_next("default", "w1").await.unwrap().is_none());

        store
            .update_job(
                job.id,
                0,
                JobUpdate::to_state(JobState::Enqueued)
                    .enqueued_at(Some(Utc::now()))
                    .due_at(None),
            )
            .await
            .unwrap();

        let claimed = store.claim_next("default", "w1").await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert!(claimed.due_at.is_none());
    }

    #[tokio::test]
    async fn test_delete_non_terminal() {
        let store = MemoryJobStore::new();
        let job = immediate("default");
        store.create_job(&job).await.unwrap();

        let deleted = store.delete_job(job.id).await.unwrap().expect("transitioned");
        assert_eq!(deleted.state, JobState::Deleted);
        assert!(deleted.finished_at.is_some());
        assert_eq!(deleted.retry_count, 0);
    }

    #[tokio::test]
    async fn test_delete_terminal_is_noop() {
        let store = MemoryJobStore::new();
        let job = immediate("default");
        store.create_job(&job).await.unwrap();
        store.delete_job(job.id).await.unwrap();

        assert!(store.delete_job(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_absent_is_noop() {
        let store = MemoryJobStore::new();
        assert!(store.delete_job(JobId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_due_filters_and_orders() {
        let store = MemoryJobStore::new();
        let now = Utc::now();
        let later = delayed("default", now - chrono::Duration::seconds(5));
        let earlier = delayed("default", now - chrono::Duration::seconds(10));
        let future = delayed("default", now + chrono::Duration::hours(1));
        let other_queue = delayed("critical", now - chrono::Duration::seconds(1));
        for job in [&later, &earlier, &future, &other_queue] {
            store.create_job(job).await.unwrap();
        }

        let due = store.list_due(None, now, 10).await.unwrap();
        let ids: Vec<JobId> = due.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![earlier.id, later.id, other_queue.id]);

        let due = store.list_due(Some("critical"), now, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, other_queue.id);

        let due = store.list_due(None, now, 1).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, earlier.id);
    }

    #[tokio::test]
    async fn test_count_by_state() {
        let store = MemoryJobStore::new();
        store.create_job(&immediate("default")).await.unwrap();
        store.create_job(&immediate("default")).await.unwrap();
        let cancelled = immediate("default");
        store.create_job(&cancelled).await.unwrap();
        store.delete_job(cancelled.id).await.unwrap();

        assert_eq!(store.count_by_state(JobState::Enqueued).await.unwrap(), 2);
        assert_eq!(store.count_by_state(JobState::Deleted).await.unwrap(), 1);
        assert_eq!(store.count_by_state(JobState::Failed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_purge_terminal_removes_only_old_terminal() {
        let store = MemoryJobStore::new();
        let active = immediate("default");
        let finished = immediate("default");
        store.create_job(&active).await.unwrap();
        store.create_job(&finished).await.unwrap();
        store.delete_job(finished.id).await.unwrap();

        // Nothing is old enough yet.
        let cutoff = Utc::now() - chrono::Duration::seconds(60);
        assert_eq!(store.purge_terminal(cutoff).await.unwrap(), 0);

        let purged = store
            .purge_terminal(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);
        assert!(store.get_job(finished.id).await.unwrap().is_none());
        assert!(store.get_job(active.id).await.unwrap().is_some());
    }

    fn definition(id: &str, next_due_at: DateTime<Utc>) -> RecurringDefinition {
        RecurringDefinition::new(
            id,
            ActionInvocation::named("cleanup.sessions"),
            "default",
            "0 * * * * *",
            0,
            next_due_at,
        )
    }

    #[tokio::test]
    async fn test_upsert_preserves_created_at() {
        let store = MemoryJobStore::new();
        let original = definition("cleanup", Utc::now());
        store.upsert_recurring(&original).await.unwrap();

        let mut replacement = definition("cleanup", Utc::now() + chrono::Duration::minutes(1));
        replacement.cron = "*/30 * * * * *".to_string();
        store.upsert_recurring(&replacement).await.unwrap();

        let stored = store.get_recurring("cleanup").await.unwrap().unwrap();
        assert_eq!(stored.cron, "*/30 * * * * *");
        assert_eq!(stored.created_at, original.created_at);
    }

    #[tokio::test]
    async fn test_remove_recurring() {
        let store = MemoryJobStore::new();
        store
            .upsert_recurring(&definition("cleanup", Utc::now()))
            .await
            .unwrap();

        assert!(store.remove_recurring("cleanup").await.unwrap());
        assert!(!store.remove_recurring("cleanup").await.unwrap());
        assert!(store.get_recurring("cleanup").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fire_recurring_advances_slot() {
        let store = MemoryJobStore::new();
        let slot = Utc::now() - chrono::Duration::seconds(1);
        let next = slot + chrono::Duration::minutes(1);
        store.upsert_recurring(&definition("cleanup", slot)).await.unwrap();

        let job = immediate("default");
        let fired = store
            .fire_recurring("cleanup", slot, next, &job)
            .await
            .unwrap();
        assert_eq!(fired, Some(job.id));

        let def = store.get_recurring("cleanup").await.unwrap().unwrap();
        assert_eq!(def.next_due_at, next);
        assert!(def.last_fired_at.is_some());

        // The materialized job is claimable.
        let claimed = store.claim_next("default", "w1").await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
    }

    #[tokio::test]
    async fn test_fire_recurring_stale_slot_drops() {
        let store = MemoryJobStore::new();
        let slot = Utc::now() - chrono::Duration::seconds(1);
        let next = slot + chrono::Duration::minutes(1);
        store.upsert_recurring(&definition("cleanup", slot)).await.unwrap();

        let first = immediate("default");
        store
            .fire_recurring("cleanup", slot, next, &first)
            .await
            .unwrap();

        // Second fire against the consumed slot must not materialize.
        let second = immediate("default");
        let fired = store
            .fire_recurring("cleanup", slot, next, &second)
            .await
            .unwrap();
        assert_eq!(fired, None);
        assert!(store.get_job(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fire_recurring_removed_drops() {
        let store = MemoryJobStore::new();
        let slot = Utc::now();
        let job = immediate("default");
        let fired = store
            .fire_recurring("gone", slot, slot + chrono::Duration::minutes(1), &job)
            .await
            .unwrap();
        assert_eq!(fired, None);
        assert!(store.get_job(job.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_add_edge_second_parent_conflicts() {
        let store = MemoryJobStore::new();
        let parent_a = JobId::new();
        let parent_b = JobId::new();
        let child = JobId::new();

        store
            .add_edge(&ContinuationEdge::new(
                parent_a,
                child,
                ContinuationCondition::OnSuccess,
            ))
            .await
            .unwrap();

        let err = store
            .add_edge(&ContinuationEdge::new(
                parent_b,
                child,
                ContinuationCondition::OnAny,
            ))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let edges = store.edges_by_parent(parent_a).await.unwrap();
        assert_eq!(edges.len(), 1);
        let edge = store.parent_of(child).await.unwrap().unwrap();
        assert_eq!(edge.parent_id, parent_a);
    }
}
