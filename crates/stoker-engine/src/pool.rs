//! Worker pool — fixed-size set of executors that pull and run jobs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing;

use stoker_core::config::retry::RetryConfig;
use stoker_core::config::worker::WorkerConfig;
use stoker_entity::job::{Job, JobState};
use stoker_store::{JobStore, JobUpdate};

use crate::continuation::ContinuationGraph;
use crate::dispatcher::Dispatcher;
use crate::registry::{ActionRegistry, ExecutionError};

/// Pause after a failed dequeue before trying again.
const DEQUEUE_RETRY_BACKOFF: Duration = Duration::from_millis(500);

/// Fixed-size pool of concurrent job executors.
///
/// Each worker loops: claim the next job through the dispatcher, execute
/// its action under the configured timeout, record the outcome, repeat.
/// An idle worker suspends until the dispatcher signals work or shutdown
/// is requested; there is no polling tick.
///
/// On a transient failure with retries remaining, the job returns to
/// `Scheduled` with a future due time computed from the backoff policy;
/// the time-delay scheduler later promotes it back into its queue.
#[derive(Debug)]
pub struct WorkerPool {
    /// Store used to record outcomes.
    store: Arc<dyn JobStore>,
    /// Source of claimable jobs.
    dispatcher: Arc<Dispatcher>,
    /// Handlers to execute actions with.
    registry: Arc<ActionRegistry>,
    /// Continuations resolved on terminal outcomes.
    graph: Arc<ContinuationGraph>,
    /// Pool sizing and timeout settings.
    config: WorkerConfig,
    /// Backoff policy for transient failures.
    retry: RetryConfig,
}

impl WorkerPool {
    /// Create a new pool.
    pub fn new(
        store: Arc<dyn JobStore>,
        dispatcher: Arc<Dispatcher>,
        registry: Arc<ActionRegistry>,
        graph: Arc<ContinuationGraph>,
        config: WorkerConfig,
        retry: RetryConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            registry,
            graph,
            config,
            retry,
        }
    }

    /// Spawn the configured number of worker tasks.
    ///
    /// Workers run until the cancel signal flips to `true`; a worker with
    /// a job in flight finishes it before stopping.
    pub fn spawn(self: &Arc<Self>, cancel: &watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        (0..self.config.count)
            .map(|i| {
                let pool = Arc::clone(self);
                let cancel = cancel.clone();
                let worker_id = format!("worker-{}", i + 1);
                tokio::spawn(async move { pool.run_worker(worker_id, cancel).await })
            })
            .collect()
    }

    /// Main loop of a single worker.
    async fn run_worker(&self, worker_id: String, mut cancel: watch::Receiver<bool>) {
        tracing::info!("Worker '{}' started", worker_id);

        loop {
            if *cancel.borrow() {
                break;
            }

            match self.dispatcher.dequeue(&worker_id).await {
                Ok(Some(job)) => {
                    // Another job may be waiting behind this one; pass the
                    // wake-up on so an idle peer keeps draining.
                    self.dispatcher.notify();
                    self.process(&worker_id, job).await;
                }
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.changed() => {}
                        _ = self.dispatcher.wait() => {}
                    }
                }
                Err(e) => {
                    tracing::error!("Worker '{}' failed to dequeue: {}", worker_id, e);
                    tokio::select! {
                        _ = cancel.changed() => {}
                        _ = time::sleep(DEQUEUE_RETRY_BACKOFF) => {}
                    }
                }
            }
        }

        tracing::info!("Worker '{}' stopped", worker_id);
    }

    /// Execute one claimed job and record its outcome.
    async fn process(&self, worker_id: &str, job: Job) {
        tracing::info!(
            "Processing job: id={}, action='{}', attempt={}/{}",
            job.id,
            job.action.name,
            job.retry_count + 1,
            job.max_retries + 1
        );

        let timeout = Duration::from_millis(self.config.execution_timeout_ms);
        let outcome = match time::timeout(timeout, self.registry.run(&job.action)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                // The handler future is dropped here; the engine stops
                // waiting but cannot force a non-cooperative action to
                // stop doing external work.
                tracing::warn!(
                    "Job {} timed out after {}ms (worker '{}')",
                    job.id,
                    self.config.execution_timeout_ms,
                    worker_id
                );
                Err(ExecutionError::Transient(format!(
                    "execution timed out after {}ms",
                    self.config.execution_timeout_ms
                )))
            }
        };

        match outcome {
            Ok(result) => self.complete(job, result).await,
            Err(ExecutionError::Transient(msg)) if job.can_retry() => {
                self.schedule_retry(job, msg).await;
            }
            Err(ExecutionError::Transient(msg)) => self.fail(job, msg).await,
            Err(ExecutionError::Permanent(msg)) => self.fail(job, msg).await,
            Err(ExecutionError::Internal(err)) => self.fail(job, err.to_string()).await,
        }
    }

    /// Record a successful execution.
    async fn complete(&self, job: Job, result: Option<Value>) {
        let update = JobUpdate::to_state(JobState::Succeeded)
            .finished_at(Some(Utc::now()))
            .result(result);

        match self.store.update_job(job.id, job.version, update).await {
            Ok(_) => {
                tracing::info!("Job {} completed successfully", job.id);
                self.graph.resolve(job.id, JobState::Succeeded).await;
            }
            Err(e) if e.is_conflict() => {
                // A cancellation won the race; the execution's result is
                // dropped and the record keeps its deleted state.
                tracing::warn!("Job {} was cancelled while processing, result dropped", job.id);
            }
            Err(e) => {
                tracing::error!("Failed to mark job {} as succeeded: {}", job.id, e);
            }
        }
    }

    /// Send a transiently failed job back through the scheduler with
    /// backoff.
    async fn schedule_retry(&self, job: Job, error: String) {
        let attempt = job.retry_count + 1;
        let delay = self.retry.delay_for_attempt(attempt);
        let due_at = Utc::now() + ChronoDuration::milliseconds(delay.as_millis() as i64);

        let update = JobUpdate::to_state(JobState::Scheduled)
            .due_at(Some(due_at))
            .retry_count(attempt)
            .last_error(error.clone())
            .enqueued_at(None)
            .started_at(None)
            .claimed_by(None);

        match self.store.update_job(job.id, job.version, update).await {
            Ok(_) => {
                tracing::warn!(
                    "Job {} failed (attempt {}/{}), retrying in {:?}: {}",
                    job.id,
                    attempt,
                    job.max_retries + 1,
                    delay,
                    error
                );
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!("Job {} was cancelled while processing, retry dropped", job.id);
            }
            Err(e) => {
                tracing::error!("Failed to schedule retry of job {}: {}", job.id, e);
            }
        }
    }

    /// Record a terminal failure.
    async fn fail(&self, job: Job, error: String) {
        let update = JobUpdate::to_state(JobState::Failed)
            .finished_at(Some(Utc::now()))
            .last_error(error.clone());

        match self.store.update_job(job.id, job.version, update).await {
            Ok(_) => {
                tracing::error!("Job {} failed permanently: {}", job.id, error);
                self.graph.resolve(job.id, JobState::Failed).await;
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!("Job {} was cancelled while processing, failure dropped", job.id);
            }
            Err(e) => {
                tracing::error!("Failed to mark job {} as failed: {}", job.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    use stoker_core::error::AppError;
    use stoker_entity::continuation::ContinuationCondition;
    use stoker_entity::job::ActionInvocation;
    use stoker_store::MemoryJobStore;

    use crate::registry::ActionHandler;

    #[derive(Debug)]
    struct Reply;

    #[async_trait]
    impl ActionHandler for Reply {
        fn name(&self) -> &str {
            "reply"
        }

        async fn run(&self, args: &Value) -> Result<Option<Value>, ExecutionError> {
            Ok(Some(args.clone()))
        }
    }

    #[derive(Debug)]
    struct FlakyFail;

    #[async_trait]
    impl ActionHandler for FlakyFail {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn run(&self, _args: &Value) -> Result<Option<Value>, ExecutionError> {
            Err(ExecutionError::Transient("connection refused".to_string()))
        }
    }

    #[derive(Debug)]
    struct HardFail;

    #[async_trait]
    impl ActionHandler for HardFail {
        fn name(&self) -> &str {
            "hard"
        }

        async fn run(&self, _args: &Value) -> Result<Option<Value>, ExecutionError> {
            Err(ExecutionError::Permanent("bad payload".to_string()))
        }
    }

    #[derive(Debug)]
    struct Broken;

    #[async_trait]
    impl ActionHandler for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        async fn run(&self, _args: &Value) -> Result<Option<Value>, ExecutionError> {
            Err(ExecutionError::Internal(AppError::internal("boom")))
        }
    }

    #[derive(Debug)]
    struct Slow;

    #[async_trait]
    impl ActionHandler for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn run(&self, _args: &Value) -> Result<Option<Value>, ExecutionError> {
            time::sleep(Duration::from_millis(500)).await;
            Ok(None)
        }
    }

    fn pool(timeout_ms: u64) -> (Arc<MemoryJobStore>, Arc<Dispatcher>, WorkerPool) {
        let store = Arc::new(MemoryJobStore::new());
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone() as Arc<dyn JobStore>,
            vec!["default".to_string()],
        ));
        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(Reply));
        registry.register(Arc::new(FlakyFail));
        registry.register(Arc::new(HardFail));
        registry.register(Arc::new(Broken));
        registry.register(Arc::new(Slow));
        let graph = Arc::new(ContinuationGraph::new(
            store.clone() as Arc<dyn JobStore>,
            dispatcher.clone(),
        ));
        let pool = WorkerPool::new(
            store.clone() as Arc<dyn JobStore>,
            dispatcher.clone(),
            Arc::new(registry),
            graph,
            WorkerConfig {
                count: 1,
                execution_timeout_ms: timeout_ms,
                shutdown_grace_ms: 1_000,
            },
            RetryConfig {
                max_retries: 3,
                base_delay_ms: 10,
                max_delay_ms: 100,
                jitter: 0.0,
            },
        );
        (store, dispatcher, pool)
    }

    async fn claim(store: &MemoryJobStore, job: &Job) -> Job {
        store
            .claim_next(&job.queue, "w1")
            .await
            .unwrap()
            .expect("job should be claimable")
    }

    #[tokio::test]
    async fn test_success_records_result_and_releases_children() {
        let (store, _, pool) = pool(1_000);
        let job = Job::enqueued(ActionInvocation::new("reply", json!({"n": 7})), "default", 0);
        store.create_job(&job).await.unwrap();
        let waiting = Job::awaiting_parent(ActionInvocation::named("reply"), "default", 0);
        pool.graph
            .link(job.id, &waiting, ContinuationCondition::OnSuccess)
            .await
            .unwrap();

        let claimed = claim(&store, &job).await;
        pool.process("w1", claimed).await;

        let done = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(done.state, JobState::Succeeded);
        assert_eq!(done.result, Some(json!({"n": 7})));
        assert!(done.finished_at.is_some());

        let released = store.get_job(waiting.id).await.unwrap().unwrap();
        assert_eq!(released.state, JobState::Enqueued);
    }

    #[tokio::test]
    async fn test_transient_failure_schedules_backoff_retry() {
        let (store, _, pool) = pool(1_000);
        let job = Job::enqueued(ActionInvocation::named("flaky"), "default", 2);
        store.create_job(&job).await.unwrap();

        let claimed = claim(&store, &job).await;
        pool.process("w1", claimed).await;

        let retried = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(retried.state, JobState::Scheduled);
        assert_eq!(retried.retry_count, 1);
        assert!(retried.due_at.expect("due time set") > Utc::now() - ChronoDuration::seconds(1));
        assert_eq!(retried.last_error.as_deref(), Some("connection refused"));
        assert!(retried.claimed_by.is_none());
        assert!(retried.started_at.is_none());
        assert!(retried.enqueued_at.is_none());
    }

    #[tokio::test]
    async fn test_transient_failure_without_retries_is_terminal() {
        let (store, _, pool) = pool(1_000);
        let job = Job::enqueued(ActionInvocation::named("flaky"), "default", 0);
        store.create_job(&job).await.unwrap();

        let claimed = claim(&store, &job).await;
        pool.process("w1", claimed).await;

        let failed = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.retry_count, 0);
        assert!(failed.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_retries() {
        let (store, _, pool) = pool(1_000);
        let job = Job::enqueued(ActionInvocation::named("hard"), "default", 3);
        store.create_job(&job).await.unwrap();

        let claimed = claim(&store, &job).await;
        pool.process("w1", claimed).await;

        let failed = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.retry_count, 0);
        assert_eq!(failed.last_error.as_deref(), Some("bad payload"));
    }

    #[tokio::test]
    async fn test_internal_error_fails_without_retry() {
        let (store, _, pool) = pool(1_000);
        let job = Job::enqueued(ActionInvocation::named("broken"), "default", 3);
        store.create_job(&job).await.unwrap();

        let claimed = claim(&store, &job).await;
        pool.process("w1", claimed).await;

        let failed = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.retry_count, 0);
    }

    #[tokio::test]
    async fn test_timeout_counts_as_transient_failure() {
        let (store, _, pool) = pool(50);
        let job = Job::enqueued(ActionInvocation::named("slow"), "default", 0);
        store.create_job(&job).await.unwrap();

        let claimed = claim(&store, &job).await;
        pool.process("w1", claimed).await;

        let failed = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert!(
            failed
                .last_error
                .as_deref()
                .is_some_and(|e| e.contains("timed out"))
        );
    }

    #[tokio::test]
    async fn test_cancellation_during_processing_drops_result() {
        let (store, _, pool) = pool(1_000);
        let job = Job::enqueued(ActionInvocation::named("reply"), "default", 0);
        store.create_job(&job).await.unwrap();

        let claimed = claim(&store, &job).await;
        // Cancel lands while the handler runs; its version bump makes the
        // worker's outcome CAS fail.
        store.delete_job(job.id).await.unwrap();
        pool.process("w1", claimed).await;

        let after = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(after.state, JobState::Deleted);
        assert!(after.result.is_none());
    }
}
