//! Priority dispatcher — serves queued jobs to workers in priority order.

use std::sync::Arc;

use tokio::sync::Notify;
use tracing;

use stoker_core::result::AppResult;
use stoker_entity::job::Job;
use stoker_store::JobStore;

/// Hands the next eligible job to an available worker.
///
/// Queue names are held in priority order, highest first. `dequeue` scans
/// them in that order and claims the oldest `Enqueued` job from the first
/// non-empty queue. Priority is strict: while a higher queue has work,
/// lower queues wait, however long that takes.
///
/// The dispatcher also carries the wake-up channel between producers and
/// workers: every component that makes a job dispatchable calls `notify`,
/// and idle workers suspend on `wait` instead of polling. `Notify` stores
/// a single permit when nobody is waiting, so a wake-up sent while every
/// worker is busy is not lost.
#[derive(Debug)]
pub struct Dispatcher {
    /// Store used for atomic claims.
    store: Arc<dyn JobStore>,
    /// Queue names, highest priority first.
    queues: Vec<String>,
    /// Wake-up channel for idle workers.
    work: Notify,
}

impl Dispatcher {
    /// Create a dispatcher over the given queues, highest priority first.
    pub fn new(store: Arc<dyn JobStore>, queues: Vec<String>) -> Self {
        Self {
            store,
            queues,
            work: Notify::new(),
        }
    }

    /// The configured queue names in priority order.
    pub fn queue_names(&self) -> &[String] {
        &self.queues
    }

    /// Claim the next eligible job for a worker.
    ///
    /// Scans queues in priority order and returns the oldest `Enqueued`
    /// job of the first non-empty queue, transitioned to `Processing` and
    /// bound to `worker_id`. Returns `None` when every queue is empty.
    pub async fn dequeue(&self, worker_id: &str) -> AppResult<Option<Job>> {
        for queue in &self.queues {
            if let Some(job) = self.store.claim_next(queue, worker_id).await? {
                tracing::debug!(
                    "Dequeued job: id={}, action='{}', queue='{}', worker='{}'",
                    job.id,
                    job.action.name,
                    job.queue,
                    worker_id
                );
                return Ok(Some(job));
            }
        }

        Ok(None)
    }

    /// Signal that a job became dispatchable.
    pub fn notify(&self) {
        self.work.notify_one();
    }

    /// Suspend until `notify` is called.
    ///
    /// Completes immediately if a permit was stored while nobody waited.
    pub async fn wait(&self) {
        self.work.notified().await;
    }
}
