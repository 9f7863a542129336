//! Engine assembly — wires components together and manages their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing;

use stoker_core::config::EngineConfig;
use stoker_core::result::AppResult;
use stoker_store::JobStore;

use crate::client::JobClient;
use crate::continuation::ContinuationGraph;
use crate::dispatcher::Dispatcher;
use crate::pool::WorkerPool;
use crate::registry::ActionRegistry;
use crate::retention::RetentionSweeper;
use crate::scheduler::DelayScheduler;
use crate::trigger::RecurringTrigger;

/// A running engine instance.
///
/// Holds the spawned background tasks (time-delay scheduler, recurring
/// trigger, retention sweeper, and one task per worker) and the shutdown
/// channel that stops them. Dropping the engine without calling
/// [`shutdown`](Engine::shutdown) leaves the tasks running detached.
#[derive(Debug)]
pub struct Engine {
    /// Client handed to embedders.
    client: JobClient,
    /// Flipped to `true` to stop every background task.
    shutdown: watch::Sender<bool>,
    /// Named task handles, joined on shutdown.
    tasks: Vec<(String, JoinHandle<()>)>,
    /// How long shutdown waits for in-flight work before aborting.
    grace: Duration,
}

impl Engine {
    /// Validate the configuration and start all background tasks.
    ///
    /// Must be called within a Tokio runtime. The registry is frozen at
    /// start; submissions referencing unregistered actions are rejected
    /// by the client.
    pub fn start(
        config: EngineConfig,
        store: Arc<dyn JobStore>,
        registry: ActionRegistry,
    ) -> AppResult<Self> {
        config.validate()?;

        tracing::info!(
            "Starting engine: queues={:?}, workers={}, actions={:?}",
            config.queues.names,
            config.worker.count,
            registry.registered_names()
        );

        let registry = Arc::new(registry);
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::clone(&store),
            config.queues.names.clone(),
        ));
        let graph = Arc::new(ContinuationGraph::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
        ));
        let client = JobClient::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            Arc::clone(&graph),
            Arc::clone(&registry),
            config.clone(),
        );

        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut tasks: Vec<(String, JoinHandle<()>)> = Vec::new();

        let scheduler = DelayScheduler::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            config.scheduler.clone(),
        );
        let rx = shutdown_rx.clone();
        tasks.push((
            "scheduler".to_string(),
            tokio::spawn(async move { scheduler.run(rx).await }),
        ));

        let trigger = RecurringTrigger::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            config.trigger.clone(),
        );
        let rx = shutdown_rx.clone();
        tasks.push((
            "trigger".to_string(),
            tokio::spawn(async move { trigger.run(rx).await }),
        ));

        let sweeper = RetentionSweeper::new(Arc::clone(&store), config.retention.clone());
        let rx = shutdown_rx.clone();
        tasks.push((
            "retention".to_string(),
            tokio::spawn(async move { sweeper.run(rx).await }),
        ));

        let pool = Arc::new(WorkerPool::new(
            Arc::clone(&store),
            Arc::clone(&dispatcher),
            Arc::clone(&registry),
            Arc::clone(&graph),
            config.worker.clone(),
            config.retry.clone(),
        ));
        for (i, handle) in pool.spawn(&shutdown_rx).into_iter().enumerate() {
            tasks.push((format!("worker-{}", i + 1), handle));
        }

        let grace = Duration::from_millis(config.worker.shutdown_grace_ms);
        tracing::info!("Engine started with {} background tasks", tasks.len());

        Ok(Self {
            client,
            shutdown,
            tasks,
            grace,
        })
    }

    /// Get a client for submitting and managing jobs.
    pub fn client(&self) -> JobClient {
        self.client.clone()
    }

    /// Gracefully drain and stop the engine.
    ///
    /// The scheduler, trigger, and sweeper stop at their next suspension
    /// point; workers finish the job they hold but claim no further ones.
    /// Tasks still running when the grace period ends are aborted.
    pub async fn shutdown(mut self) {
        tracing::info!("Engine shutting down (grace period {:?})", self.grace);
        if self.shutdown.send(true).is_err() {
            tracing::warn!("All engine tasks already stopped");
        }

        let deadline = tokio::time::Instant::now() + self.grace;
        for (name, mut handle) in self.tasks.drain(..) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!("Engine task '{}' panicked: {}", name, e);
                }
                Err(_) => {
                    tracing::warn!(
                        "Engine task '{}' did not stop within the grace period, aborting",
                        name
                    );
                    handle.abort();
                }
            }
        }

        tracing::info!("Engine shutdown complete");
    }
}
