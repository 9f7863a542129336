//! Shared test helpers for integration tests.

// Not every test binary uses every helper.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time;

use stoker_core::config::EngineConfig;
use stoker_core::config::logging::LoggingConfig;
use stoker_core::types::JobId;
use stoker_engine::logging::init_logging;
use stoker_engine::{ActionHandler, ActionRegistry, Engine, ExecutionError, JobClient};
use stoker_entity::job::{Job, JobState};
use stoker_store::{JobStore, MemoryJobStore};

/// Default deadline for condition polling.
pub const WAIT: Duration = Duration::from_secs(5);

static INIT_LOGGING: Once = Once::new();

/// Install a quiet subscriber once per test binary so failing runs can be
/// re-run with `RUST_LOG` for detail.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        init_logging(&LoggingConfig {
            level: "warn".to_string(),
            format: "pretty".to_string(),
        });
    });
}

/// Record of everything the shared test handler did.
#[derive(Debug, Default)]
pub struct WorkLog {
    /// Labels of completed runs, in completion order.
    completed: Mutex<Vec<String>>,
    /// Number of started runs per label.
    runs: Mutex<HashMap<String, u32>>,
}

impl WorkLog {
    fn note_run(&self, label: &str) -> u32 {
        let mut runs = self.runs.lock().unwrap();
        let count = runs.entry(label.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    fn note_completed(&self, label: &str) {
        self.completed.lock().unwrap().push(label.to_string());
    }

    /// Labels of completed runs, in completion order.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    /// How many times a label's handler started running.
    pub fn runs_of(&self, label: &str) -> u32 {
        self.runs.lock().unwrap().get(label).copied().unwrap_or(0)
    }
}

/// The single handler used by integration tests.
///
/// Behavior is driven by the action arguments:
/// - `label`: name recorded in the [`WorkLog`]
/// - `sleep_ms`: hold the worker for this long before finishing
/// - `fail_runs`: fail transiently for the first N runs of this label
/// - `permanent`: fail permanently
#[derive(Debug)]
pub struct WorkHandler {
    log: Arc<WorkLog>,
}

impl WorkHandler {
    pub fn new(log: Arc<WorkLog>) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ActionHandler for WorkHandler {
    fn name(&self) -> &str {
        "work"
    }

    async fn run(&self, args: &Value) -> Result<Option<Value>, ExecutionError> {
        let label = args
            .get("label")
            .and_then(Value::as_str)
            .unwrap_or("-")
            .to_string();
        let run = self.log.note_run(&label);

        if let Some(ms) = args.get("sleep_ms").and_then(Value::as_u64) {
            time::sleep(Duration::from_millis(ms)).await;
        }
        if args
            .get("permanent")
            .and_then(Value::as_bool)
            .unwrap_or(false)
        {
            return Err(ExecutionError::Permanent(format!("refused '{label}'")));
        }
        if let Some(n) = args.get("fail_runs").and_then(Value::as_u64) {
            if u64::from(run) <= n {
                return Err(ExecutionError::Transient(format!(
                    "induced failure {run} of '{label}'"
                )));
            }
        }

        self.log.note_completed(&label);
        Ok(Some(json!({ "label": label })))
    }
}

/// A running engine plus everything tests need to observe it.
pub struct TestEngine {
    pub engine: Engine,
    pub client: JobClient,
    pub store: Arc<MemoryJobStore>,
    pub log: Arc<WorkLog>,
}

/// Configuration with intervals tightened for tests.
pub fn fast_config(workers: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.worker.count = workers;
    config.worker.execution_timeout_ms = 2_000;
    config.worker.shutdown_grace_ms = 2_000;
    config.scheduler.poll_interval_ms = 20;
    config.trigger.poll_interval_ms = 20;
    config.retry.base_delay_ms = 10;
    config.retry.max_delay_ms = 50;
    config.retry.jitter = 0.0;
    // Keep the sweeper out of the way; retention has its own tests.
    config.retention.sweep_interval_seconds = 3_600;
    config
}

/// Start an engine on a fresh in-memory store with the shared handler.
pub async fn start_engine_with(config: EngineConfig) -> TestEngine {
    init_test_logging();

    let store = Arc::new(MemoryJobStore::new());
    let log = Arc::new(WorkLog::default());
    let mut registry = ActionRegistry::new();
    registry.register(Arc::new(WorkHandler::new(Arc::clone(&log))));

    let engine = Engine::start(
        config,
        Arc::clone(&store) as Arc<dyn JobStore>,
        registry,
    )
    .expect("engine should start");
    let client = engine.client();

    TestEngine {
        engine,
        client,
        store,
        log,
    }
}

/// Start an engine with `workers` workers and fast polling.
pub async fn start_engine(workers: usize) -> TestEngine {
    start_engine_with(fast_config(workers)).await
}

/// An invocation of the shared handler with the given arguments.
pub fn work(args: Value) -> stoker_entity::job::ActionInvocation {
    stoker_entity::job::ActionInvocation::new("work", args)
}

/// Poll a condition until it holds or the deadline passes.
pub async fn wait_until(what: &str, deadline: Duration, mut condition: impl FnMut() -> bool) {
    let start = time::Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Poll a job until it reaches `state`, returning the final snapshot.
pub async fn wait_for_state(
    client: &JobClient,
    id: JobId,
    state: JobState,
    deadline: Duration,
) -> Job {
    let start = time::Instant::now();
    let mut last = None;
    while start.elapsed() < deadline {
        let job = client.status(id).await.expect("job should exist");
        if job.state == state {
            return job;
        }
        last = Some(job.state);
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for job {id} to reach {state:?}, last seen {last:?}");
}
