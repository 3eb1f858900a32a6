//! Background worker: claims tasks, runs handlers, retries and dead-letters.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::queue::{InMemoryTaskQueue, QueueError};
use super::types::{Task, TaskId, TaskOutcome, TaskStatus};

#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> TaskOutcome;
}

#[derive(Debug, Clone)]
pub struct TaskWorkerConfig {
    /// How long to sleep when the queue has nothing ready.
    pub poll_interval: Duration,
    pub name: String,
}

impl Default for TaskWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "task-worker".to_string(),
        }
    }
}

impl TaskWorkerConfig {
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// How a single run ended, from the queue's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunReport {
    Completed,
    Retrying,
    DeadLettered,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub runs: u64,
    pub completed: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

impl WorkerStats {
    fn record(&mut self, report: RunReport) {
        self.runs += 1;
        match report {
            RunReport::Completed => self.completed += 1,
            RunReport::Retrying => self.retried += 1,
            RunReport::DeadLettered => self.dead_lettered += 1,
        }
    }
}

pub struct TaskWorker {
    queue: Arc<InMemoryTaskQueue>,
    handlers: HashMap<String, Arc<dyn TaskHandler>>,
}

impl TaskWorker {
    pub fn new(queue: Arc<InMemoryTaskQueue>) -> Self {
        Self {
            queue,
            handlers: HashMap::new(),
        }
    }

    /// Route tasks to `handler`.
    ///
    /// `pattern` is an exact task name, a `prefix.*` family, or `*`.
    pub fn register(&mut self, pattern: impl Into<String>, handler: impl TaskHandler + 'static) -> &mut Self {
        self.handlers.insert(pattern.into(), Arc::new(handler));
        self
    }

    fn handler_for(&self, name: &str) -> Option<&Arc<dyn TaskHandler>> {
        if let Some(handler) = self.handlers.get(name) {
            return Some(handler);
        }

        // Longest matching prefix wins.
        let family = self
            .handlers
            .iter()
            .filter_map(|(pattern, handler)| {
                let prefix = pattern.strip_suffix(".*")?;
                let rest = name.strip_prefix(prefix)?;
                rest.starts_with('.').then_some((prefix.len(), handler))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, handler)| handler);

        family.or_else(|| self.handlers.get("*"))
    }

    /// Claim and run at most one ready task.
    pub async fn run_once(&self) -> Result<Option<(TaskId, RunReport)>, QueueError> {
        let Some(task) = self.queue.claim_next(Utc::now())? else {
            return Ok(None);
        };
        let id = task.id;
        let report = self.execute(task).await?;
        Ok(Some((id, report)))
    }

    async fn execute(&self, mut task: Task) -> Result<RunReport, QueueError> {
        let started = Utc::now();

        let Some(handler) = self.handler_for(&task.name) else {
            let reason = format!("no handler registered for task '{}'", task.name);
            warn!(task_id = %task.id, task = %task.name, "{reason}");
            task.fail(reason.clone(), started, Utc::now(), None);
            self.queue.dead_letter(task, reason)?;
            return Ok(RunReport::DeadLettered);
        };

        debug!(task_id = %task.id, task = %task.name, attempt = task.attempt, "running task");
        let outcome = handler.handle(&task).await;
        let finished = Utc::now();

        let (error, retry_in) = match outcome {
            TaskOutcome::Success => {
                task.succeed(started, finished);
                self.queue.update(&task)?;
                debug!(task_id = %task.id, task = %task.name, "task completed");
                return Ok(RunReport::Completed);
            }
            TaskOutcome::Failure(error) => (error, None),
            TaskOutcome::RetryAfter(delay) => ("retry requested".to_string(), Some(delay)),
        };

        task.fail(error.clone(), started, finished, retry_in);
        if matches!(task.status, TaskStatus::DeadLettered { .. }) {
            warn!(task_id = %task.id, task = %task.name, attempts = task.attempt, error = %error, "task dead-lettered");
            self.queue.dead_letter(task, error)?;
            return Ok(RunReport::DeadLettered);
        }

        info!(
            task_id = %task.id,
            task = %task.name,
            attempt = task.attempt,
            error = %error,
            "task failed, will retry"
        );
        self.queue.update(&task)?;
        Ok(RunReport::Retrying)
    }

    /// Run the worker loop on the tokio runtime until the handle shuts it down.
    pub fn spawn(self, config: TaskWorkerConfig) -> TaskWorkerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(Mutex::new(WorkerStats::default()));
        let join = tokio::spawn(worker_loop(self, config, shutdown_rx, stats.clone()));

        TaskWorkerHandle {
            shutdown: shutdown_tx,
            join,
            stats,
        }
    }
}

async fn worker_loop(
    worker: TaskWorker,
    config: TaskWorkerConfig,
    mut shutdown: oneshot::Receiver<()>,
    stats: Arc<Mutex<WorkerStats>>,
) {
    info!(worker = %config.name, "task worker started");

    loop {
        if !matches!(shutdown.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
            break;
        }

        match worker.run_once().await {
            Ok(Some((_, report))) => {
                if let Ok(mut s) = stats.lock() {
                    s.record(report);
                }
                continue;
            }
            Ok(None) => {}
            Err(e) => error!(worker = %config.name, error = %e, "task queue error"),
        }

        tokio::select! {
            _ = &mut shutdown => break,
            _ = worker.queue.wait_for_work() => {}
            _ = tokio::time::sleep(config.poll_interval) => {}
        }
    }

    info!(worker = %config.name, "task worker stopped");
}

/// Control handle for a spawned [`TaskWorker`]. Dropping it also stops the loop.
#[derive(Debug)]
pub struct TaskWorkerHandle {
    shutdown: oneshot::Sender<()>,
    join: JoinHandle<()>,
    stats: Arc<Mutex<WorkerStats>>,
}

impl TaskWorkerHandle {
    /// Stop after the task currently running (if any) and wait for the loop to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.join.await {
            error!(error = %e, "task worker ended abnormally");
        }
    }

    pub fn stats(&self) -> WorkerStats {
        self.stats.lock().map(|s| *s).unwrap_or_default()
    }
}
