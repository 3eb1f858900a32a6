//! Task queue abstraction and the in-memory queue the worker drains.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tracing::{debug, error};

use super::types::{DeadLetterEntry, RetryPolicy, Task, TaskId, TaskStatus};

/// Fire-and-forget dispatch of background work.
///
/// Callers never learn whether the task ran; enqueue failures are logged,
/// not returned.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, name: &str, payload: serde_json::Value);
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("task not found: {0}")]
    NotFound(TaskId),
    #[error("task already exists: {0}")]
    AlreadyExists(TaskId),
    #[error("queue storage error: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub pending: usize,
    pub running: usize,
    pub retrying: usize,
    pub completed: u64,
    pub dead_lettered: usize,
}

/// In-process queue. Completed tasks are dropped and only counted.
#[derive(Debug)]
pub struct InMemoryTaskQueue {
    tasks: RwLock<HashMap<TaskId, Task>>,
    dead_letters: RwLock<Vec<DeadLetterEntry>>,
    completed: AtomicU64,
    retry_policy: RetryPolicy,
    wakeup: Notify,
}

impl Default for InMemoryTaskQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl InMemoryTaskQueue {
    /// `retry_policy` is applied to every task created through [`TaskQueue::enqueue`].
    pub fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            dead_letters: RwLock::new(Vec::new()),
            completed: AtomicU64::new(0),
            retry_policy,
            wakeup: Notify::new(),
        }
    }

    pub fn push(&self, task: Task) -> Result<TaskId, QueueError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        if tasks.contains_key(&task.id) {
            return Err(QueueError::AlreadyExists(task.id));
        }
        let id = task.id;
        tasks.insert(id, task);
        drop(tasks);

        self.wakeup.notify_one();
        Ok(id)
    }

    pub fn get(&self, id: TaskId) -> Result<Option<Task>, QueueError> {
        Ok(self.tasks.read().map_err(|_| poisoned())?.get(&id).cloned())
    }

    /// Tasks still in the queue with the given name, oldest first.
    pub fn tasks_named(&self, name: &str) -> Result<Vec<Task>, QueueError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        let mut found: Vec<_> = tasks.values().filter(|t| t.name == name).cloned().collect();
        found.sort_by_key(|t| (t.created_at, t.id));
        Ok(found)
    }

    /// Mark the oldest ready task as running and hand it out.
    pub fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Task>, QueueError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;

        let next = tasks
            .values()
            .filter(|t| t.status.is_claimable() && t.is_ready(now))
            .min_by_key(|t| (t.created_at, t.id))
            .map(|t| t.id);

        Ok(next.and_then(|id| {
            tasks.get_mut(&id).map(|task| {
                task.start(now);
                task.clone()
            })
        }))
    }

    /// Store a task's new state after a run.
    pub fn update(&self, task: &Task) -> Result<(), QueueError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        if !tasks.contains_key(&task.id) {
            return Err(QueueError::NotFound(task.id));
        }

        if task.status == TaskStatus::Completed {
            tasks.remove(&task.id);
            self.completed.fetch_add(1, Ordering::Relaxed);
        } else {
            tasks.insert(task.id, task.clone());
        }
        Ok(())
    }

    /// Take a task out of the queue for good.
    pub fn dead_letter(&self, mut task: Task, reason: String) -> Result<(), QueueError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        let mut dead = self.dead_letters.write().map_err(|_| poisoned())?;

        tasks.remove(&task.id);
        if !matches!(task.status, TaskStatus::DeadLettered { .. }) {
            task.status = TaskStatus::DeadLettered {
                error: reason.clone(),
                attempts: task.attempt,
            };
        }
        dead.push(DeadLetterEntry {
            task,
            dead_lettered_at: Utc::now(),
            reason,
        });
        Ok(())
    }

    pub fn dead_letters(&self) -> Result<Vec<DeadLetterEntry>, QueueError> {
        Ok(self.dead_letters.read().map_err(|_| poisoned())?.clone())
    }

    pub fn stats(&self) -> Result<QueueStats, QueueError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        let mut stats = QueueStats {
            completed: self.completed.load(Ordering::Relaxed),
            dead_lettered: self.dead_letters.read().map_err(|_| poisoned())?.len(),
            ..QueueStats::default()
        };
        for task in tasks.values() {
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Running => stats.running += 1,
                TaskStatus::Retrying { .. } => stats.retrying += 1,
                TaskStatus::Completed | TaskStatus::DeadLettered { .. } => {}
            }
        }
        Ok(stats)
    }

    /// Resolves when a task was pushed since the last wake-up.
    pub async fn wait_for_work(&self) {
        self.wakeup.notified().await;
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn enqueue(&self, name: &str, payload: serde_json::Value) {
        let task = Task::new(name, payload).with_retry_policy(self.retry_policy.clone());
        match self.push(task) {
            Ok(id) => debug!(task_id = %id, task = name, "task enqueued"),
            Err(e) => error!(task = name, error = %e, "failed to enqueue task"),
        }
    }
}

fn poisoned() -> QueueError {
    QueueError::Storage("task queue lock poisoned".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn claims_oldest_ready_task_first() {
        let queue = InMemoryTaskQueue::default();
        queue.enqueue("first", serde_json::json!({"n": 1}));
        queue.enqueue("second", serde_json::json!({"n": 2}));

        let now = Utc::now();
        let claimed = queue.claim_next(now).unwrap().unwrap();
        assert_eq!(claimed.name, "first");
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.attempt, 1);

        assert_eq!(queue.claim_next(now).unwrap().unwrap().name, "second");
        assert!(queue.claim_next(now).unwrap().is_none());
    }

    #[test]
    fn retrying_task_waits_for_its_backoff() {
        let queue = InMemoryTaskQueue::new(RetryPolicy::fixed(3, Duration::from_secs(10)));
        queue.enqueue("flaky", serde_json::json!({}));

        let now = Utc::now();
        let mut task = queue.claim_next(now).unwrap().unwrap();
        task.fail("boom".to_string(), now, now, None);
        queue.update(&task).unwrap();

        assert!(queue.claim_next(now).unwrap().is_none());
        let later = now + chrono::Duration::seconds(11);
        assert_eq!(queue.claim_next(later).unwrap().unwrap().attempt, 2);
    }

    #[test]
    fn completed_tasks_leave_the_queue_and_are_counted() {
        let queue = InMemoryTaskQueue::default();
        queue.enqueue("done", serde_json::json!({}));

        let now = Utc::now();
        let mut task = queue.claim_next(now).unwrap().unwrap();
        task.succeed(now, now);
        queue.update(&task).unwrap();

        assert!(queue.get(task.id).unwrap().is_none());
        let stats = queue.stats().unwrap();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending + stats.running + stats.retrying, 0);
    }

    #[test]
    fn dead_lettered_tasks_are_kept_for_inspection() {
        let queue = InMemoryTaskQueue::default();
        queue.enqueue("doomed", serde_json::json!({"x": true}));
        let task = queue.claim_next(Utc::now()).unwrap().unwrap();
        let id = task.id;

        queue.dead_letter(task, "no handler".to_string()).unwrap();

        assert!(queue.get(id).unwrap().is_none());
        let dead = queue.dead_letters().unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "no handler");
        assert!(matches!(dead[0].task.status, TaskStatus::DeadLettered { attempts: 1, .. }));
    }

    #[test]
    fn tasks_named_filters_by_name() {
        let queue = InMemoryTaskQueue::default();
        queue.enqueue("send_activation_mail", serde_json::json!({"email": "a@b.c"}));
        queue.enqueue("products_statistic", serde_json::json!({}));

        let mails = queue.tasks_named("send_activation_mail").unwrap();
        assert_eq!(mails.len(), 1);
        assert_eq!(mails[0].payload["email"], "a@b.c");
        assert_eq!(queue.stats().unwrap().pending, 2);
    }
}
