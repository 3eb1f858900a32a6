//! Task records, statuses and retry policy.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    /// Waiting for a worker.
    Pending,
    Running,
    Completed,
    /// Last attempt failed; another one is scheduled.
    Retrying { error: String, attempt: u32 },
    /// Gave up; the task lives in the dead-letter list.
    DeadLettered { error: String, attempts: u32 },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::DeadLettered { .. })
    }

    pub fn is_claimable(&self) -> bool {
        matches!(self, TaskStatus::Pending | TaskStatus::Retrying { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffStrategy {
    Fixed,
    Linear,
    #[default]
    Exponential,
}

/// How often, and how far apart, a failing task is retried.
///
/// `max_attempts` counts every run including the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempt),
            BackoffStrategy::Exponential => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                self.base_delay.saturating_mul(factor)
            }
        };
        delay.min(self.max_delay)
    }

    pub fn allows_another_attempt(&self, attempts_so_far: u32) -> bool {
        attempts_so_far < self.max_attempts
    }
}

/// One run of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAttempt {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub error: Option<String>,
}

/// A unit of deferred work: a handler name plus a JSON payload.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub payload: serde_json::Value,
    pub status: TaskStatus,
    pub retry_policy: RetryPolicy,
    /// Number of runs started so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Earliest time the next run may start.
    pub run_after: Option<DateTime<Utc>>,
    pub history: Vec<TaskAttempt>,
}

impl Task {
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            name: name.into(),
            payload,
            status: TaskStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            created_at: now,
            updated_at: now,
            run_after: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.run_after.is_none_or(|at| at <= now)
    }

    pub fn start(&mut self, now: DateTime<Utc>) {
        self.status = TaskStatus::Running;
        self.attempt += 1;
        self.run_after = None;
        self.updated_at = now;
    }

    pub fn succeed(&mut self, started_at: DateTime<Utc>, now: DateTime<Utc>) {
        self.status = TaskStatus::Completed;
        self.updated_at = now;
        self.history.push(TaskAttempt {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            error: None,
        });
    }

    /// Record a failed run and decide between retrying and giving up.
    ///
    /// `retry_in` overrides the policy's backoff for the next run.
    pub fn fail(&mut self, error: String, started_at: DateTime<Utc>, now: DateTime<Utc>, retry_in: Option<Duration>) {
        self.updated_at = now;
        self.history.push(TaskAttempt {
            attempt: self.attempt,
            started_at,
            finished_at: now,
            error: Some(error.clone()),
        });

        if self.retry_policy.allows_another_attempt(self.attempt) {
            let delay = retry_in.unwrap_or_else(|| self.retry_policy.delay_after(self.attempt));
            let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
            self.run_after = Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC));
            self.status = TaskStatus::Retrying {
                error,
                attempt: self.attempt,
            };
        } else {
            self.status = TaskStatus::DeadLettered {
                error,
                attempts: self.attempt,
            };
        }
    }
}

/// What a handler reports back for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Success,
    Failure(String),
    /// Transient failure; try again after the given delay.
    RetryAfter(Duration),
}

#[derive(Debug, Clone)]
pub struct DeadLetterEntry {
    pub task: Task,
    pub dead_lettered_at: DateTime<Utc>,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: BackoffStrategy) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            strategy,
        }
    }

    #[test]
    fn backoff_strategies_grow_as_named_and_are_capped() {
        let exp = policy(BackoffStrategy::Exponential);
        assert_eq!(exp.delay_after(1), Duration::from_millis(100));
        assert_eq!(exp.delay_after(2), Duration::from_millis(200));
        assert_eq!(exp.delay_after(3), Duration::from_millis(400));
        assert_eq!(exp.delay_after(4), Duration::from_millis(500));
        assert_eq!(exp.delay_after(64), Duration::from_millis(500));

        let linear = policy(BackoffStrategy::Linear);
        assert_eq!(linear.delay_after(3), Duration::from_millis(300));
        assert_eq!(linear.delay_after(9), Duration::from_millis(500));

        let fixed = RetryPolicy::fixed(3, Duration::from_millis(250));
        assert_eq!(fixed.delay_after(1), fixed.delay_after(3));
    }

    #[test]
    fn max_attempts_counts_the_first_run() {
        let p = RetryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(p.allows_another_attempt(2));
        assert!(!p.allows_another_attempt(3));
        assert!(!RetryPolicy::no_retry().allows_another_attempt(1));
    }

    #[test]
    fn failing_task_retries_then_dead_letters() {
        let mut task = Task::new("send_activation_mail", serde_json::json!({}))
            .with_retry_policy(RetryPolicy::fixed(2, Duration::from_secs(1)));
        let t0 = Utc::now();

        task.start(t0);
        task.fail("smtp down".to_string(), t0, t0, None);
        assert!(matches!(task.status, TaskStatus::Retrying { attempt: 1, .. }));
        assert!(!task.is_ready(t0));
        assert!(task.is_ready(t0 + chrono::Duration::seconds(1)));

        task.start(t0);
        task.fail("smtp still down".to_string(), t0, t0, None);
        assert!(matches!(task.status, TaskStatus::DeadLettered { attempts: 2, .. }));
        assert_eq!(task.history.len(), 2);
    }

    #[test]
    fn successful_run_is_recorded() {
        let mut task = Task::new("products_statistic", serde_json::json!({}));
        let t0 = Utc::now();
        task.start(t0);
        task.succeed(t0, t0);

        assert_eq!(task.status, TaskStatus::Completed);
        assert!(task.status.is_terminal());
        assert_eq!(task.history[0].error, None);
    }
}
