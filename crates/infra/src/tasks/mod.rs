//! Background tasks with retry, backoff and dead-letter handling.
//!
//! Request handlers enqueue work through [`TaskQueue`] and return at once.
//! A [`TaskWorker`] claims ready tasks from the [`InMemoryTaskQueue`] and
//! routes them to the [`TaskHandler`] registered for the task name.

pub mod handlers;
pub mod queue;
pub mod types;
pub mod worker;

pub use handlers::{
    ActivationMailHandler, ActivationMailPayload, LogMailer, MailError, Mailer, OutgoingMail, PRODUCTS_STATISTIC,
    ProductStatistics, ProductStatisticsHandler, SEND_ACTIVATION_MAIL, collect_statistics,
};
pub use queue::{InMemoryTaskQueue, QueueError, QueueStats, TaskQueue};
pub use types::{BackoffStrategy, DeadLetterEntry, RetryPolicy, Task, TaskId, TaskOutcome, TaskStatus};
pub use worker::{RunReport, TaskHandler, TaskWorker, TaskWorkerConfig, TaskWorkerHandle, WorkerStats};
