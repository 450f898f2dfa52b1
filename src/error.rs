//! # Error types surfaced by the dispatcher.
//!
//! Three error enums cover the three failure surfaces:
//!
//! - [`TaskError`] — delivered through a [`Promise`](crate::Promise); how a
//!   submitted task ultimately failed.
//! - [`SubmitError`] — returned synchronously when a submission is rejected
//!   before a task id is even assigned.
//! - [`OptionError`] — returned by [`Dispatcher::set_option`](crate::Dispatcher::set_option)
//!   for values the pool refuses to run with.
//!
//! All types provide `as_label()` for stable snake_case labels in logs and
//! metrics. Worker-side faults are never fatal to the dispatcher; they only
//! ever reach the caller as a `TaskError` inside the task's promise.

use std::time::Duration;

use thiserror::Error;

/// # How a submitted task failed.
///
/// Every submitted task settles exactly once, with a value or with one of
/// these. `Failed` is the task's own doing; the other variants are produced
/// by the pool on the task's behalf.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// The task resolved FAILURE (rejected, returned an error, or returned
    /// without resolving at all).
    #[error("task failed: {reason}")]
    Failed {
        /// Error description produced by the task or its handler.
        reason: String,
    },

    /// The task did not resolve within its configured deadline. The worker
    /// that ran it has been abandoned and replaced.
    #[error("task timed out after {timeout:?}")]
    Timeout {
        /// The deadline that expired.
        timeout: Duration,
    },

    /// The worker's execution context died before the task resolved.
    #[error("worker lost before task resolved: {reason}")]
    WorkerLost {
        /// Panic message or exit description captured from the worker.
        reason: String,
    },

    /// The dispatcher stopped while the task was still queued (or the task
    /// was forcibly abandoned by `stop_now`).
    #[error("dispatcher stopped before the task completed")]
    Shutdown,
}

impl TaskError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed { .. } => "task_failed",
            TaskError::Timeout { .. } => "task_timeout",
            TaskError::WorkerLost { .. } => "task_worker_lost",
            TaskError::Shutdown => "task_shutdown",
        }
    }

    /// True when the failure was caused by the pool (timeout, lost worker,
    /// shutdown) rather than by the task's own logic.
    pub fn is_pool_fault(&self) -> bool {
        !matches!(self, TaskError::Failed { .. })
    }
}

/// # Why a submission was rejected at the door.
///
/// Returned by [`Dispatcher::call`](crate::Dispatcher::call) and
/// [`Dispatcher::execute`](crate::Dispatcher::execute) before any task id is
/// assigned; nothing reaches the queue.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubmitError {
    /// `call` named a callable that was never registered.
    #[error("unknown callable '{name}'")]
    UnknownCallable {
        /// The unregistered callable name.
        name: String,
    },

    /// The dispatcher has been stopped and accepts no new work.
    #[error("dispatcher is stopped")]
    Stopped,
}

impl SubmitError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            SubmitError::UnknownCallable { .. } => "submit_unknown_callable",
            SubmitError::Stopped => "submit_stopped",
        }
    }
}

/// # Why an option change was refused.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    /// The value is outside the range the pool can operate with
    /// (e.g. `PoolSizeMin` above `PoolSizeMax`, a zero `PoolSizeMax`).
    #[error("invalid value for {option}: {reason}")]
    InvalidValue {
        /// The option that was being set.
        option: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// The dispatcher has been stopped; tunables are frozen.
    #[error("dispatcher is stopped")]
    Stopped,
}

impl OptionError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            OptionError::InvalidValue { .. } => "option_invalid_value",
            OptionError::Stopped => "option_stopped",
        }
    }
}
