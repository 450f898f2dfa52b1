//! # Runtime events emitted by the dispatcher core.
//!
//! [`EventKind`] classifies events into four groups:
//! - **Task lifecycle**: submission → assignment → settlement (or timeout).
//! - **Worker lifecycle**: spawn, readiness, recycling, retirement, loss.
//! - **Shutdown**: stop request and final drain.
//! - **Subscriber diagnostics**: fan-out overflow and panics.
//!
//! [`Event`] carries the metadata for each: task id, worker id, error text,
//! timeout, or backoff delay, depending on the kind.
//!
//! ## Ordering
//! Each event has a globally unique, monotonically increasing sequence
//! number (`seq`). Consumers that receive events through buffered channels
//! can use it to re-establish order.
//!
//! ## Flow examples
//!
//! A plain successful call:
//! ```text
//! TaskSubmitted{task} → TaskAssigned{task, worker} → TaskCompleted{task, worker}
//! ```
//!
//! A worker hitting its execution quota:
//! ```text
//! TaskCompleted{task, worker} → WorkerRecycled{worker} → WorkerSpawning{worker'}
//!   → WorkerReady{worker'}
//! ```
//!
//! A timed-out task:
//! ```text
//! TimeoutHit{task, worker} → WorkerAbandoned{worker} → WorkerSpawning{worker'}
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::tasks::{TaskId, WorkerId};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of dispatcher events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber diagnostics ===
    /// A subscriber panicked while processing an event.
    SubscriberPanicked,
    /// A subscriber dropped an event (queue full or worker closed).
    SubscriberOverflow,

    // === Shutdown ===
    /// Stop was requested; queued tasks are being cancelled.
    ShutdownRequested,
    /// The pool has fully drained and stopped.
    PoolStopped,

    // === Task lifecycle ===
    /// A task was accepted and entered the queue.
    TaskSubmitted,
    /// A task was handed to an idle worker.
    TaskAssigned,
    /// A task settled with a value.
    TaskCompleted,
    /// A task settled with an error (failure, worker loss).
    TaskFailed,
    /// A task's deadline expired before it resolved.
    TimeoutHit,
    /// A queued task was cancelled by shutdown.
    TaskCancelled,

    // === Worker lifecycle ===
    /// A worker thread is being created.
    WorkerSpawning,
    /// A worker finished its start tasks and accepts work.
    WorkerReady,
    /// A start task failed; the worker never became ready.
    WorkerStartFailed,
    /// A worker reached its execution quota and is being replaced.
    WorkerRecycled,
    /// An idle worker was retired (idle sweep or pool shrink).
    WorkerRetired,
    /// A busy worker was abandoned after a task timeout.
    WorkerAbandoned,
    /// A worker's thread died before resolving its task.
    WorkerCrashed,
    /// A respawn attempt was delayed after repeated spawn failures.
    BackoffScheduled,
}

/// Dispatcher event with optional metadata.
#[derive(Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp (may go backwards; use for logging only).
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Task id, if the event concerns a task.
    pub task: Option<TaskId>,
    /// Worker id, if the event concerns a worker.
    pub worker: Option<WorkerId>,
    /// Error message, if the event represents a failure.
    pub error: Option<String>,
    /// Expired deadline (for `TimeoutHit`).
    pub timeout: Option<Duration>,
    /// Respawn delay (for `BackoffScheduled`).
    pub delay: Option<Duration>,
}

impl Event {
    /// Creates a new event of the given kind with the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            task: None,
            worker: None,
            error: None,
            timeout: None,
            delay: None,
        }
    }

    /// Attaches a task id.
    pub fn with_task(mut self, id: TaskId) -> Self {
        self.task = Some(id);
        self
    }

    /// Attaches a worker id.
    pub fn with_worker(mut self, id: WorkerId) -> Self {
        self.worker = Some(id);
        self
    }

    /// Attaches an error message.
    pub fn with_error(mut self, msg: impl Into<String>) -> Self {
        self.error = Some(msg.into());
        self
    }

    /// Attaches the expired deadline.
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    /// Attaches a backoff delay.
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    /// Creates a subscriber overflow event.
    pub(crate) fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::now(EventKind::SubscriberOverflow)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    pub(crate) fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::now(EventKind::SubscriberPanicked)
            .with_error(format!("subscriber={subscriber} panic={info}"))
    }

    pub(crate) fn is_subscriber_diagnostic(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::now(EventKind::TaskSubmitted);
        let b = Event::now(EventKind::TaskAssigned);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn builders_attach_metadata() {
        let ev = Event::now(EventKind::TimeoutHit)
            .with_task(7)
            .with_worker(2)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(ev.task, Some(7));
        assert_eq!(ev.worker, Some(2));
        assert_eq!(ev.timeout, Some(Duration::from_secs(5)));
        assert!(ev.error.is_none());
    }
}
