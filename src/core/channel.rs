//! # Result channel: worker threads → reactor.
//!
//! The single multi-producer, single-consumer structure in the system.
//! Workers push [`WorkerEvent`]s; the dispatcher core drains them on the
//! reactor thread.
//!
//! ## Guarantees
//! - **Non-blocking enqueue**: the channel is unbounded, so a worker never
//!   stalls on reactor-thread progress.
//! - **Lossless, exactly-once**: every enqueued event is dequeued once.
//! - **Per-worker FIFO**: a worker's events arrive in the order it produced
//!   them (events from different workers may interleave).
//! - **Edge-coalesced wakeup**: any number of enqueues between reactor polls
//!   wake the reactor once; the core drains the channel until empty before
//!   yielding.

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::TaskError;
use crate::tasks::{TaskId, WorkerId};

/// Events a worker thread reports to the dispatcher core.
pub(crate) enum WorkerEvent {
    /// All start tasks succeeded; the worker accepts assignments.
    Ready { worker: WorkerId },
    /// The worker finished executing a task.
    Outcome {
        worker: WorkerId,
        task: TaskId,
        result: Result<Value, TaskError>,
    },
    /// A start task failed; the worker never became ready and is exiting.
    StartFailed { worker: WorkerId, error: String },
    /// The worker's thread ended cleanly (assignment channel closed).
    Exited { worker: WorkerId },
    /// A panic escaped onto the worker's thread; its context is gone.
    Crashed { worker: WorkerId, info: String },
}

/// Sending half handed to every worker thread.
#[derive(Clone)]
pub(crate) struct ResultSender {
    tx: mpsc::UnboundedSender<WorkerEvent>,
}

impl ResultSender {
    /// Enqueues an event. Never blocks; if the reactor side is gone the
    /// event is dropped, which only happens during teardown.
    pub fn send(&self, event: WorkerEvent) {
        let _ = self.tx.send(event);
    }
}

/// Creates the result channel.
pub(crate) fn result_channel() -> (ResultSender, mpsc::UnboundedReceiver<WorkerEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSender { tx }, rx)
}
