//! # LogWriter — simple event printer
//!
//! A minimal subscriber that prints pool events to stdout. Use it for tests
//! or demos.
//!
//! ## Example output
//! ```text
//! [submitted] task=1
//! [assigned] task=1 worker=1
//! [completed] task=1 worker=1
//! [timeout] task=4 worker=2 timeout=2s
//! [worker-crashed] worker=3 err="boom"
//! [shutdown-requested]
//! [pool-stopped]
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
pub struct LogWriter;

impl LogWriter {
    /// Constructs a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        match e.kind {
            EventKind::TaskSubmitted => {
                println!("[submitted] task={:?}", e.task);
            }
            EventKind::TaskAssigned => {
                println!("[assigned] task={:?} worker={:?}", e.task, e.worker);
            }
            EventKind::TaskCompleted => {
                println!("[completed] task={:?} worker={:?}", e.task, e.worker);
            }
            EventKind::TaskFailed => {
                println!(
                    "[failed] task={:?} worker={:?} err={:?}",
                    e.task, e.worker, e.error
                );
            }
            EventKind::TimeoutHit => {
                println!(
                    "[timeout] task={:?} worker={:?} timeout={:?}",
                    e.task, e.worker, e.timeout
                );
            }
            EventKind::TaskCancelled => {
                println!("[cancelled] task={:?}", e.task);
            }
            EventKind::WorkerSpawning => {
                println!("[worker-spawning] worker={:?}", e.worker);
            }
            EventKind::WorkerReady => {
                println!("[worker-ready] worker={:?}", e.worker);
            }
            EventKind::WorkerStartFailed => {
                println!("[worker-start-failed] worker={:?} err={:?}", e.worker, e.error);
            }
            EventKind::WorkerRecycled => {
                println!("[worker-recycled] worker={:?}", e.worker);
            }
            EventKind::WorkerRetired => {
                println!("[worker-retired] worker={:?}", e.worker);
            }
            EventKind::WorkerAbandoned => {
                println!("[worker-abandoned] worker={:?}", e.worker);
            }
            EventKind::WorkerCrashed => {
                println!("[worker-crashed] worker={:?} err={:?}", e.worker, e.error);
            }
            EventKind::BackoffScheduled => {
                println!("[backoff] delay={:?}", e.delay);
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested]");
            }
            EventKind::PoolStopped => {
                println!("[pool-stopped]");
            }
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked => {
                println!("[subscriber-diagnostic] err={:?}", e.error);
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
