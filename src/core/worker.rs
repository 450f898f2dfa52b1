//! # Pool worker: one OS thread, one task at a time.
//!
//! Each worker owns a dedicated thread created with [`std::thread::Builder`]
//! and named `taskpool-worker-{id}`. The dispatcher core keeps a
//! [`WorkerHandle`] per worker; the thread itself runs [`run`].
//!
//! ## Thread body
//! ```text
//! catch_unwind {
//!   run start tasks (each once; failure → StartFailed, exit)
//!   send Ready
//!   loop {
//!     recv assignment          (blocks while idle; channel close → exit)
//!     execute payload          (Call via registry / Custom via Task::run)
//!     send Outcome
//!   }
//! }
//! → Ok:  send Exited
//! → Err: send Crashed{panic message}
//! ```
//!
//! ## Rules
//! - The worker reads its assignment slot once per task and writes only to
//!   the result channel; it never touches dispatcher state or user
//!   callbacks.
//! - A panic anywhere on the thread (a user task, a start task) is context
//!   loss: the thread reports `Crashed` and ends. The dispatcher settles the
//!   in-flight task with `WorkerLost` and replaces the worker.
//! - Dropping the handle's assignment sender is the stop signal; the thread
//!   observes the closed channel and exits cleanly.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use serde_json::Value;

use crate::error::TaskError;
use crate::tasks::{Payload, Registry, Resolver, TaskId, TaskRef, WorkerId};

use super::channel::{ResultSender, WorkerEvent};

/// Dispatcher-side view of a worker's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    /// Thread created; start tasks still running.
    Spawning,
    /// Ready for an assignment.
    Idle,
    /// Executing exactly one task.
    Busy,
    /// Told to exit (or known dead); awaiting its terminal event.
    Dying,
}

/// One task handed to a worker.
pub(crate) struct Assignment {
    pub id: TaskId,
    pub payload: Payload,
}

/// Everything a worker thread needs, moved into it at spawn.
pub(crate) struct WorkerContext {
    pub id: WorkerId,
    pub registry: Arc<Registry>,
    pub start_tasks: Vec<TaskRef>,
    pub results: ResultSender,
    pub flags: u64,
}

/// Dispatcher-side handle owning one worker.
///
/// All fields are mutated only from the reactor thread; the worker table
/// keys handles by worker id.
pub(crate) struct WorkerHandle {
    pub state: WorkerState,
    /// Task currently assigned, if `Busy`.
    pub current: Option<TaskId>,
    /// Tasks executed since spawn.
    pub executed: u64,
    /// When the worker last became idle.
    pub idle_since: Instant,
    assignments: Option<std_mpsc::Sender<Assignment>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl WorkerHandle {
    /// Spawns the worker thread. The handle starts in `Spawning`; the
    /// dispatcher promotes it to `Idle` when the thread reports `Ready`.
    pub fn spawn(ctx: WorkerContext) -> std::io::Result<WorkerHandle> {
        let id = ctx.id;
        let (tx, rx) = std_mpsc::channel();

        let thread = thread::Builder::new()
            .name(format!("taskpool-worker-{id}"))
            .spawn(move || run(ctx, rx))?;

        Ok(WorkerHandle {
            state: WorkerState::Spawning,
            current: None,
            executed: 0,
            idle_since: Instant::now(),
            assignments: Some(tx),
            thread: Some(thread),
        })
    }

    /// Hands a task to the worker. On failure the thread is already dead
    /// and the assignment comes back untouched.
    pub fn assign(&mut self, assignment: Assignment) -> Result<(), Assignment> {
        debug_assert_eq!(self.state, WorkerState::Idle);
        match &self.assignments {
            Some(tx) => match tx.send(assignment) {
                Ok(()) => {
                    self.state = WorkerState::Busy;
                    Ok(())
                }
                Err(std_mpsc::SendError(assignment)) => Err(assignment),
            },
            None => Err(assignment),
        }
    }

    /// Requests graceful teardown: closes the assignment channel. An idle
    /// worker exits immediately; a busy one after its current task.
    pub fn retire(&mut self) {
        self.assignments = None;
        self.state = WorkerState::Dying;
    }

    /// Joins the thread. Only called after the worker posted its terminal
    /// event, so the join returns promptly.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Severs the handle without joining. Used for workers stuck in a task
    /// past its deadline: the thread cannot be interrupted, so it is left to
    /// finish (or not) on its own; its late events are discarded as stale.
    pub fn detach(mut self) {
        self.assignments = None;
        self.thread = None;
    }
}

/// Worker thread entry point.
pub(crate) fn run(ctx: WorkerContext, assignments: std_mpsc::Receiver<Assignment>) {
    let results = ctx.results.clone();
    let id = ctx.id;

    match panic::catch_unwind(AssertUnwindSafe(move || run_loop(ctx, assignments))) {
        Ok(()) => results.send(WorkerEvent::Exited { worker: id }),
        Err(payload) => results.send(WorkerEvent::Crashed {
            worker: id,
            info: panic_message(payload.as_ref()),
        }),
    }
}

fn run_loop(ctx: WorkerContext, assignments: std_mpsc::Receiver<Assignment>) {
    for task in &ctx.start_tasks {
        let resolver = Resolver::new(ctx.id, ctx.flags);
        task.run(&resolver);
        if let Err(error) = resolver.into_outcome() {
            ctx.results.send(WorkerEvent::StartFailed {
                worker: ctx.id,
                error: error.to_string(),
            });
            return;
        }
    }

    ctx.results.send(WorkerEvent::Ready { worker: ctx.id });

    while let Ok(assignment) = assignments.recv() {
        let result = execute(&ctx, &assignment.payload);
        ctx.results.send(WorkerEvent::Outcome {
            worker: ctx.id,
            task: assignment.id,
            result,
        });
    }
}

/// Executes one payload to its outcome. Panics propagate to the thread
/// boundary where they become `Crashed`.
fn execute(ctx: &WorkerContext, payload: &Payload) -> Result<Value, TaskError> {
    let resolver = Resolver::new(ctx.id, ctx.flags);
    match payload {
        Payload::Call { name, args } => match ctx.registry.get(name) {
            Some(handler) => match handler(args) {
                Ok(value) => {
                    resolver.resolve(value);
                }
                Err(reason) => {
                    resolver.reject(reason);
                }
            },
            // Names are validated at submit; this covers a handler table
            // that changed between submit and execution.
            None => {
                resolver.reject(format!("unknown callable '{name}'"));
            }
        },
        Payload::Custom(task) => task.run(&resolver),
    }
    resolver.into_outcome()
}

/// Best-effort extraction of a panic payload's message.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
