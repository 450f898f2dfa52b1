//! # taskpool
//!
//! **Taskpool** is a non-blocking dispatcher over a pool of OS worker
//! threads, built for cooperatively scheduled (single-threaded) event-loop
//! programs that need to run blocking work (filesystem I/O, CPU-bound
//! computation, legacy synchronous libraries) without stalling the loop.
//!
//! Submission returns a [`Promise`] immediately; a worker thread executes
//! the task and the promise settles back on the loop thread with a value or
//! a [`TaskError`].
//!
//! ## Features
//!
//! | Area            | Description                                                         | Key types / traits                   |
//! |-----------------|---------------------------------------------------------------------|--------------------------------------|
//! | **Dispatch**    | Submit named calls or custom tasks; FIFO queue, deferred results.   | [`Dispatcher`], [`Promise`]          |
//! | **Tasks**       | Blocking units of work that settle a resolver exactly once.         | [`Task`], [`TaskFn`], [`Resolver`]   |
//! | **Pool**        | Elastic min/max sizing, exec-limit recycling, idle retirement.      | [`Config`], [`PoolOption`]           |
//! | **Recovery**    | Per-task timeouts, crash isolation, paced worker respawns.          | [`TaskError`], [`BackoffPolicy`]     |
//! | **Observer API**| Hook into pool lifecycle events (logging, metrics, test hooks).     | [`Subscribe`], [`Event`]             |
//! | **Errors**      | Typed errors for submission, settlement, and tunables.              | [`TaskError`], [`SubmitError`], [`OptionError`] |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] subscriber
//!   _(demo/reference only)_.
//!
//! ```no_run
//! use taskpool::{Config, Dispatcher, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let mut cfg = Config::default();
//!     cfg.pool_size_max = 4;
//!
//!     let dispatcher = Dispatcher::new(cfg);
//!
//!     // Register callables up front; workers resolve them by name.
//!     dispatcher.register("multiply", |args| {
//!         let a = args.first().and_then(Value::as_i64).ok_or("multiply: bad args")?;
//!         let b = args.get(1).and_then(Value::as_i64).ok_or("multiply: bad args")?;
//!         Ok(Value::from(a * b))
//!     });
//!
//!     let answer = dispatcher.call("multiply", vec![6.into(), 7.into()]).unwrap();
//!     assert_eq!(answer.await.unwrap(), Value::from(42));
//!
//!     dispatcher.stop().await;
//! }
//! ```
//!
//! ## Execution model
//!
//! The dispatcher's own logic runs as a single task on the event loop; all
//! queue, pending-table, and worker-state mutation happens there, unlocked.
//! Workers run on parallel OS threads and communicate back only through the
//! result channel. Timeout is the sole cancellation mechanism: a task that
//! overruns its deadline settles with [`TaskError::Timeout`] and its worker
//! is abandoned and replaced, since a blocked thread cannot be interrupted.
//!
//! ---

mod config;
mod core;
mod error;
mod events;
mod policies;
mod subscribers;
mod tasks;

// ---- Public re-exports ----

pub use config::{Config, PoolOption};
pub use crate::core::{Dispatcher, DispatcherBuilder, PoolStats, Promise};
pub use error::{OptionError, SubmitError, TaskError};
pub use events::{Event, EventKind};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use subscribers::Subscribe;
pub use tasks::{Registry, Resolver, Task, TaskFn, TaskId, TaskRef, WorkerId};

/// Value type carried through calls, task results, and promises.
///
/// Self-describing and `Send`, so it is safe to move across execution
/// contexts.
pub use serde_json::Value;

// Optional: expose a simple built-in logging subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
