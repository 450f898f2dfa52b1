//! # Task abstraction for worker execution.
//!
//! Defines the core [`Task`] trait for blocking units of work.
//!
//! - **[`Task`]** — trait for custom tasks with their own execution body
//! - **[`TaskRef`]** — shared handle (`Arc<dyn Task>`) for passing tasks
//!   into the dispatcher
//!
//! ## Rules
//! - `run` executes on a worker thread and may block freely; that is the
//!   whole point of the pool.
//! - `run` must settle its [`Resolver`] exactly once before returning
//!   (`resolve` or `reject`). Returning unsettled counts as a failure.
//! - A panic escaping `run` kills the worker thread; the task settles with
//!   [`TaskError::WorkerLost`](crate::TaskError::WorkerLost) and the pool
//!   spawns a replacement.
//! - Tasks are shared across threads; use interior mutability (with `Sync`
//!   types) to stash inputs and outputs in `self`.
//!
//! ## Example
//!
//! ```rust
//! use taskpool::{Resolver, Task, Value};
//!
//! struct Checksum {
//!     payload: Vec<u8>,
//! }
//!
//! impl Task for Checksum {
//!     fn run(&self, resolver: &Resolver) {
//!         let sum: u64 = self.payload.iter().map(|b| u64::from(*b)).sum();
//!         resolver.resolve(Value::from(sum));
//!     }
//! }
//! ```

use std::sync::Arc;

use serde_json::Value;

use super::resolver::Resolver;

/// Identifier of a submitted task, unique for the dispatcher's lifetime.
pub type TaskId = u64;

/// Identifier of a pool worker, unique for the dispatcher's lifetime.
pub type WorkerId = u64;

/// Shared handle to a task object.
///
/// Used for [`Dispatcher::execute`](crate::Dispatcher::execute) and for the
/// start-task set, where identity (the `Arc` pointer) is the membership key.
pub type TaskRef = Arc<dyn Task>;

/// A blocking, self-resolving unit of work.
pub trait Task: Send + Sync + 'static {
    /// Executes the task on a worker thread.
    ///
    /// Must call [`Resolver::resolve`] or [`Resolver::reject`] exactly once
    /// before returning. The resolver also exposes the executing worker's
    /// id and context-flag snapshot.
    fn run(&self, resolver: &Resolver);
}

/// What a worker actually executes for one task id.
pub(crate) enum Payload {
    /// A registered callable looked up by name, with positional arguments.
    Call { name: String, args: Vec<Value> },
    /// A user-supplied task object with its own execution body.
    Custom(TaskRef),
}
