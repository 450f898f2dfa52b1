//! # Function-backed task (`TaskFn`)
//!
//! [`TaskFn`] wraps a closure `F: Fn(&Resolver)` as a [`Task`], which is the
//! most convenient way to build custom tasks and start tasks.
//!
//! ## Example
//! ```rust
//! use taskpool::{TaskFn, TaskRef, Value};
//!
//! let t: TaskRef = TaskFn::arc(|resolver| {
//!     // runs on a worker thread; blocking is fine here
//!     resolver.resolve(Value::from("done"));
//! });
//! ```

use std::sync::Arc;

use super::resolver::Resolver;
use super::task::Task;

/// Function-backed task implementation.
///
/// The closure takes `&self` (it is `Fn`, not `FnMut`), so a single
/// `TaskFn` can be executed by many workers; shared state must go through
/// explicit `Arc`s captured by the closure.
pub struct TaskFn<F> {
    f: F,
}

impl<F> TaskFn<F>
where
    F: Fn(&Resolver) + Send + Sync + 'static,
{
    /// Creates a new function-backed task.
    ///
    /// Prefer [`TaskFn::arc`] when you immediately need a [`TaskRef`](crate::TaskRef).
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the task and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F> Task for TaskFn<F>
where
    F: Fn(&Resolver) + Send + Sync + 'static,
{
    fn run(&self, resolver: &Resolver) {
        (self.f)(resolver)
    }
}
