//! # Single-settlement resolver handed to executing tasks.
//!
//! A [`Resolver`] is created on the worker thread for each task execution.
//! The task settles it exactly once; the first `resolve`/`reject` wins and
//! later calls are ignored. After `run` returns, the worker extracts the
//! outcome; an unsettled resolver becomes a "task did not resolve" failure.
//!
//! The resolver also carries the executing worker's identity and the
//! context-flag snapshot the worker was spawned with, so tasks (start tasks
//! in particular) can adapt to the context they run in.

use std::cell::RefCell;

use serde_json::Value;

use crate::error::TaskError;

use super::task::WorkerId;

/// Settlement cell for one task execution.
///
/// Not `Sync`: it lives and dies on the worker thread that executes the
/// task.
pub struct Resolver {
    worker: WorkerId,
    flags: u64,
    outcome: RefCell<Option<Result<Value, String>>>,
}

impl Resolver {
    pub(crate) fn new(worker: WorkerId, flags: u64) -> Self {
        Self {
            worker,
            flags,
            outcome: RefCell::new(None),
        }
    }

    /// Settles the task with a value.
    ///
    /// Returns `false` if the task was already settled (the call is ignored).
    pub fn resolve(&self, value: Value) -> bool {
        self.settle(Ok(value))
    }

    /// Settles the task with a failure description.
    ///
    /// Returns `false` if the task was already settled (the call is ignored).
    pub fn reject(&self, reason: impl Into<String>) -> bool {
        self.settle(Err(reason.into()))
    }

    /// True once `resolve` or `reject` has been called.
    pub fn is_settled(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Id of the worker executing this task.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// The context-flag snapshot the executing worker was spawned with.
    pub fn context_flags(&self) -> u64 {
        self.flags
    }

    fn settle(&self, outcome: Result<Value, String>) -> bool {
        let mut slot = self.outcome.borrow_mut();
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        true
    }

    /// Extracts the final outcome after `run` returned.
    pub(crate) fn into_outcome(self) -> Result<Value, TaskError> {
        match self.outcome.into_inner() {
            Some(Ok(value)) => Ok(value),
            Some(Err(reason)) => Err(TaskError::Failed { reason }),
            None => Err(TaskError::Failed {
                reason: "task did not resolve".into(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_settlement_wins() {
        let r = Resolver::new(1, 0);
        assert!(r.resolve(Value::from(1)));
        assert!(!r.resolve(Value::from(2)));
        assert!(!r.reject("late"));
        assert_eq!(r.into_outcome().unwrap(), Value::from(1));
    }

    #[test]
    fn reject_becomes_task_failure() {
        let r = Resolver::new(1, 0);
        r.reject("oh noes!!!");
        match r.into_outcome() {
            Err(TaskError::Failed { reason }) => assert_eq!(reason, "oh noes!!!"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn unsettled_resolver_is_a_failure() {
        let r = Resolver::new(1, 0);
        assert!(!r.is_settled());
        match r.into_outcome() {
            Err(TaskError::Failed { reason }) => assert_eq!(reason, "task did not resolve"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn exposes_worker_context() {
        let r = Resolver::new(9, 0b1010);
        assert_eq!(r.worker(), 9);
        assert_eq!(r.context_flags(), 0b1010);
    }
}
