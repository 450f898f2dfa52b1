//! # Deferred results: the promise adapter.
//!
//! Submission returns a [`Promise`] immediately; the dispatcher core keeps
//! the matching [`Settle`] half and consumes it exactly once on the reactor
//! thread when the task's outcome is known. The pair wraps a oneshot
//! channel, which gives single settlement and cross-task wakeup for free.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::TaskError;

/// The settled outcome of a task.
pub type TaskOutcome = Result<Value, TaskError>;

/// Deferred result of a submitted task.
///
/// Settles exactly once: with the task's value, or with a [`TaskError`]
/// describing why no value will ever arrive. Await it like any future.
///
/// ```no_run
/// # async fn demo(dispatcher: taskpool::Dispatcher) -> Result<(), taskpool::TaskError> {
/// let promise = dispatcher.call("strlen", vec!["zanzibar!".into()]).unwrap();
/// let value = promise.await?;
/// assert_eq!(value, 9);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Promise {
    rx: oneshot::Receiver<TaskOutcome>,
}

impl Promise {
    /// Allocates a promise and its settle half.
    pub(crate) fn pair() -> (Promise, Settle) {
        let (tx, rx) = oneshot::channel();
        (Promise { rx }, Settle(Some(tx)))
    }
}

impl Future for Promise {
    type Output = TaskOutcome;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // The settle half was dropped unsettled; only possible when the
            // dispatcher was torn down forcibly.
            Poll::Ready(Err(_)) => Poll::Ready(Err(TaskError::Shutdown)),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Reactor-side settle callback for one promise.
///
/// Consumed by `settle`; a `Settle` that is dropped unsettled surfaces
/// [`TaskError::Shutdown`] to the awaiting side.
pub(crate) struct Settle(Option<oneshot::Sender<TaskOutcome>>);

impl Settle {
    /// Settles the promise. A second call cannot happen: `settle` consumes
    /// the value.
    pub fn settle(mut self, outcome: TaskOutcome) {
        if let Some(tx) = self.0.take() {
            // The caller may have dropped the promise; that is their choice.
            let _ = tx.send(outcome);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settles_with_value() {
        let (promise, settle) = Promise::pair();
        settle.settle(Ok(Value::from(5)));
        assert_eq!(promise.await.unwrap(), Value::from(5));
    }

    #[tokio::test]
    async fn settles_with_error() {
        let (promise, settle) = Promise::pair();
        settle.settle(Err(TaskError::Failed {
            reason: "nope".into(),
        }));
        match promise.await {
            Err(TaskError::Failed { reason }) => assert_eq!(reason, "nope"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn dropped_settle_surfaces_shutdown() {
        let (promise, settle) = Promise::pair();
        drop(settle);
        assert!(matches!(promise.await, Err(TaskError::Shutdown)));
    }
}
