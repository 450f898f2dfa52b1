//! # Broadcast bus for dispatcher events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`] so the dispatcher core can
//! publish [`Event`]s to any number of independent receivers.
//!
//! - **Broadcast semantics**: every active subscriber sees a clone of each
//!   event.
//! - **Non-persistent**: with no subscribers, events are dropped silently;
//!   the pool runs fine unobserved.
//! - **Bounded**: when a receiver lags past the channel capacity, its oldest
//!   events are dropped (`Lagged`), never the publisher's progress.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for dispatcher events.
#[derive(Clone)]
pub(crate) struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publishes an event to all current subscribers (non-blocking).
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Creates a receiver for all events published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
