//! Runtime events and the broadcast bus that carries them.
//!
//! The dispatcher core publishes an [`Event`] for every observable decision
//! it makes: submissions, assignments, settlements, worker lifecycle
//! transitions, and shutdown. Subscribers consume them through the
//! subscriber fan-out set or directly via
//! [`Dispatcher::subscribe`](crate::Dispatcher::subscribe).

mod bus;
mod event;

pub(crate) use bus::Bus;
pub use event::{Event, EventKind};
