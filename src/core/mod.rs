//! Dispatcher core: facade, scheduler, workers, and the settlement path.
//!
//! The only public API re-exported from here is the [`Dispatcher`] (with its
//! builder), the [`Promise`] it returns, and the [`PoolStats`] snapshot.
//! Everything else is an internal building block the dispatcher wires
//! together.
//!
//! ## Files & responsibilities
//! - **dispatcher.rs**: public facade; stamps task ids, allocates promise
//!   pairs, forwards commands to the core loop, wires the subscriber
//!   fan-out.
//! - **pool.rs**: the reactor-side state machine; owns queue, pending table,
//!   worker table, idle list, and tunables; handles dispatch, results,
//!   timeouts, elasticity, and shutdown.
//! - **worker.rs**: one OS thread per worker; runs start tasks, executes
//!   assignments, posts outcomes; `WorkerHandle` is the dispatcher-side
//!   owner.
//! - **channel.rs**: the result channel, the single MPSC structure between
//!   worker threads and the reactor.
//! - **promise.rs**: the oneshot-backed deferred result and its
//!   reactor-side settle half.
//!
//! ## Who talks to whom
//! ```text
//! caller ──► Dispatcher ──commands──► PoolCore ──assignment──► Worker thread
//!    ▲                                   ▲                        │
//!    └──────── Promise ◄──settle─────────┴───── result channel ◄──┘
//! ```

mod channel;
mod dispatcher;
mod pool;
mod promise;
mod worker;

pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use pool::PoolStats;
pub use promise::Promise;
