//! # Dispatcher: the public facade over the pool core.
//!
//! [`Dispatcher`] is the handle an event-loop program holds. Submission
//! methods are synchronous and non-blocking: they stamp a task id, allocate
//! the promise pair, and hand the entry to the core loop over an unbounded
//! command channel. Everything stateful happens inside
//! [`PoolCore`](super::pool::PoolCore) on the reactor.
//!
//! Build one with [`DispatcherBuilder`]; construction spawns the core loop
//! onto the current tokio runtime, so it must happen inside one.
//!
//! ```no_run
//! use taskpool::{Config, Dispatcher, Value};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let dispatcher = Dispatcher::new(Config::default());
//!     dispatcher.register("strlen", |args| {
//!         let s = args.first().and_then(Value::as_str).ok_or("strlen: expected a string")?;
//!         Ok(Value::from(s.len()))
//!     });
//!
//!     let promise = dispatcher.call("strlen", vec!["zanzibar!".into()]).unwrap();
//!     assert_eq!(promise.await.unwrap(), Value::from(9));
//!
//!     dispatcher.stop().await;
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot};

use crate::config::{Config, PoolOption};
use crate::error::{OptionError, SubmitError};
use crate::events::{Bus, Event};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::tasks::{Payload, Registry, TaskRef};

use super::channel::result_channel;
use super::pool::{Command, PoolCore, PoolStats};
use super::promise::Promise;

/// Builder for a [`Dispatcher`] with optional event subscribers.
pub struct DispatcherBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
}

impl DispatcherBuilder {
    /// Creates a builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive pool lifecycle events through dedicated workers
    /// with bounded queues; a slow subscriber drops events rather than
    /// slowing the pool.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Builds the dispatcher and spawns its core loop.
    ///
    /// Must be called from within a tokio runtime. The pool immediately
    /// spawns workers up to `pool_size_min`.
    pub fn build(self) -> Dispatcher {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = Arc::new(SubscriberSet::new(self.subscribers, bus.clone()));
        spawn_subscriber_listener(&bus, subs);

        let registry = Arc::new(Registry::new());
        let (results_tx, results_rx) = result_channel();
        let (commands, commands_rx) = mpsc::unbounded_channel();

        let core = PoolCore::new(self.cfg, Arc::clone(&registry), bus.clone(), results_tx);
        tokio::spawn(core.run(commands_rx, results_rx));

        Dispatcher {
            commands,
            registry,
            bus,
            next_task: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
        }
    }
}

/// Forwards bus events into the subscriber fan-out set.
fn spawn_subscriber_listener(bus: &Bus, set: Arc<SubscriberSet>) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => set.emit_arc(Arc::new(ev)),
                Err(broadcast::error::RecvError::Closed) => break,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    });
}

/// Non-blocking facade over the worker pool.
///
/// Dropping the dispatcher triggers a graceful stop in the background; call
/// [`stop`](Dispatcher::stop) for a deterministic shutdown.
pub struct Dispatcher {
    commands: mpsc::UnboundedSender<Command>,
    registry: Arc<Registry>,
    bus: Bus,
    next_task: AtomicU64,
    stopped: AtomicBool,
}

impl Dispatcher {
    /// Creates a dispatcher with the given configuration and no subscribers.
    pub fn new(cfg: Config) -> Self {
        DispatcherBuilder::new(cfg).build()
    }

    /// Returns a builder for a dispatcher with subscribers.
    pub fn builder(cfg: Config) -> DispatcherBuilder {
        DispatcherBuilder::new(cfg)
    }

    /// Registers a named callable for [`call`](Dispatcher::call),
    /// replacing any previous handler under the same name.
    ///
    /// The handler runs on worker threads and may block freely.
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.registry.register(name, handler);
    }

    /// Submits a call to a registered callable with positional arguments.
    ///
    /// Returns immediately with the task's [`Promise`]. The name is
    /// validated here; execution happens on a worker thread once one is
    /// free, in strict submission order.
    pub fn call(
        &self,
        name: impl Into<String>,
        args: Vec<Value>,
    ) -> Result<Promise, SubmitError> {
        let name = name.into();
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SubmitError::Stopped);
        }
        if !self.registry.contains(&name) {
            return Err(SubmitError::UnknownCallable { name });
        }
        self.submit(Payload::Call { name, args })
    }

    /// Submits a custom task object.
    pub fn execute(&self, task: TaskRef) -> Result<Promise, SubmitError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(SubmitError::Stopped);
        }
        self.submit(Payload::Custom(task))
    }

    fn submit(&self, payload: Payload) -> Result<Promise, SubmitError> {
        // Task ids are monotonically increasing and start at 1.
        let id = self.next_task.fetch_add(1, Ordering::Relaxed) + 1;
        let (promise, settle) = Promise::pair();
        self.commands
            .send(Command::Submit { id, payload, settle })
            .map_err(|_| SubmitError::Stopped)?;
        Ok(promise)
    }

    /// Changes one pool tunable and returns the prior value.
    ///
    /// Running tasks are unaffected; the change applies to the next
    /// spawn/assign/recycle decision.
    pub async fn set_option(&self, opt: PoolOption) -> Result<PoolOption, OptionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::SetOption { opt, reply: tx })
            .map_err(|_| OptionError::Stopped)?;
        rx.await.map_err(|_| OptionError::Stopped)?
    }

    /// Adds a task to the start-task set. Idempotent by object identity:
    /// adding the same `TaskRef` twice is a no-op.
    ///
    /// Start tasks run once on every subsequently spawned worker, before it
    /// accepts user tasks, and must resolve like any other task; a failing
    /// start task prevents the worker from ever becoming ready.
    pub fn add_start_task(&self, task: TaskRef) {
        let _ = self.commands.send(Command::AddStartTask(task));
    }

    /// Removes a task from the start-task set (idempotent).
    pub fn remove_start_task(&self, task: TaskRef) {
        let _ = self.commands.send(Command::RemoveStartTask(task));
    }

    /// Returns point-in-time pool counters.
    ///
    /// After the pool has stopped this returns zeroed stats.
    pub async fn snapshot(&self) -> PoolStats {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Snapshot { reply: tx }).is_err() {
            return PoolStats::default();
        }
        rx.await.unwrap_or_default()
    }

    /// Subscribes to pool lifecycle events.
    ///
    /// The receiver observes everything published after this call; a lagging
    /// receiver loses its oldest events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Stops the pool gracefully and waits for the drain.
    ///
    /// Queued-but-unassigned tasks settle with
    /// [`TaskError::Shutdown`](crate::TaskError::Shutdown); in-flight tasks
    /// complete naturally (their deadlines still apply). Further submissions
    /// are rejected.
    pub async fn stop(&self) {
        self.shutdown(false).await
    }

    /// Stops the pool immediately.
    ///
    /// Queued **and** in-flight tasks settle with
    /// [`TaskError::Shutdown`](crate::TaskError::Shutdown); workers are
    /// abandoned without waiting for their current task.
    pub async fn stop_now(&self) {
        self.shutdown(true).await
    }

    async fn shutdown(&self, force: bool) {
        self.stopped.store(true, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        if self
            .commands
            .send(Command::Stop { force, done: tx })
            .is_ok()
        {
            let _ = rx.await;
        }
    }
}
