//! # Pool core: the reactor-side scheduler and worker-pool state machine.
//!
//! One instance of [`PoolCore`] runs as a single task on the event loop and
//! owns every mutable structure in the system: the FIFO queue, the pending
//! table, the worker table, the idle list, and the tunables. Nothing here is
//! shared or locked; workers talk back exclusively through the result
//! channel.
//!
//! ## Flow
//! ```text
//! Dispatcher ──commands──► PoolCore::run()
//!                             │
//!   Submit ───────────────────┤ snapshot timeout, enqueue,
//!                             │ drain queue onto idle workers (MRU first,
//!                             │ deadline armed at assignment),
//!                             │ spawn while live < max and demand remains
//!                             │
//!   Worker results ───────────┤ Ready        → Idle, pull next entry
//!   (drained until empty      │ Outcome      → settle promise, recycle at
//!    before yielding)         │                quota or go Idle + pull next
//!                             │ StartFailed  → Dying, backoff respawn
//!                             │ Crashed      → settle WorkerLost, replace
//!                             │ Exited       → drop handle, join thread
//!                             │
//!   Timer wheel ──────────────┤ Deadline(t)  → settle Timeout, abandon the
//!                             │                wedged worker, replace
//!                             │ Respawn      → retry a failed spawn
//!                             │
//!   Idle sweep (1s) ──────────┘ retire LRU workers idle past threshold
//!                               while live > min
//! ```
//!
//! ## Rules
//! - Queue order is strict submission order; assignment never reorders.
//! - `pending ∩ queue = ∅`: an entry moves between them atomically.
//! - Every settle half is consumed exactly once; late outcomes for settled
//!   tasks are discarded as stale.
//! - Among idle workers the most recently used is assigned first; the least
//!   recently used is retired first.
//! - A timed-out worker is never reused: the thread cannot be interrupted,
//!   so it is detached and its slot refilled.
//! - All outcomes already in the result channel are processed before the
//!   core yields back to the reactor.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::time::{delay_queue::Key, DelayQueue};

use crate::config::{Config, PoolOption};
use crate::error::{OptionError, TaskError};
use crate::events::{Bus, Event, EventKind};
use crate::tasks::{Payload, Registry, StartTaskSet, TaskId, TaskRef, WorkerId};

use super::channel::{ResultSender, WorkerEvent};
use super::promise::Settle;
use super::worker::{Assignment, WorkerContext, WorkerHandle, WorkerState};

/// Requests from the [`Dispatcher`](crate::Dispatcher) facade to the core.
pub(crate) enum Command {
    Submit {
        id: TaskId,
        payload: Payload,
        settle: Settle,
    },
    SetOption {
        opt: PoolOption,
        reply: oneshot::Sender<Result<PoolOption, OptionError>>,
    },
    AddStartTask(TaskRef),
    RemoveStartTask(TaskRef),
    Snapshot {
        reply: oneshot::Sender<PoolStats>,
    },
    Stop {
        force: bool,
        done: oneshot::Sender<()>,
    },
}

/// Point-in-time counters of the pool, for monitoring and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers that count toward the pool bounds (spawning + idle + busy).
    pub live_workers: usize,
    /// Workers still running their start tasks.
    pub spawning_workers: usize,
    /// Workers ready for an assignment.
    pub idle_workers: usize,
    /// Workers executing a task.
    pub busy_workers: usize,
    /// Submitted tasks waiting for a free worker.
    pub queued: usize,
    /// Tasks currently assigned to a worker.
    pub in_flight: usize,
}

/// Entry awaiting a free worker.
///
/// The timeout is snapshotted at submit; later option changes do not affect
/// tasks already in the queue. The deadline timer itself is armed at
/// assignment; the clock measures execution, not queueing.
struct QueueEntry {
    id: TaskId,
    payload: Payload,
    timeout: Option<Duration>,
    settle: Settle,
}

/// Entry for a task handed to a worker.
struct PendingTask {
    worker: WorkerId,
    timer: Option<Key>,
    timeout: Option<Duration>,
    settle: Settle,
}

/// What a fired timer means.
enum TimerEntry {
    /// A task's deadline expired.
    Deadline(TaskId),
    /// Retry a previously failed worker spawn.
    Respawn,
}

struct StopGate {
    acks: Vec<oneshot::Sender<()>>,
}

/// Reactor-side owner of the pool. See the module docs for the flow.
pub(crate) struct PoolCore {
    cfg: Config,
    registry: Arc<Registry>,
    bus: Bus,
    start_tasks: StartTaskSet,
    queue: VecDeque<QueueEntry>,
    pending: HashMap<TaskId, PendingTask>,
    workers: HashMap<WorkerId, WorkerHandle>,
    /// Idle workers ordered by when they became idle: front = least
    /// recently used, back = most recently used.
    idle: Vec<WorkerId>,
    next_worker: WorkerId,
    results_tx: ResultSender,
    /// Backoff state across consecutive failed spawns; reset on Ready.
    respawn_delay: Option<Duration>,
    respawn_pending: bool,
    stop: Option<StopGate>,
}

impl PoolCore {
    pub fn new(cfg: Config, registry: Arc<Registry>, bus: Bus, results_tx: ResultSender) -> Self {
        Self {
            cfg,
            registry,
            bus,
            start_tasks: StartTaskSet::new(),
            queue: VecDeque::new(),
            pending: HashMap::new(),
            workers: HashMap::new(),
            idle: Vec::new(),
            next_worker: 0,
            results_tx,
            respawn_delay: None,
            respawn_pending: false,
            stop: None,
        }
    }

    /// Drives the pool until it is stopped and fully drained.
    pub async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut results: mpsc::UnboundedReceiver<WorkerEvent>,
    ) {
        let mut timeouts: DelayQueue<TimerEntry> = DelayQueue::new();
        let mut sweep = time::interval(self.cfg.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut commands_open = true;

        self.replenish(&mut timeouts);

        loop {
            tokio::select! {
                cmd = commands.recv(), if commands_open => match cmd {
                    Some(cmd) => self.on_command(cmd, &mut timeouts),
                    None => {
                        // Facade dropped without an explicit stop.
                        commands_open = false;
                        self.begin_stop(false, None, &mut timeouts);
                    }
                },
                Some(event) = results.recv() => {
                    self.on_worker_event(event, &mut timeouts);
                    while let Ok(event) = results.try_recv() {
                        self.on_worker_event(event, &mut timeouts);
                    }
                }
                Some(expired) = timeouts.next() => {
                    self.on_timer(expired.into_inner(), &mut timeouts);
                }
                _ = sweep.tick() => self.idle_sweep(),
            }

            if self.drained() {
                break;
            }
        }

        self.bus.publish(Event::now(EventKind::PoolStopped));
        if let Some(gate) = self.stop.take() {
            for ack in gate.acks {
                let _ = ack.send(());
            }
        }
    }

    // ---------------------------
    // Command handling
    // ---------------------------

    fn on_command(&mut self, cmd: Command, timeouts: &mut DelayQueue<TimerEntry>) {
        match cmd {
            Command::Submit { id, payload, settle } => {
                self.on_submit(id, payload, settle, timeouts)
            }
            Command::SetOption { opt, reply } => {
                let result = self.on_set_option(opt, timeouts);
                let _ = reply.send(result);
            }
            Command::AddStartTask(task) => {
                self.start_tasks.add(task);
            }
            Command::RemoveStartTask(task) => {
                self.start_tasks.remove(&task);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Stop { force, done } => self.begin_stop(force, Some(done), timeouts),
        }
    }

    fn on_submit(
        &mut self,
        id: TaskId,
        payload: Payload,
        settle: Settle,
        timeouts: &mut DelayQueue<TimerEntry>,
    ) {
        if self.stop.is_some() {
            settle.settle(Err(TaskError::Shutdown));
            return;
        }
        self.bus
            .publish(Event::now(EventKind::TaskSubmitted).with_task(id));
        self.queue.push_back(QueueEntry {
            id,
            payload,
            timeout: self.cfg.task_timeout,
            settle,
        });
        self.dispatch_queued(timeouts);
        self.replenish(timeouts);
    }

    fn on_set_option(
        &mut self,
        opt: PoolOption,
        timeouts: &mut DelayQueue<TimerEntry>,
    ) -> Result<PoolOption, OptionError> {
        if self.stop.is_some() {
            return Err(OptionError::Stopped);
        }
        let prior = self.cfg.apply(opt)?;
        // A raised minimum takes effect immediately; a lowered maximum
        // drains as workers return to idle.
        self.replenish(timeouts);
        Ok(prior)
    }

    // ---------------------------
    // Scheduling
    // ---------------------------

    /// Pulls queued entries onto idle workers, most recently used first.
    fn dispatch_queued(&mut self, timeouts: &mut DelayQueue<TimerEntry>) {
        while !self.queue.is_empty() {
            let Some(worker_id) = self.idle.pop() else { break };
            let entry = self.queue.pop_front().expect("queue checked non-empty");
            self.assign(worker_id, entry, timeouts);
        }
    }

    fn assign(
        &mut self,
        worker_id: WorkerId,
        entry: QueueEntry,
        timeouts: &mut DelayQueue<TimerEntry>,
    ) {
        let QueueEntry {
            id,
            payload,
            timeout,
            settle,
        } = entry;

        let Some(worker) = self.workers.get_mut(&worker_id) else {
            self.queue.push_front(QueueEntry {
                id,
                payload,
                timeout,
                settle,
            });
            return;
        };

        match worker.assign(Assignment { id, payload }) {
            Ok(()) => {
                worker.current = Some(id);
                let timer = timeout.map(|t| timeouts.insert(TimerEntry::Deadline(id), t));
                self.pending.insert(
                    id,
                    PendingTask {
                        worker: worker_id,
                        timer,
                        timeout,
                        settle,
                    },
                );
                self.bus.publish(
                    Event::now(EventKind::TaskAssigned)
                        .with_task(id)
                        .with_worker(worker_id),
                );
            }
            Err(assignment) => {
                // The thread died between Ready and this assignment; its
                // terminal event is still in the channel. Requeue at the
                // front to preserve FIFO order.
                worker.retire();
                self.queue.push_front(QueueEntry {
                    id: assignment.id,
                    payload: assignment.payload,
                    timeout,
                    settle,
                });
            }
        }
    }

    // ---------------------------
    // Worker events
    // ---------------------------

    fn on_worker_event(&mut self, event: WorkerEvent, timeouts: &mut DelayQueue<TimerEntry>) {
        match event {
            WorkerEvent::Ready { worker } => self.on_ready(worker, timeouts),
            WorkerEvent::Outcome {
                worker,
                task,
                result,
            } => self.on_outcome(worker, task, result, timeouts),
            WorkerEvent::StartFailed { worker, error } => {
                self.on_start_failed(worker, error, timeouts)
            }
            WorkerEvent::Crashed { worker, info } => self.on_crashed(worker, info, timeouts),
            WorkerEvent::Exited { worker } => self.on_exited(worker, timeouts),
        }
    }

    fn on_ready(&mut self, worker_id: WorkerId, timeouts: &mut DelayQueue<TimerEntry>) {
        let Some(state) = self.workers.get(&worker_id).map(|w| w.state) else {
            return;
        };
        if state == WorkerState::Dying {
            return;
        }
        self.respawn_delay = None;
        self.bus
            .publish(Event::now(EventKind::WorkerReady).with_worker(worker_id));

        if self.stop.is_some() || self.live_count() > self.cfg.pool_size_max {
            if let Some(worker) = self.workers.get_mut(&worker_id) {
                worker.retire();
            }
            self.bus
                .publish(Event::now(EventKind::WorkerRetired).with_worker(worker_id));
            return;
        }

        self.mark_idle(worker_id);
        self.dispatch_queued(timeouts);
    }

    fn on_outcome(
        &mut self,
        worker_id: WorkerId,
        task_id: TaskId,
        result: Result<serde_json::Value, TaskError>,
        timeouts: &mut DelayQueue<TimerEntry>,
    ) {
        // A missing entry means the task already timed out; the late
        // payload is discarded.
        let Some(pending) = self.pending.remove(&task_id) else {
            return;
        };
        if let Some(key) = pending.timer {
            timeouts.remove(&key);
        }
        match &result {
            Ok(_) => self.bus.publish(
                Event::now(EventKind::TaskCompleted)
                    .with_task(task_id)
                    .with_worker(worker_id),
            ),
            Err(err) => self.bus.publish(
                Event::now(EventKind::TaskFailed)
                    .with_task(task_id)
                    .with_worker(worker_id)
                    .with_error(err.to_string()),
            ),
        }
        pending.settle.settle(result);

        let Some(state) = self.workers.get(&worker_id).map(|w| w.state) else {
            return;
        };
        if state == WorkerState::Dying {
            return;
        }
        let executed = {
            let worker = self
                .workers
                .get_mut(&worker_id)
                .expect("worker state read above");
            worker.executed += 1;
            worker.current = None;
            worker.executed
        };

        if self.stop.is_some() {
            if let Some(worker) = self.workers.get_mut(&worker_id) {
                worker.retire();
            }
            return;
        }

        if self.cfg.exec_limit.is_some_and(|limit| executed >= limit) {
            self.bus
                .publish(Event::now(EventKind::WorkerRecycled).with_worker(worker_id));
            if let Some(worker) = self.workers.get_mut(&worker_id) {
                worker.retire();
            }
            self.replenish(timeouts);
        } else if self.live_count() > self.cfg.pool_size_max {
            self.bus
                .publish(Event::now(EventKind::WorkerRetired).with_worker(worker_id));
            if let Some(worker) = self.workers.get_mut(&worker_id) {
                worker.retire();
            }
        } else {
            self.mark_idle(worker_id);
            self.dispatch_queued(timeouts);
        }
    }

    fn on_start_failed(
        &mut self,
        worker_id: WorkerId,
        error: String,
        timeouts: &mut DelayQueue<TimerEntry>,
    ) {
        self.bus.publish(
            Event::now(EventKind::WorkerStartFailed)
                .with_worker(worker_id)
                .with_error(error),
        );
        if let Some(worker) = self.workers.get_mut(&worker_id) {
            worker.retire();
        }
        // The clean Exited that follows removes the handle.
        self.schedule_respawn(timeouts);
    }

    fn on_crashed(
        &mut self,
        worker_id: WorkerId,
        info: String,
        timeouts: &mut DelayQueue<TimerEntry>,
    ) {
        let Some(worker) = self.workers.remove(&worker_id) else {
            // Already abandoned after a timeout.
            return;
        };
        self.bus.publish(
            Event::now(EventKind::WorkerCrashed)
                .with_worker(worker_id)
                .with_error(&*info),
        );
        self.idle.retain(|id| *id != worker_id);
        let was_spawning = worker.state == WorkerState::Spawning;

        if let Some(task_id) = worker.current {
            if let Some(pending) = self.pending.remove(&task_id) {
                if let Some(key) = pending.timer {
                    timeouts.remove(&key);
                }
                self.bus.publish(
                    Event::now(EventKind::TaskFailed)
                        .with_task(task_id)
                        .with_worker(worker_id)
                        .with_error(&*info),
                );
                pending.settle.settle(Err(TaskError::WorkerLost {
                    reason: info.clone(),
                }));
            }
        }
        worker.join();

        if was_spawning {
            // A start task brought the thread down; pace the retries.
            self.schedule_respawn(timeouts);
        } else {
            self.replenish(timeouts);
        }
    }

    fn on_exited(&mut self, worker_id: WorkerId, timeouts: &mut DelayQueue<TimerEntry>) {
        let Some(worker) = self.workers.remove(&worker_id) else {
            return;
        };
        self.idle.retain(|id| *id != worker_id);
        // A clean exit never carries an assignment; settle one if it does.
        if let Some(task_id) = worker.current {
            if let Some(pending) = self.pending.remove(&task_id) {
                if let Some(key) = pending.timer {
                    timeouts.remove(&key);
                }
                pending.settle.settle(Err(TaskError::WorkerLost {
                    reason: "worker exited".into(),
                }));
            }
        }
        worker.join();
        self.replenish(timeouts);
    }

    // ---------------------------
    // Timers
    // ---------------------------

    fn on_timer(&mut self, entry: TimerEntry, timeouts: &mut DelayQueue<TimerEntry>) {
        match entry {
            TimerEntry::Deadline(task_id) => self.on_deadline(task_id, timeouts),
            TimerEntry::Respawn => {
                self.respawn_pending = false;
                self.replenish(timeouts);
            }
        }
    }

    fn on_deadline(&mut self, task_id: TaskId, timeouts: &mut DelayQueue<TimerEntry>) {
        let Some(pending) = self.pending.remove(&task_id) else {
            // Settled in the same wakeup; nothing to do.
            return;
        };
        let timeout = pending.timeout.unwrap_or_default();
        self.bus.publish(
            Event::now(EventKind::TimeoutHit)
                .with_task(task_id)
                .with_worker(pending.worker)
                .with_timeout(timeout),
        );
        pending.settle.settle(Err(TaskError::Timeout { timeout }));

        // The worker is wedged inside the task and cannot be interrupted;
        // abandon it and refill the slot. Its late events are stale.
        if let Some(worker) = self.workers.remove(&pending.worker) {
            self.idle.retain(|id| *id != pending.worker);
            self.bus
                .publish(Event::now(EventKind::WorkerAbandoned).with_worker(pending.worker));
            worker.detach();
        }
        self.replenish(timeouts);
    }

    // ---------------------------
    // Pool elasticity
    // ---------------------------

    /// Spawns workers until the pool satisfies its minimum and the queued
    /// demand, bounded by the maximum and by one in-flight spawn per
    /// outstanding queue entry.
    fn replenish(&mut self, timeouts: &mut DelayQueue<TimerEntry>) {
        if self.stop.is_some() || self.respawn_pending {
            return;
        }
        while self.needs_worker() {
            if !self.spawn_worker() {
                self.schedule_respawn(timeouts);
                break;
            }
        }
    }

    fn needs_worker(&self) -> bool {
        let live = self.live_count();
        live < self.cfg.pool_size_min
            || (live < self.cfg.pool_size_max && self.spawning_count() < self.queue.len())
    }

    fn spawn_worker(&mut self) -> bool {
        self.next_worker += 1;
        let id = self.next_worker;
        self.bus
            .publish(Event::now(EventKind::WorkerSpawning).with_worker(id));
        let ctx = WorkerContext {
            id,
            registry: Arc::clone(&self.registry),
            start_tasks: self.start_tasks.snapshot(),
            results: self.results_tx.clone(),
            flags: self.cfg.thread_flags,
        };
        match WorkerHandle::spawn(ctx) {
            Ok(handle) => {
                self.workers.insert(id, handle);
                true
            }
            Err(err) => {
                self.bus.publish(
                    Event::now(EventKind::WorkerStartFailed)
                        .with_worker(id)
                        .with_error(err.to_string()),
                );
                false
            }
        }
    }

    fn schedule_respawn(&mut self, timeouts: &mut DelayQueue<TimerEntry>) {
        if self.stop.is_some() || self.respawn_pending || !self.needs_worker() {
            return;
        }
        let delay = self.cfg.respawn_backoff.next(self.respawn_delay);
        self.respawn_delay = Some(delay);
        self.respawn_pending = true;
        timeouts.insert(TimerEntry::Respawn, delay);
        self.bus
            .publish(Event::now(EventKind::BackoffScheduled).with_delay(delay));
    }

    /// Retires workers idle past the threshold, least recently used first,
    /// while the pool stays at or above its minimum.
    fn idle_sweep(&mut self) {
        if self.stop.is_some() {
            return;
        }
        let threshold = self.cfg.idle_worker_timeout;
        while self.live_count() > self.cfg.pool_size_min {
            let Some(&lru) = self.idle.first() else { break };
            let expired = self
                .workers
                .get(&lru)
                .is_some_and(|w| w.idle_since.elapsed() >= threshold);
            if !expired {
                break;
            }
            self.idle.remove(0);
            if let Some(worker) = self.workers.get_mut(&lru) {
                worker.retire();
            }
            self.bus
                .publish(Event::now(EventKind::WorkerRetired).with_worker(lru));
        }
    }

    // ---------------------------
    // Shutdown
    // ---------------------------

    fn begin_stop(
        &mut self,
        force: bool,
        done: Option<oneshot::Sender<()>>,
        timeouts: &mut DelayQueue<TimerEntry>,
    ) {
        if self.stop.is_none() {
            self.bus.publish(Event::now(EventKind::ShutdownRequested));
            self.stop = Some(StopGate { acks: Vec::new() });
            self.respawn_pending = false;

            // Queued-but-unassigned work is cancelled; in-flight tasks keep
            // their deadlines and settle naturally (or time out).
            for entry in self.queue.drain(..) {
                self.bus
                    .publish(Event::now(EventKind::TaskCancelled).with_task(entry.id));
                entry.settle.settle(Err(TaskError::Shutdown));
            }

            let ids: Vec<WorkerId> = self.workers.keys().copied().collect();
            for id in ids {
                let state = self.workers.get(&id).map(|w| w.state);
                if matches!(state, Some(WorkerState::Idle | WorkerState::Spawning)) {
                    if let Some(worker) = self.workers.get_mut(&id) {
                        worker.retire();
                    }
                }
            }
            self.idle.clear();
        }

        if force {
            for (task_id, pending) in self.pending.drain() {
                self.bus
                    .publish(Event::now(EventKind::TaskCancelled).with_task(task_id));
                pending.settle.settle(Err(TaskError::Shutdown));
            }
            timeouts.clear();
            for (_, worker) in self.workers.drain() {
                worker.detach();
            }
            self.idle.clear();
        }

        if let Some(done) = done {
            if let Some(gate) = self.stop.as_mut() {
                gate.acks.push(done);
            }
        }
    }

    /// True once a stop has been requested and everything has drained.
    fn drained(&self) -> bool {
        self.stop.is_some() && self.pending.is_empty() && self.workers.is_empty()
    }

    // ---------------------------
    // Bookkeeping
    // ---------------------------

    fn mark_idle(&mut self, worker_id: WorkerId) {
        if let Some(worker) = self.workers.get_mut(&worker_id) {
            worker.state = WorkerState::Idle;
            worker.idle_since = std::time::Instant::now();
        }
        self.idle.push(worker_id);
    }

    fn live_count(&self) -> usize {
        self.workers
            .values()
            .filter(|w| w.state != WorkerState::Dying)
            .count()
    }

    fn spawning_count(&self) -> usize {
        self.workers
            .values()
            .filter(|w| w.state == WorkerState::Spawning)
            .count()
    }

    fn stats(&self) -> PoolStats {
        let mut stats = PoolStats::default();
        for worker in self.workers.values() {
            match worker.state {
                WorkerState::Spawning => stats.spawning_workers += 1,
                WorkerState::Idle => stats.idle_workers += 1,
                WorkerState::Busy => stats.busy_workers += 1,
                WorkerState::Dying => {}
            }
        }
        stats.live_workers = stats.spawning_workers + stats.idle_workers + stats.busy_workers;
        stats.queued = self.queue.len();
        stats.in_flight = self.pending.len();
        stats
    }
}
