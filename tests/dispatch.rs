//! End-to-end dispatcher scenarios: submission, failure surfaces, crash
//! recovery, timeouts, parallelism, and worker recycling.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use taskpool::{
    Config, Dispatcher, EventKind, PoolOption, SubmitError, TaskError, TaskFn, TaskRef, Value,
    WorkerId,
};

/// Builds a dispatcher with the standard test callables registered.
fn dispatcher_with(cfg: Config) -> Dispatcher {
    let dispatcher = Dispatcher::new(cfg);

    dispatcher.register("strlen", |args| {
        let s = args
            .first()
            .and_then(Value::as_str)
            .ok_or("strlen: expected a string")?;
        Ok(Value::from(s.len()))
    });

    dispatcher.register("multiply", |args| {
        let a = args
            .first()
            .and_then(Value::as_i64)
            .ok_or("multiply: expected integers")?;
        let b = args
            .get(1)
            .and_then(Value::as_i64)
            .ok_or("multiply: expected integers")?;
        Ok(Value::from(a * b))
    });

    dispatcher.register("sleep", |args| {
        let secs = args
            .first()
            .and_then(Value::as_f64)
            .ok_or("sleep: expected seconds")?;
        std::thread::sleep(Duration::from_secs_f64(secs));
        Ok(Value::Null)
    });

    dispatcher
}

#[tokio::test]
async fn basic_call() {
    let dispatcher = dispatcher_with(Config::default());

    let promise = dispatcher
        .call("strlen", vec![Value::from("zanzibar!")])
        .unwrap();
    assert_eq!(promise.await.unwrap(), Value::from(9));

    dispatcher.stop().await;
}

#[tokio::test]
async fn user_failure_surfaces_as_task_error() {
    let dispatcher = dispatcher_with(Config::default());

    let failing: TaskRef = TaskFn::arc(|resolver| {
        resolver.reject("oh noes!!!");
    });
    let promise = dispatcher.execute(failing).unwrap();

    match promise.await {
        Err(TaskError::Failed { reason }) => assert_eq!(reason, "oh noes!!!"),
        other => panic!("unexpected outcome: {other:?}"),
    }

    dispatcher.stop().await;
}

#[tokio::test]
async fn unknown_callable_is_rejected_at_submit() {
    let dispatcher = dispatcher_with(Config::default());

    match dispatcher.call("no_such_fn", Vec::new()) {
        Err(SubmitError::UnknownCallable { name }) => assert_eq!(name, "no_such_fn"),
        other => panic!("unexpected result: {other:?}"),
    }

    dispatcher.stop().await;
}

#[tokio::test]
async fn crash_recovery_replaces_the_worker() {
    let mut cfg = Config::default();
    cfg.pool_size_max = 1;
    let dispatcher = dispatcher_with(cfg);
    let mut events = dispatcher.subscribe();

    let bomb: TaskRef = TaskFn::arc(|_| panic!("worker down"));
    let a = dispatcher.execute(bomb).unwrap();
    let b = dispatcher.call("multiply", vec![6.into(), 7.into()]).unwrap();

    match a.await {
        Err(TaskError::WorkerLost { reason }) => assert!(reason.contains("worker down")),
        other => panic!("unexpected outcome for A: {other:?}"),
    }
    assert_eq!(b.await.unwrap(), Value::from(42));

    // The crashed worker and its replacement are distinct.
    let mut crashed = None;
    let mut completed_on = None;
    while let Ok(ev) = events.try_recv() {
        match ev.kind {
            EventKind::WorkerCrashed => crashed = ev.worker,
            EventKind::TaskCompleted => completed_on = ev.worker,
            _ => {}
        }
    }
    assert!(crashed.is_some());
    assert!(completed_on.is_some());
    assert_ne!(crashed, completed_on);

    dispatcher.stop().await;
}

#[tokio::test]
async fn timeout_then_fifo_queue_drains_on_replacement() {
    let mut cfg = Config::default();
    cfg.pool_size_max = 1;
    cfg.task_timeout = Some(Duration::from_secs(2));
    let dispatcher = dispatcher_with(cfg);

    let started = Instant::now();
    let a = dispatcher.call("sleep", vec![60.into()]).unwrap();
    let b = dispatcher.call("multiply", vec![6.into(), 7.into()]).unwrap();

    match a.await {
        Err(TaskError::Timeout { timeout }) => assert_eq!(timeout, Duration::from_secs(2)),
        other => panic!("unexpected outcome for A: {other:?}"),
    }
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(1900) && elapsed < Duration::from_secs(4),
        "timeout fired at {elapsed:?}"
    );

    assert_eq!(b.await.unwrap(), Value::from(42));

    dispatcher.stop().await;
}

#[tokio::test]
async fn three_sleeps_run_in_parallel() {
    let mut cfg = Config::default();
    cfg.pool_size_max = 3;
    let dispatcher = dispatcher_with(cfg);

    let started = Instant::now();
    let promises: Vec<_> = (0..3)
        .map(|_| dispatcher.call("sleep", vec![1.into()]).unwrap())
        .collect();
    for promise in promises {
        promise.await.unwrap();
    }

    let elapsed = started.elapsed();
    assert!(
        elapsed < Duration::from_millis(2500),
        "three 1s sleeps took {elapsed:?}; pool did not parallelize"
    );

    dispatcher.stop().await;
}

#[tokio::test]
async fn exec_limit_recycles_the_worker() {
    let mut cfg = Config::default();
    cfg.pool_size_min = 1;
    cfg.pool_size_max = 1;
    cfg.exec_limit = Some(3);
    let dispatcher = dispatcher_with(cfg);
    let mut events = dispatcher.subscribe();

    let promises: Vec<_> = (0..10)
        .map(|n| {
            dispatcher
                .call("multiply", vec![Value::from(n), 2.into()])
                .unwrap()
        })
        .collect();
    for (n, promise) in promises.into_iter().enumerate() {
        assert_eq!(promise.await.unwrap(), Value::from(n as i64 * 2));
    }

    let mut recycled = 0;
    let mut completions: Vec<WorkerId> = Vec::new();
    while let Ok(ev) = events.try_recv() {
        match ev.kind {
            EventKind::WorkerRecycled => recycled += 1,
            EventKind::TaskCompleted => completions.push(ev.worker.unwrap()),
            _ => {}
        }
    }

    // 10 tasks at 3 per worker: three workers retire at quota, a fourth
    // finishes the tail.
    assert_eq!(recycled, 3, "expected 3 quota recycles");
    assert_eq!(completions.len(), 10);
    for window in completions.chunks(3) {
        let first = window[0];
        assert!(window.iter().all(|w| *w == first), "worker changed mid-quota");
    }
    let mut distinct = completions.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), 4, "expected 4 distinct workers: {completions:?}");

    dispatcher.stop().await;
}

#[tokio::test]
async fn stop_cancels_queued_tasks_but_finishes_in_flight() {
    let mut cfg = Config::default();
    cfg.pool_size_max = 1;
    let dispatcher = dispatcher_with(cfg);

    let running = dispatcher.call("sleep", vec![Value::from(0.3)]).unwrap();
    let queued = dispatcher.call("multiply", vec![2.into(), 2.into()]).unwrap();

    // Let the first task reach a worker before stopping.
    tokio::time::sleep(Duration::from_millis(100)).await;
    dispatcher.stop().await;

    assert_eq!(running.await.unwrap(), Value::Null);
    assert!(matches!(queued.await, Err(TaskError::Shutdown)));

    // Submissions after stop are rejected.
    assert!(matches!(
        dispatcher.call("multiply", vec![1.into(), 1.into()]),
        Err(SubmitError::Stopped)
    ));
}

#[tokio::test]
async fn stop_now_abandons_in_flight_tasks() {
    let mut cfg = Config::default();
    cfg.pool_size_max = 1;
    let dispatcher = dispatcher_with(cfg);

    let stuck = dispatcher.call("sleep", vec![60.into()]).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    dispatcher.stop_now().await;
    assert!(started.elapsed() < Duration::from_secs(1));

    assert!(matches!(stuck.await, Err(TaskError::Shutdown)));
}

#[tokio::test]
async fn start_tasks_run_once_per_spawn_and_adds_are_idempotent() {
    let mut cfg = Config::default();
    cfg.pool_size_min = 0;
    cfg.pool_size_max = 1;
    let dispatcher = dispatcher_with(cfg);

    let runs = Arc::new(AtomicU64::new(0));
    let counter = runs.clone();
    let start: TaskRef = TaskFn::arc(move |resolver| {
        counter.fetch_add(1, Ordering::SeqCst);
        resolver.resolve(Value::Null);
    });

    // Same object added twice: identity membership keeps one entry.
    dispatcher.add_start_task(start.clone());
    dispatcher.add_start_task(start.clone());

    let first = dispatcher.call("multiply", vec![3.into(), 3.into()]).unwrap();
    assert_eq!(first.await.unwrap(), Value::from(9));
    assert_eq!(runs.load(Ordering::SeqCst), 1, "start task ran once per spawn");

    dispatcher.remove_start_task(start.clone());
    dispatcher.remove_start_task(start);

    dispatcher.stop().await;
}

#[tokio::test]
async fn resolver_sees_context_flags() {
    let mut cfg = Config::default();
    cfg.thread_flags = 0xBEEF;
    let dispatcher = dispatcher_with(cfg);

    let probe: TaskRef = TaskFn::arc(|resolver| {
        let flags = resolver.context_flags();
        resolver.resolve(Value::from(flags));
    });
    let promise = dispatcher.execute(probe).unwrap();
    assert_eq!(promise.await.unwrap(), Value::from(0xBEEFu64));

    dispatcher.stop().await;
}

#[tokio::test]
async fn set_option_returns_prior_and_validates() {
    let dispatcher = dispatcher_with(Config::default());

    let prior = dispatcher
        .set_option(PoolOption::PoolSizeMax(4))
        .await
        .unwrap();
    assert_eq!(prior, PoolOption::PoolSizeMax(8));

    // MIN above MAX is refused and leaves the config untouched.
    assert!(dispatcher
        .set_option(PoolOption::PoolSizeMin(5))
        .await
        .is_err());
    let prior = dispatcher
        .set_option(PoolOption::PoolSizeMin(2))
        .await
        .unwrap();
    assert_eq!(prior, PoolOption::PoolSizeMin(1));

    dispatcher.stop().await;
}

#[tokio::test]
async fn raising_pool_min_spawns_workers() {
    let mut cfg = Config::default();
    cfg.pool_size_min = 1;
    let dispatcher = dispatcher_with(cfg);

    dispatcher
        .set_option(PoolOption::PoolSizeMin(3))
        .await
        .unwrap();

    // Spawns are immediate; readiness follows within a few ms.
    tokio::time::sleep(Duration::from_millis(300)).await;
    let stats = dispatcher.snapshot().await;
    assert!(
        stats.live_workers >= 3,
        "pool did not grow to the new minimum: {stats:?}"
    );

    dispatcher.stop().await;
}

#[tokio::test]
async fn queue_is_strict_fifo_per_worker() {
    let mut cfg = Config::default();
    cfg.pool_size_max = 1;
    let dispatcher = dispatcher_with(cfg);

    let order = Arc::new(std::sync::Mutex::new(Vec::new()));
    let promises: Vec<_> = (0..5)
        .map(|n| {
            let order = order.clone();
            let task: TaskRef = TaskFn::arc(move |resolver| {
                order.lock().unwrap().push(n);
                resolver.resolve(Value::from(n));
            });
            dispatcher.execute(task).unwrap()
        })
        .collect();
    for promise in promises {
        promise.await.unwrap();
    }

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);

    dispatcher.stop().await;
}

#[tokio::test]
async fn failing_start_task_taints_only_the_worker() {
    let mut cfg = Config::default();
    cfg.pool_size_min = 0;
    cfg.pool_size_max = 1;
    let dispatcher = dispatcher_with(cfg);
    let mut events = dispatcher.subscribe();

    let armed = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let trigger = armed.clone();
    let flaky: TaskRef = TaskFn::arc(move |resolver| {
        if trigger.swap(false, Ordering::SeqCst) {
            resolver.reject("bad init");
        } else {
            resolver.resolve(Value::Null);
        }
    });
    dispatcher.add_start_task(flaky);

    // First spawn fails its start task; the backoff respawn succeeds and
    // the submission still settles.
    let promise = dispatcher.call("multiply", vec![7.into(), 6.into()]).unwrap();
    assert_eq!(promise.await.unwrap(), Value::from(42));

    let mut saw_start_failure = false;
    while let Ok(ev) = events.try_recv() {
        if ev.kind == EventKind::WorkerStartFailed {
            saw_start_failure = true;
        }
    }
    assert!(saw_start_failure);

    dispatcher.stop().await;
}
