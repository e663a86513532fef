//! Worker-owned endpoint lifecycle and task handoff

use parking_lot::Mutex;
use singlesock::dev_tracing::init_tracing;
use singlesock::{
    EndpointOptions, Error, InprocContext, InprocEndpoint, InprocWorker, SocketType, WorkerConfig,
    WorkerState,
};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

#[test]
fn test_spawn_then_stop_without_task() {
    init_tracing();
    let ctx = InprocContext::new();
    let mut worker = InprocWorker::spawn(&ctx, SocketType::Dealer, WorkerConfig::new()).unwrap();

    assert!(worker.wait_until_idle(WAIT));
    assert!(worker.is_idle());
    assert_ne!(worker.thread_id(), thread::current().id());
    assert_eq!(worker.name(), "singlesock-dealer-worker");

    worker.stop();
    worker.join().unwrap();
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(worker.tasks_completed(), 0);
    // Joining again is a no-op.
    worker.join().unwrap();
    assert_eq!(ctx.live_sockets(), 0);
}

#[test]
fn test_second_assignment_rejected() {
    let ctx = InprocContext::new();
    let worker = InprocWorker::spawn(&ctx, SocketType::Push, WorkerConfig::new()).unwrap();
    assert!(worker.wait_until_idle(WAIT));

    let (release_tx, release_rx) = mpsc::channel::<()>();
    worker
        .assign_task(move |_endpoint| {
            release_rx.recv().ok();
            Ok(())
        })
        .unwrap();

    match worker.assign_task(|_endpoint| Ok(())) {
        Err(Error::ThreadNotIdle(state)) => {
            assert!(matches!(state, WorkerState::Assigned | WorkerState::Running));
        }
        other => panic!("expected ThreadNotIdle, got {other:?}"),
    }
    assert!(!worker.is_idle());

    release_tx.send(()).unwrap();
    assert!(worker.wait_until_idle(WAIT));
    assert_eq!(worker.tasks_completed(), 1);
    worker.assign_task(|_endpoint| Ok(())).unwrap();
    assert!(worker.wait_until_idle(WAIT));
    assert_eq!(worker.tasks_completed(), 2);
}

#[test]
fn test_repeating_worker_serves_many_tasks() {
    let ctx = InprocContext::new();
    let mut pull = InprocEndpoint::open(&ctx, SocketType::Pull, EndpointOptions::default()).unwrap();
    pull.bind("inproc://w-jobs").unwrap();

    let mut worker = InprocWorker::spawn(
        &ctx,
        SocketType::Push,
        WorkerConfig::new()
            .with_name("pusher")
            .with_connect("inproc://w-jobs"),
    )
    .unwrap();

    for i in 0..5 {
        assert!(worker.wait_until_idle(WAIT));
        worker
            .assign_task(move |endpoint| {
                assert!(endpoint.is_owner_thread());
                endpoint.send_text(&[format!("job-{i}")])
            })
            .unwrap();
        assert_eq!(
            pull.receive_text(WAIT).unwrap(),
            Some(vec![format!("job-{i}")])
        );
    }

    assert!(worker.wait_until_idle(WAIT));
    assert_eq!(worker.tasks_completed(), 5);
    assert_eq!(worker.name(), "pusher");
    worker.stop();
    worker.join().unwrap();
}

#[test]
fn test_single_shot_worker_stops_after_task() {
    let ctx = InprocContext::new();
    let mut worker =
        InprocWorker::spawn(&ctx, SocketType::Pair, WorkerConfig::single_shot()).unwrap();
    assert!(worker.wait_until_idle(WAIT));

    worker.assign_task(|_endpoint| Ok(())).unwrap();
    worker.join().unwrap();
    assert_eq!(worker.state(), WorkerState::Stopped);
    assert_eq!(worker.tasks_completed(), 1);
    assert!(matches!(
        worker.assign_task(|_endpoint| Ok(())),
        Err(Error::ThreadNotIdle(WorkerState::Stopped))
    ));
}

#[test]
fn test_task_error_surfaces_at_join() {
    let ctx = InprocContext::new();
    let mut worker = InprocWorker::spawn(&ctx, SocketType::Req, WorkerConfig::new()).unwrap();
    assert!(worker.wait_until_idle(WAIT));

    // REQ cannot receive before sending: the task fails with a transport error.
    worker
        .assign_task(|endpoint| endpoint.receive(None).map(|_| ()))
        .unwrap();
    assert!(!worker.wait_until_idle(WAIT));

    let err = worker.join().unwrap_err();
    assert!(matches!(err, Error::Transport(_)), "unexpected error: {err:?}");
    assert_eq!(worker.state(), WorkerState::Stopped);
}

#[test]
fn test_task_panic_surfaces_at_join() {
    let ctx = InprocContext::new();
    let mut worker = InprocWorker::spawn(&ctx, SocketType::Pair, WorkerConfig::new()).unwrap();
    assert!(worker.wait_until_idle(WAIT));

    worker
        .assign_task(|_endpoint| panic!("teller dropped the cash box"))
        .unwrap();

    match worker.join() {
        Err(Error::WorkerPanicked(message)) => assert_eq!(message, "teller dropped the cash box"),
        other => panic!("expected WorkerPanicked, got {other:?}"),
    }
    assert_eq!(worker.state(), WorkerState::Stopped);
    // The endpoint was closed during unwinding.
    assert_eq!(ctx.live_sockets(), 0);
}

#[test]
fn test_startup_failure_surfaces_at_join() {
    let ctx = InprocContext::new();
    let mut worker = InprocWorker::spawn(
        &ctx,
        SocketType::Rep,
        WorkerConfig::new().with_bind("tcp://127.0.0.1:1"),
    )
    .unwrap();

    assert!(!worker.wait_until_idle(WAIT));
    assert!(matches!(worker.join(), Err(Error::Transport(_))));
}

#[test]
fn test_self_join_rejected() {
    let ctx = InprocContext::new();
    let worker = InprocWorker::spawn(&ctx, SocketType::Pair, WorkerConfig::new()).unwrap();
    assert!(worker.wait_until_idle(WAIT));

    let cell = Arc::new(Mutex::new(Some(worker)));
    let (result_tx, result_rx) = mpsc::channel();

    {
        let guard = cell.lock();
        let task_cell = Arc::clone(&cell);
        guard
            .as_ref()
            .unwrap()
            .assign_task(move |_endpoint| {
                let mut guard = task_cell.lock();
                let result = guard.as_mut().unwrap().join();
                result_tx.send(matches!(result, Err(Error::SelfJoin))).unwrap();
                Ok(())
            })
            .unwrap();
    }

    assert!(result_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    let mut worker = cell.lock().take().unwrap();
    worker.stop();
    worker.join().unwrap();
}

#[test]
fn test_stop_token_ends_polling_task() {
    let ctx = InprocContext::new();
    let mut worker = InprocWorker::spawn(
        &ctx,
        SocketType::Pull,
        WorkerConfig::new().with_bind("inproc://w-stoppable"),
    )
    .unwrap();
    assert!(worker.wait_until_idle(WAIT));

    let token = worker.stop_token();
    assert!(!token.is_stop_requested());
    worker
        .assign_task(move |endpoint| {
            while !token.is_stop_requested() {
                endpoint.receive(Some(Duration::from_millis(10)))?;
            }
            Ok(())
        })
        .unwrap();

    thread::sleep(Duration::from_millis(30));
    assert_eq!(worker.state(), WorkerState::Running);
    worker.stop();
    worker.join().unwrap();
    assert_eq!(worker.tasks_completed(), 1);
}

#[test]
fn test_context_termination_unblocks_task() {
    let ctx = InprocContext::new();
    let mut worker = InprocWorker::spawn(
        &ctx,
        SocketType::Pull,
        WorkerConfig::new().with_bind("inproc://w-blocked"),
    )
    .unwrap();
    assert!(worker.wait_until_idle(WAIT));

    worker
        .assign_task(|endpoint| endpoint.receive(None).map(|_| ()))
        .unwrap();
    thread::sleep(Duration::from_millis(30));
    ctx.terminate();

    let err = worker.join().unwrap_err();
    assert!(err.is_context_terminated());
}

#[test]
fn test_drop_stops_and_joins() {
    let ctx = InprocContext::new();
    let worker = InprocWorker::spawn(&ctx, SocketType::Dealer, WorkerConfig::new()).unwrap();
    assert!(worker.wait_until_idle(WAIT));
    drop(worker);
    assert_eq!(ctx.live_sockets(), 0);
}
