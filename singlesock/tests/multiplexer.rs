//! Readiness multiplexing over several owned endpoints

use singlesock::dev_tracing::init_tracing;
use singlesock::{
    wait_for_any, EndpointOptions, Error, InprocContext, InprocEndpoint, Multiplexer, SocketType,
};
use std::thread;
use std::time::{Duration, Instant};

fn open(ctx: &InprocContext, kind: SocketType) -> InprocEndpoint {
    InprocEndpoint::open(ctx, kind, EndpointOptions::default()).unwrap()
}

#[test]
fn test_returns_only_ready_endpoint() {
    init_tracing();
    let ctx = InprocContext::new();
    let mut first = open(&ctx, SocketType::Pull);
    let mut second = open(&ctx, SocketType::Pull);
    let mut third = open(&ctx, SocketType::Pull);
    first.bind("inproc://m-first").unwrap();
    second.bind("inproc://m-second").unwrap();
    third.bind("inproc://m-third").unwrap();

    let mut push = open(&ctx, SocketType::Push);
    push.connect("inproc://m-third").unwrap();
    push.send_text(&["only third"]).unwrap();

    let index = wait_for_any(&mut [&mut first, &mut second, &mut third]).unwrap();
    assert_eq!(index, 2);
    assert_eq!(
        third.receive_text(Some(Duration::ZERO)).unwrap(),
        Some(vec!["only third".to_string()])
    );
}

#[test]
fn test_blocks_until_delayed_sender() {
    let ctx = InprocContext::new();
    let mut idle = open(&ctx, SocketType::Pull);
    let mut busy = open(&ctx, SocketType::Pull);
    idle.bind("inproc://m-idle").unwrap();
    busy.bind("inproc://m-busy").unwrap();

    let sender_ctx = ctx.clone();
    let sender = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        let mut push = open(&sender_ctx, SocketType::Push);
        push.connect("inproc://m-busy").unwrap();
        push.send_text(&["late"]).unwrap();
        push
    });

    let started = Instant::now();
    let mut mux = Multiplexer::new();
    let index = mux.wait_for_any(&mut [&mut idle, &mut busy]).unwrap();
    assert_eq!(index, 1);
    assert!(started.elapsed() >= Duration::from_millis(90));
    assert_eq!(busy.receive_text(None).unwrap(), Some(vec!["late".to_string()]));
    drop(sender.join().unwrap());
}

#[test]
fn test_foreign_endpoint_in_wait_set() {
    let ctx = InprocContext::new();
    let foreign_ctx = ctx.clone();
    let mut foreign = thread::spawn(move || open(&foreign_ctx, SocketType::Pull))
        .join()
        .unwrap();
    let mut local = open(&ctx, SocketType::Pull);

    let err = wait_for_any(&mut [&mut local, &mut foreign]).unwrap_err();
    assert!(matches!(err, Error::OwnershipViolation { operation: "wait_for_any", .. }));
}

#[test]
fn test_poll_timeout_and_termination() {
    let ctx = InprocContext::new();
    let mut a = open(&ctx, SocketType::Pull);
    a.bind("inproc://m-term").unwrap();
    let mut mux = Multiplexer::new();

    assert_eq!(mux.poll(&mut [&mut a], Some(Duration::from_millis(10))).unwrap(), None);

    let terminator = {
        let ctx = ctx.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            ctx.terminate();
        })
    };
    let err = mux.wait_for_any(&mut [&mut a]).unwrap_err();
    assert!(err.is_context_terminated());
    terminator.join().unwrap();
}
