//! Ownership layer, workers and proxy over libzmq TCP endpoints
//!
//! Requires the `zmq` feature.

use singlesock::dev_tracing::init_tracing;
use singlesock::{
    EndpointOptions, Error, Proxy, SocketType, WorkerConfig, WorkerOwnedEndpoint, ZmqEndpoint,
    ZmqOwnedEndpoint,
};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

fn tcp_address() -> String {
    let port = portpicker::pick_unused_port().expect("no free port");
    format!("tcp://127.0.0.1:{}", port)
}

fn open(ctx: &zmq::Context, kind: SocketType) -> ZmqOwnedEndpoint {
    ZmqOwnedEndpoint::open(ctx, kind, EndpointOptions::default()).unwrap()
}

#[test]
fn test_req_rep_over_tcp() {
    init_tracing();
    let ctx = zmq::Context::new();
    let address = tcp_address();

    let mut server = open(&ctx, SocketType::Rep);
    server.bind(&address).unwrap();
    let mut client = open(&ctx, SocketType::Req);
    client.connect(&address).unwrap();

    client.send_text(&["Alice", "put", "12.34"]).unwrap();
    let request = server.receive_text(WAIT).unwrap().unwrap();
    assert_eq!(request, vec!["Alice", "put", "12.34"]);
    server.send_text(&["OK", "Alice"]).unwrap();
    assert_eq!(
        client.receive_text(WAIT).unwrap(),
        Some(vec!["OK".to_string(), "Alice".to_string()])
    );

    // REQ must not send twice without a reply in between.
    client.send_text(&["again"]).unwrap();
    assert!(matches!(client.send_text(&["twice"]), Err(Error::Transport(_))));
}

#[test]
fn test_foreign_thread_rejected() {
    let ctx = zmq::Context::new();
    let (tx, rx) = mpsc::channel();
    let thread_ctx = ctx.clone();
    thread::spawn(move || {
        tx.send(open(&thread_ctx, SocketType::Pair)).unwrap();
    })
    .join()
    .unwrap();

    let mut endpoint = rx.recv().unwrap();
    assert!(endpoint.send_text(&["x"]).unwrap_err().is_ownership_violation());
    assert!(endpoint.close().unwrap_err().is_ownership_violation());
}

#[test]
fn test_worker_behind_proxy_over_tcp() {
    let ctx = zmq::Context::new();
    let front = tcp_address();
    let back = tcp_address();
    let control_address = "inproc://zmq-test-control";

    let (ready_tx, ready_rx) = mpsc::channel();
    let broker = {
        let ctx = ctx.clone();
        let (front, back) = (front.clone(), back.clone());
        thread::spawn(move || {
            let mut frontend = open(&ctx, SocketType::Router);
            frontend.bind(&front)?;
            let mut backend = open(&ctx, SocketType::Dealer);
            backend.bind(&back)?;
            let mut control = open(&ctx, SocketType::Rep);
            control.bind(control_address)?;
            ready_tx.send(()).ok();
            Proxy::new(&mut frontend, &mut backend)
                .with_control(&mut control)
                .run()
        })
    };
    ready_rx.recv().unwrap();

    let mut worker = WorkerOwnedEndpoint::<ZmqEndpoint>::spawn(
        &ctx,
        SocketType::Rep,
        WorkerConfig::single_shot().with_connect(back),
    )
    .unwrap();
    assert!(worker.wait_until_idle(WAIT));
    worker
        .assign_task(|endpoint| {
            let request = endpoint.receive_text(None)?.unwrap_or_default();
            endpoint.send_text(&[format!("echo {}", request.join(" "))])
        })
        .unwrap();

    let mut client = open(&ctx, SocketType::Req);
    client.connect(&front).unwrap();
    client.send_text(&["ping"]).unwrap();
    assert_eq!(
        client.receive_text(WAIT).unwrap(),
        Some(vec!["echo ping".to_string()])
    );
    worker.join().unwrap();

    let mut control = open(&ctx, SocketType::Req);
    control.connect(control_address).unwrap();
    control.send_text(&["TERMINATE"]).unwrap();
    assert_eq!(
        control.receive_text(WAIT).unwrap(),
        Some(vec!["TERMINATE".to_string()])
    );

    let stats = broker.join().unwrap().unwrap();
    assert_eq!(stats.frontend_messages_in, 1);
    assert_eq!(stats.frontend_messages_out, 1);
}
