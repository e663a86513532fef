//! Publish/subscribe relay with worker-owned subscribers

use singlesock::{
    EndpointOptions, InprocContext, InprocEndpoint, InprocWorker, SocketType, WorkerConfig,
};
use std::sync::mpsc;
use std::time::Duration;

const WAIT: Option<Duration> = Some(Duration::from_secs(5));

#[test]
fn test_chat_channels() {
    let ctx = InprocContext::new();
    let mut publisher =
        InprocEndpoint::open(&ctx, SocketType::Pub, EndpointOptions::default()).unwrap();
    publisher.bind("inproc://chat").unwrap();

    let (lines_tx, lines_rx) = mpsc::channel();
    let mut listener = InprocWorker::spawn(
        &ctx,
        SocketType::Sub,
        WorkerConfig::single_shot()
            .with_name("main-channel-listener")
            .with_options(EndpointOptions::default().with_subscription(&b"mainChannel"[..]))
            .with_connect("inproc://chat"),
    )
    .unwrap();
    assert!(listener.wait_until_idle(WAIT));

    listener
        .assign_task(move |endpoint| {
            for _ in 0..2 {
                let Some(frames) = endpoint.receive_text(WAIT)? else {
                    break;
                };
                lines_tx.send(frames).ok();
            }
            Ok(())
        })
        .unwrap();

    publisher.send_text(&["sideChannel", "eve", "psst"]).unwrap();
    publisher.send_text(&["mainChannel", "fooBar", "hello all"]).unwrap();
    publisher.send_text(&["mainChannel", "alice", "hi foo"]).unwrap();

    let first = lines_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    let second = lines_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert_eq!(first, vec!["mainChannel", "fooBar", "hello all"]);
    assert_eq!(second, vec!["mainChannel", "alice", "hi foo"]);
    listener.join().unwrap();
}

#[test]
fn test_subscribe_after_open() {
    let ctx = InprocContext::new();
    let mut publisher =
        InprocEndpoint::open(&ctx, SocketType::Pub, EndpointOptions::default()).unwrap();
    publisher.bind("inproc://ticker").unwrap();
    let mut sub = InprocEndpoint::open(&ctx, SocketType::Sub, EndpointOptions::default()).unwrap();
    sub.connect("inproc://ticker").unwrap();

    // No filter yet: nothing is delivered.
    publisher.send_text(&["AAPL 1"]).unwrap();
    assert_eq!(sub.receive(Some(Duration::from_millis(20))).unwrap(), None);

    sub.subscribe("AAPL").unwrap();
    publisher.send_text(&["MSFT 2"]).unwrap();
    publisher.send_text(&["AAPL 3"]).unwrap();
    assert_eq!(sub.receive_text(WAIT).unwrap(), Some(vec!["AAPL 3".to_string()]));

    // Publishers cannot receive, subscribers cannot send.
    assert!(publisher.receive(Some(Duration::ZERO)).is_err());
    assert!(sub.send_text(&["nope"]).is_err());
}
