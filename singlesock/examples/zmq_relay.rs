//! Request/reply relay over TCP through libzmq
//!
//! A steerable proxy relays REQ clients on one TCP port to a REP worker on
//! another. The main thread sends TERMINATE on the control endpoint once the
//! clients are done, and the proxy reports its statistics.
//!
//! # Features Demonstrated
//!
//! - `ZmqOwnedEndpoint` over `tcp://`
//! - Worker-owned REP endpoint behind a ROUTER/DEALER proxy
//! - Proxy control commands (STATISTICS, TERMINATE)
//!
//! # Run
//!
//! ```sh
//! cargo run --example zmq_relay --features zmq
//! ```

use singlesock::dev_tracing::init_tracing;
use singlesock::{
    EndpointOptions, Proxy, ProxyStats, SocketType, WorkerConfig, WorkerOwnedEndpoint, ZmqEndpoint,
    ZmqOwnedEndpoint,
};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const FRONTEND: &str = "tcp://127.0.0.1:5559";
const BACKEND: &str = "tcp://127.0.0.1:5560";
const CONTROL: &str = "inproc://relay-control";
const REQUESTS: usize = 3;

fn open(ctx: &zmq::Context, kind: SocketType) -> singlesock::Result<ZmqOwnedEndpoint> {
    ZmqOwnedEndpoint::open(ctx, kind, EndpointOptions::default())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    println!("=== ZMQ Relay Demo ===\n");

    let ctx = zmq::Context::new();

    // 1. Start the proxy
    println!("1. Starting proxy {} -> {}...", FRONTEND, BACKEND);
    let (ready_tx, ready_rx) = mpsc::channel();
    let proxy_ctx = ctx.clone();
    let broker = thread::spawn(move || -> singlesock::Result<ProxyStats> {
        let mut frontend = open(&proxy_ctx, SocketType::Router)?;
        frontend.bind(FRONTEND)?;
        let mut backend = open(&proxy_ctx, SocketType::Dealer)?;
        backend.bind(BACKEND)?;
        let mut control = open(&proxy_ctx, SocketType::Rep)?;
        control.bind(CONTROL)?;
        ready_tx.send(()).ok();
        Proxy::new(&mut frontend, &mut backend)
            .with_control(&mut control)
            .run()
    });
    ready_rx.recv()?;
    println!("   ✓ Proxy running\n");

    // 2. Worker behind the proxy
    println!("2. Starting REP worker...");
    let mut worker = WorkerOwnedEndpoint::<ZmqEndpoint>::spawn(
        &ctx,
        SocketType::Rep,
        WorkerConfig::single_shot()
            .with_name("echo-worker")
            .with_connect(BACKEND),
    )?;
    if !worker.wait_until_idle(Some(Duration::from_secs(5))) {
        worker.join()?;
        return Err("worker failed to start".into());
    }
    worker.assign_task(|socket| {
        for _ in 0..REQUESTS {
            let Some(request) = socket.receive_text(None)? else {
                break;
            };
            println!("   [worker] received: {:?}", request);
            socket.send_text(&["World"])?;
        }
        Ok(())
    })?;
    println!("   ✓ Worker ready\n");

    // 3. Client requests
    println!("3. Sending {} requests...", REQUESTS);
    let mut client = open(&ctx, SocketType::Req)?;
    client.connect(FRONTEND)?;
    for i in 0..REQUESTS {
        client.send_text(&[format!("Hello {}", i)])?;
        let reply = client.receive_text(Some(Duration::from_secs(5)))?;
        println!("   [client] reply #{}: {:?}", i, reply);
    }
    client.close()?;
    worker.join()?;
    println!();

    // 4. Inspect and stop the proxy
    println!("4. Stopping proxy...");
    let mut control = open(&ctx, SocketType::Req)?;
    control.connect(CONTROL)?;
    control.send_text(&["STATISTICS"])?;
    if let Some(reply) = control.receive(Some(Duration::from_secs(5)))? {
        println!("   statistics: {:?}", ProxyStats::from_message(&reply));
    }
    control.send_text(&["TERMINATE"])?;
    control.receive(Some(Duration::from_secs(5)))?;
    control.close()?;

    let stats = broker.join().map_err(|_| "proxy panicked")??;
    println!(
        "   ✓ Proxy stopped: {} requests in, {} replies out",
        stats.frontend_messages_in, stats.frontend_messages_out
    );
    Ok(())
}
