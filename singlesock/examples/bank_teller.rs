//! Bank and customers over the in-process transport
//!
//! A bank runs a REP endpoint on a worker thread; two customers each open a
//! REQ endpoint on their own thread and make deposits. Every endpoint is only
//! touched by the thread that opened it.
//!
//! # Features Demonstrated
//!
//! - Worker-owned endpoint with a long-running task
//! - Stopping the task through its stop token
//! - Thread-owned endpoints sharing one context
//!
//! # Run
//!
//! ```sh
//! cargo run --example bank_teller
//! ```

use singlesock::dev_tracing::init_tracing;
use singlesock::{EndpointOptions, InprocContext, InprocEndpoint, InprocWorker, SocketType, WorkerConfig};
use std::thread;
use std::time::Duration;

const BANK: &str = "SwissBankers";
const DEPOSITS: usize = 5;

fn customer(ctx: InprocContext, name: &'static str) -> singlesock::Result<()> {
    let mut teller = InprocEndpoint::open(&ctx, SocketType::Req, EndpointOptions::default())?;
    teller.connect(&format!("inproc://bank-{}", BANK))?;

    for _ in 0..DEPOSITS {
        teller.send_text(&[name, "put", "12.34"])?;
        let reply = teller.receive_text(None)?.unwrap_or_default();
        println!("   [{}] received: |{}|", name, reply.join("|"));
        thread::sleep(Duration::from_millis(100));
    }
    teller.close()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    println!("=== Bank Teller Demo ===\n");

    let ctx = InprocContext::new();

    // 1. Open the bank on its own thread
    println!("1. Opening the bank...");
    let mut bank = InprocWorker::spawn(
        &ctx,
        SocketType::Rep,
        WorkerConfig::single_shot()
            .with_name("bank")
            .with_bind(format!("inproc://bank-{}", BANK)),
    )?;
    if !bank.wait_until_idle(Some(Duration::from_secs(5))) {
        bank.join()?;
        return Err("bank failed to open".into());
    }
    println!("   ✓ Doors open\n");

    // 2. Serve requests until the doors close
    let doors_open = bank.stop_token();
    bank.assign_task(move |socket| {
        let mut served = 0;
        while !doors_open.is_stop_requested() {
            let Some(lines) = socket.receive_text(Some(Duration::from_millis(500)))? else {
                continue;
            };
            println!("   [{}] received: |{}|", BANK, lines.join("|"));
            let customer = lines.first().cloned().unwrap_or_default();
            socket.send_text(&["OK", customer.as_str()])?;
            served += 1;
        }
        println!("   [{}] closing after {} requests", BANK, served);
        Ok(())
    })?;

    // 3. Customers act concurrently
    println!("2. Customers arriving...");
    let alice = {
        let ctx = ctx.clone();
        thread::spawn(move || customer(ctx, "Alice"))
    };
    let bob = {
        let ctx = ctx.clone();
        thread::spawn(move || customer(ctx, "Bob"))
    };

    alice.join().map_err(|_| "Alice panicked")??;
    bob.join().map_err(|_| "Bob panicked")??;
    println!("\n3. Customers done, closing doors...");

    // 4. Stop the bank and wait for its thread
    bank.stop();
    bank.join()?;
    println!("   ✓ Bank closed ({} task)\n", bank.tasks_completed());

    println!("=== happy ending ===");
    Ok(())
}
