//! Points a `WsConnection` at an address nothing is listening on and watches
//! it reconnect with exponentially growing back-off, stopping itself after a
//! fixed number of failed attempts. Exercises the reconnect/back-off state
//! machine without needing a real server.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use url::Url;

use prx_core::prx_error::PrxErrorKind;
use prx_core::rt_support::{Scheduler, SystemClock};
use prx_core::ws_worker_pool::WorkerPool;
use prx_core::{ConnectFlags, ProxySettings, WsConnection};

#[derive(Parser)]
#[clap(name = "reconnect_backoff", version, about = "Demonstrates ws-connection's reconnect back-off against an unreachable address")]
struct Cli {
    /// Address nothing is listening on, e.g. ws://127.0.0.1:1
    #[clap(default_value = "ws://127.0.0.1:1")]
    url: String,

    /// Stop after this many failed connect attempts.
    #[clap(long, default_value_t = 4)]
    attempts: u32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();
    let args = Cli::parse();
    let address = Url::parse(&args.url)?;

    let clock = Arc::new(SystemClock::new());
    let scheduler = Scheduler::new(clock.clone());
    let pool = Arc::new(WorkerPool::new(1)?);

    let conn = WsConnection::create(
        address,
        None,
        None,
        ConnectFlags::NONE,
        ProxySettings::default(),
        scheduler.clone(),
        clock,
        pool,
        None,
        Arc::new(|_stream: &mut prx_core::ws_stream::InboundStream| Ok(())),
    );

    let worker = scheduler.spawn_worker();
    let seen = Arc::new(AtomicU32::new(0));
    let counter = seen.clone();
    let max = args.attempts;
    conn.connect(move |last_error: Option<PrxErrorKind>| {
        let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(attempt = n, ?last_error, "reconnect decision");
        n < max
    });

    // Back-off grows 1s, 2s, 4s, ...; give the requested number of attempts
    // generous headroom to play out before giving up on waiting for them.
    let deadline = std::time::Instant::now() + Duration::from_secs(2u64.pow(args.attempts.min(10)) + 5);
    while seen.load(Ordering::SeqCst) < args.attempts && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }

    conn.close();
    scheduler.stop();
    let _ = worker.join();
    println!("stopped after {} attempts", seen.load(Ordering::SeqCst));
    Ok(())
}
