//! Connects to a WebSocket echo endpoint, relays lines from stdin as
//! messages, and prints whatever comes back. Exercises `WsConnection`'s
//! connect/send/receive/close surface end to end, the way mio's own
//! `tcp_server.rs` exercises `mio::Poll` end to end.

use std::io::{self, BufRead, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use url::Url;

use prx_core::rt_support::{Scheduler, SystemClock};
use prx_core::ws_worker_pool::WorkerPool;
use prx_core::{ConnectFlags, ProxySettings, Status, WsConnection};

#[derive(Parser)]
#[clap(name = "echo_client", version, about = "Sends stdin lines over a ws-connection tunnel and prints the echoes")]
struct Cli {
    /// Target WebSocket URL, e.g. ws://127.0.0.1:9001
    url: String,

    /// Force TLS even for a ws:// URL.
    #[clap(long)]
    force_secure: bool,
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Cli::parse();
    if let Err(e) = run(args) {
        eprintln!("echo_client: {e}");
        std::process::exit(1);
    }
}

fn run(args: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let address = Url::parse(&args.url)?;
    let clock = Arc::new(SystemClock::new());
    let scheduler = Scheduler::new(clock.clone());
    let pool = Arc::new(WorkerPool::new(2)?);

    let flags = if args.force_secure { ConnectFlags::FORCE_SECURE } else { ConnectFlags::NONE };

    let conn = WsConnection::create(
        address,
        None,
        None,
        flags,
        ProxySettings::default(),
        scheduler.clone(),
        clock,
        pool,
        None,
        Arc::new(|stream: &mut prx_core::ws_stream::InboundStream| {
            let mut buf = vec![0u8; stream.readable()];
            stream.read(&mut buf);
            let mut stdout = io::stdout();
            let _ = stdout.write_all(b"< ");
            let _ = stdout.write_all(&buf);
            let _ = stdout.write_all(b"\n");
            let _ = stdout.flush();
            Ok(())
        }),
    );

    let worker = scheduler.spawn_worker();
    let keep_going = Arc::new(AtomicBool::new(true));
    let retry_gate = keep_going.clone();
    conn.connect(move |_last_error| retry_gate.load(Ordering::SeqCst));

    println!("connecting to {} — type a line and press enter to send, Ctrl-D to quit", args.url);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if conn.status() != Status::Connected {
            eprintln!("(not connected yet, dropping: {line})");
            continue;
        }
        let payload = line.into_bytes();
        conn.send(
            move |stream| stream.write(&payload),
            |code| tracing::debug!(?code, "send completed"),
        );
    }

    keep_going.store(false, Ordering::SeqCst);
    conn.close();
    scheduler.stop();
    let _ = worker.join();
    Ok(())
}
