//! Pointing a connection at an address nothing listens on should produce
//! reconnect attempts spaced by doubling back-off, starting at ~1s, not at
//! every attempt being immediate or every attempt waiting the same fixed delay.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use url::Url;

use rt_support::{Scheduler, SystemClock};
use ws_connection::{ConnectFlags, ProxySettings, WsConnection};
use ws_worker_pool::WorkerPool;

#[test]
fn reconnect_attempts_space_out_with_growing_backoff() {
    let clock = Arc::new(SystemClock::new());
    let scheduler = Scheduler::new(clock.clone());
    let pool = Arc::new(WorkerPool::new(1).expect("worker pool"));

    let conn = WsConnection::create(
        Url::parse("ws://127.0.0.1:1").unwrap(),
        None,
        None,
        ConnectFlags::NONE,
        ProxySettings::default(),
        scheduler.clone(),
        clock,
        pool,
        None,
        Arc::new(|_stream| Ok(())),
    );

    let worker = scheduler.spawn_worker();
    let timestamps = Arc::new(Mutex::new(Vec::<Instant>::new()));
    let attempts = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let recorder = timestamps.clone();
    let counter = attempts.clone();
    conn.connect(move |_last_error| {
        recorder.lock().unwrap().push(Instant::now());
        counter.fetch_add(1, Ordering::SeqCst) < 2
    });

    // First attempt is immediate; the next two are spaced 1s then 2s apart.
    // Generous upper bound for scheduling jitter on a loaded CI box.
    let deadline = start + Duration::from_secs(8);
    while attempts.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }

    conn.close();
    scheduler.stop();
    let _ = worker.join();

    let seen = timestamps.lock().unwrap();
    assert_eq!(seen.len(), 3, "expected exactly 3 reconnect decisions before giving up");

    let gap_1 = seen[1].duration_since(seen[0]);
    let gap_2 = seen[2].duration_since(seen[1]);
    assert!(gap_1 >= Duration::from_millis(800), "first back-off should be ~1s, was {gap_1:?}");
    assert!(gap_2 >= Duration::from_millis(1700), "second back-off should be ~2s, was {gap_2:?}");
    assert!(gap_2 > gap_1, "back-off must grow between attempts");
}
