//! Exercises the scheduler through its public surface only: `drive_once`
//! is private, so (unlike the unit tests beside the code, which use a
//! `ManualClock`) this drives a real worker thread against a real clock and
//! observes ordering/cancellation the way a `ws-connection` actually would.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rt_support::{HandleMap, Scheduler, SystemClock, TaskTag};

#[test]
fn worker_thread_runs_due_tasks_in_order_and_honors_delay() {
    let scheduler = Scheduler::new(Arc::new(SystemClock::new()));
    let worker = scheduler.spawn_worker();

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let immediate = order.clone();
    scheduler.do_next(TaskTag::Connect, move || immediate.lock().unwrap().push("immediate"));

    let delayed = order.clone();
    scheduler.do_later(Duration::from_millis(50), TaskTag::Reconnect, move || {
        delayed.lock().unwrap().push("delayed")
    });

    std::thread::sleep(Duration::from_millis(10));
    assert_eq!(*order.lock().unwrap(), vec!["immediate"], "delayed task must not have fired yet");

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(*order.lock().unwrap(), vec!["immediate", "delayed"]);

    scheduler.stop();
    worker.join().unwrap();
}

#[test]
fn clearing_a_tag_before_it_fires_cancels_only_that_task() {
    let scheduler = Scheduler::new(Arc::new(SystemClock::new()));
    let worker = scheduler.spawn_worker();

    let fired = Arc::new(AtomicU32::new(0));
    let cancelled = fired.clone();
    let survives = fired.clone();

    scheduler.do_later(Duration::from_millis(50), TaskTag::TokenExpiry, move || {
        cancelled.fetch_add(1, Ordering::SeqCst);
    });
    scheduler.do_later(Duration::from_millis(50), TaskTag::Reconnect, move || {
        survives.fetch_add(10, Ordering::SeqCst);
    });

    scheduler.clear(TaskTag::TokenExpiry);
    std::thread::sleep(Duration::from_millis(150));

    assert_eq!(fired.load(Ordering::SeqCst), 10, "only the uncancelled task should have run");

    scheduler.stop();
    worker.join().unwrap();
}

#[test]
fn handle_map_slots_are_shared_safely_across_threads() {
    let map: Arc<HandleMap<u32>> = Arc::new(HandleMap::new());
    let handles: Vec<u32> = (0..50).map(|i| map.insert(i)).collect();

    let threads: Vec<_> = handles
        .iter()
        .copied()
        .map(|h| {
            let map = map.clone();
            std::thread::spawn(move || map.get(h))
        })
        .collect();

    for (i, t) in threads.into_iter().enumerate() {
        assert_eq!(t.join().unwrap(), Some(i as u32));
    }
    assert_eq!(map.len(), 50);
}
