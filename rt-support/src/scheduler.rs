//! A single-threaded cooperative task scheduler, one instance owned per
//! `ws-connection` . All state mutation for a connection happens
//! while a task from *its* scheduler is executing, so the connection itself
//! needs no internal locking.
//!
//! Tasks are `FnOnce` closures queued for a dedicated worker thread rather
//! than raw function-pointer/context pairs; callers never touch the
//! connection's internals from another thread.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::clock::Clock;

/// Identifies the *kind* of pending task, so callers can cancel a whole
/// class of work without needing an equality-comparable closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskTag {
    Connect,
    Reconnect,
    TokenExpiry,
    DeliverSend,
    DeliverRecv,
    Disconnect,
    Other(u32),
}

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Scheduled {
    due: Duration,
    seq: u64,
    tag: TaskTag,
    job: Option<Job>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}
impl Eq for Scheduled {}
impl Ord for Scheduled {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Reverse so `BinaryHeap` (a max-heap) pops the earliest due time.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
    stopped: bool,
}

/// Owns the pending-task queue for one connection. `Scheduler` itself does
/// not run tasks; [`Scheduler::spawn_worker`] starts the dedicated thread
/// that drains it, honoring due times from the injected [`Clock`].
pub struct Scheduler {
    inner: Mutex<Inner>,
    wake: Condvar,
    clock: Arc<dyn Clock>,
}

impl Scheduler {
    pub fn new(clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Scheduler {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                next_seq: 0,
                stopped: false,
            }),
            wake: Condvar::new(),
            clock,
        })
    }

    /// Schedule `job` to run as soon as the worker thread next drains the queue.
    pub fn do_next(&self, tag: TaskTag, job: impl FnOnce() + Send + 'static) {
        self.schedule_at(self.clock.now(), tag, job);
    }

    /// Schedule `job` to run after `delay`.
    pub fn do_later(&self, delay: Duration, tag: TaskTag, job: impl FnOnce() + Send + 'static) {
        self.schedule_at(self.clock.now() + delay, tag, job);
    }

    fn schedule_at(&self, due: Duration, tag: TaskTag, job: impl FnOnce() + Send + 'static) {
        let mut inner = self.inner.lock().expect("scheduler poisoned");
        if inner.stopped {
            return;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(Scheduled {
            due,
            seq,
            tag,
            job: Some(Box::new(job)),
        });
        drop(inner);
        self.wake.notify_all();
    }

    /// Cancel every pending task whose tag matches `tag`.
    pub fn clear(&self, tag: TaskTag) {
        let mut inner = self.inner.lock().expect("scheduler poisoned");
        // `BinaryHeap` has no in-place filter; rebuild it minus matches.
        let remaining: Vec<Scheduled> = inner
            .heap
            .drain()
            .filter(|scheduled| scheduled.tag != tag)
            .collect();
        inner.heap = BinaryHeap::from(remaining);
    }

    pub fn clear_all(&self) {
        let mut inner = self.inner.lock().expect("scheduler poisoned");
        inner.heap.clear();
    }

    /// Stop the worker thread after it finishes draining due tasks; no
    /// further tasks will be accepted.
    pub fn stop(&self) {
        let mut inner = self.inner.lock().expect("scheduler poisoned");
        inner.stopped = true;
        inner.heap.clear();
        drop(inner);
        self.wake.notify_all();
    }

    /// Run due tasks once, returning how long the caller should wait before
    /// calling `drive_once` again (`None` means no pending tasks).
    fn drive_once(&self) -> Option<Duration> {
        loop {
            let mut inner = self.inner.lock().expect("scheduler poisoned");
            if inner.stopped {
                return None;
            }
            let now = self.clock.now();
            match inner.heap.peek() {
                None => return None,
                Some(top) if top.due > now => return Some(top.due - now),
                Some(_) => {
                    let mut scheduled = inner.heap.pop().expect("peeked Some");
                    drop(inner);
                    if let Some(job) = scheduled.job.take() {
                        job();
                    }
                    // Loop again: more tasks may already be due.
                }
            }
        }
    }

    /// Spawn the dedicated OS thread that drives this scheduler until
    /// `stop` is called. Returns a join handle the owner can wait on during
    /// teardown.
    pub fn spawn_worker(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        std::thread::Builder::new()
            .name("ws-connection-scheduler".into())
            .spawn(move || loop {
                let wait = scheduler.drive_once();
                let inner = scheduler.inner.lock().expect("scheduler poisoned");
                if inner.stopped {
                    return;
                }
                match wait {
                    None => {
                        drop(scheduler.wake.wait(inner).expect("scheduler poisoned"));
                    }
                    Some(d) => {
                        drop(
                            scheduler
                                .wake
                                .wait_timeout(inner, d)
                                .expect("scheduler poisoned"),
                        );
                    }
                }
            })
            .expect("failed to spawn scheduler worker thread")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[test]
    fn do_next_runs_immediately_under_manual_clock() {
        let clock = Arc::new(ManualClock::new());
        let sched = Scheduler::new(clock);
        let ran = Arc::new(AtomicU32::new(0));
        let ran2 = ran.clone();
        sched.do_next(TaskTag::Other(0), move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(sched.drive_once(), None);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn do_later_waits_for_clock() {
        let clock = Arc::new(ManualClock::new());
        let sched = Scheduler::new(clock.clone());
        let ran = Arc::new(AtomicU32::new(0));
        let ran2 = ran.clone();
        sched.do_later(Duration::from_secs(1), TaskTag::Reconnect, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        assert!(sched.drive_once().is_some());
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        clock.advance(Duration::from_secs(1));
        assert_eq!(sched.drive_once(), None);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn clear_cancels_matching_tag_only() {
        let clock = Arc::new(ManualClock::new());
        let sched = Scheduler::new(clock);
        let ran = Arc::new(AtomicU32::new(0));
        let a = ran.clone();
        let b = ran.clone();
        sched.do_next(TaskTag::Reconnect, move || {
            a.fetch_add(1, Ordering::SeqCst);
        });
        sched.do_next(TaskTag::TokenExpiry, move || {
            b.fetch_add(10, Ordering::SeqCst);
        });
        sched.clear(TaskTag::Reconnect);
        sched.drive_once();
        assert_eq!(ran.load(Ordering::SeqCst), 10);
    }
}
