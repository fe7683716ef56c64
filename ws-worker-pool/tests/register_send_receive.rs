//! End-to-end scenario over a real `ev-port` dispatch loop, in the same
//! pipe-backed style as `ev-port`'s own readiness tests: a fake transport
//! backed by a pipe stands in for a real WebSocket so the handshake →
//! frame → close lifecycle exercises the worker's actual event handling
//! without needing a live WebSocket server.
#![cfg(unix)]

use std::io::Write;
use std::os::fd::{FromRawFd, IntoRawFd, RawFd};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use prx_error::PrxError;
use ws_worker_pool::{HandshakeStatus, TransportEvents, WorkerPool, WsFrame, WsTransport};

/// A transport that completes its handshake immediately and hands back one
/// queued frame the first time `poll_frame` is called after the pipe
/// signals readable.
struct PipeTransport {
    pending_frame: Option<Vec<u8>>,
}

impl WsTransport for PipeTransport {
    fn poll_handshake(&mut self) -> HandshakeStatus {
        HandshakeStatus::Complete
    }

    fn begin_send(&mut self, _frame: &[u8]) -> Result<bool, PrxError> {
        Ok(true)
    }

    fn poll_frame(&mut self) -> Result<Option<WsFrame>, PrxError> {
        Ok(self.pending_frame.take().map(WsFrame::Binary))
    }

    fn close(&mut self) -> Result<(), PrxError> {
        Ok(())
    }
}

struct Recorder {
    handshakes: AtomicUsize,
    frames: Mutex<Vec<Vec<u8>>>,
    tx: mpsc::Sender<()>,
}

impl TransportEvents for Recorder {
    fn on_handshake(&self, result: Result<(), PrxError>) {
        assert!(result.is_ok());
        self.handshakes.fetch_add(1, Ordering::SeqCst);
    }

    fn on_frame(&self, frame: WsFrame) {
        if let WsFrame::Binary(bytes) = frame {
            self.frames.lock().unwrap().push(bytes);
            let _ = self.tx.send(());
        }
    }

    fn on_writable(&self) {}
    fn on_closed(&self, _reason: Result<(), PrxError>) {}
}

#[test]
fn handshake_then_frame_delivery_then_close() {
    let pool = WorkerPool::new(1).expect("worker pool");

    let mut fds = [0i32; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    let (read_fd, write_fd): (RawFd, RawFd) = (fds[0], fds[1]);

    let (tx, rx) = mpsc::channel();
    let recorder = Arc::new(Recorder {
        handshakes: AtomicUsize::new(0),
        frames: Mutex::new(Vec::new()),
        tx,
    });

    let transport = Box::new(PipeTransport { pending_frame: Some(b"frame-one".to_vec()) });
    let client = pool
        .register(read_fd, transport, recorder.clone())
        .expect("register pipe-backed transport");

    let mut writer = unsafe { std::fs::File::from_raw_fd(write_fd) };
    writer.write_all(b"x").unwrap();

    rx.recv_timeout(Duration::from_secs(2)).expect("frame delivered");
    assert_eq!(recorder.handshakes.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.frames.lock().unwrap().as_slice(), &[b"frame-one".to_vec()]);

    client.close().unwrap();
    let _ = writer.into_raw_fd();
}
