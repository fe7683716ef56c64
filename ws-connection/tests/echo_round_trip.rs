//! Echo round-trip: a payload larger than one frame goes out as two tunnel
//! frames (a 4096-byte fragment plus the remainder, message-boundary-tagged)
//! and the peer's raw echo reassembles back into exactly the bytes sent,
//! delivered to the receiver in one call.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use url::Url;

use io_queue::CompletionCode;
use rt_support::{Scheduler, SystemClock};
use ws_connection::{ConnectFlags, ProxySettings, Receiver, WsConnection};
use ws_stream::InboundStream;
use ws_worker_pool::WorkerPool;

struct RecordingReceiver {
    tx: mpsc::Sender<Vec<u8>>,
    calls: AtomicUsize,
}

impl Receiver for RecordingReceiver {
    fn on_message(&self, stream: &mut InboundStream) -> Result<(), prx_error::PrxError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut buf = vec![0u8; stream.readable()];
        stream.read(&mut buf);
        let _ = self.tx.send(buf);
        Ok(())
    }
}

/// Blindly echoes whatever binary WebSocket messages it receives, frame
/// for frame, without any knowledge of the tunnel's own fragment envelope —
/// standing in for a real peer.
fn run_raw_echo_server(listener: TcpListener, frame_count_tx: mpsc::Sender<usize>) {
    let (stream, _) = listener.accept().expect("accept test client");
    let mut ws = tungstenite::accept(stream).expect("server-side handshake");
    let mut seen = 0usize;
    loop {
        match ws.read() {
            Ok(message) if message.is_binary() => {
                seen += 1;
                if ws.send(message).is_err() {
                    break;
                }
            }
            Ok(_) => continue,
            Err(_) => break,
        }
    }
    let _ = frame_count_tx.send(seen);
}

#[test]
fn payload_larger_than_one_frame_reassembles_exactly() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind test listener");
    let addr = listener.local_addr().unwrap();
    let (frame_count_tx, frame_count_rx) = mpsc::channel();
    let server = thread::spawn(move || run_raw_echo_server(listener, frame_count_tx));

    let clock = Arc::new(SystemClock::new());
    let scheduler = Scheduler::new(clock.clone());
    let pool = Arc::new(WorkerPool::new(1).expect("worker pool"));

    let (msg_tx, msg_rx) = mpsc::channel();
    let receiver = Arc::new(RecordingReceiver { tx: msg_tx, calls: AtomicUsize::new(0) });

    let conn = WsConnection::create(
        Url::parse(&format!("ws://{addr}")).unwrap(),
        None,
        None,
        ConnectFlags::NONE,
        ProxySettings::default(),
        scheduler.clone(),
        clock,
        pool,
        None,
        receiver.clone(),
    );

    let worker = scheduler.spawn_worker();
    conn.connect(|_last_error| false);

    let deadline = Instant::now() + Duration::from_secs(5);
    while conn.status() != ws_connection::Status::Connected && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(conn.status(), ws_connection::Status::Connected, "client never reached the test server");

    let payload = vec![0xABu8; 5000];
    let completion = Arc::new(Mutex::new(None));
    let completion_recorder = completion.clone();
    let to_send = payload.clone();
    conn.send(
        move |stream| stream.write(&to_send),
        move |code| *completion_recorder.lock().unwrap() = Some(code),
    );

    let echoed = msg_rx.recv_timeout(Duration::from_secs(5)).expect("echoed message delivered");
    assert_eq!(echoed, payload);
    assert_eq!(receiver.calls.load(Ordering::SeqCst), 1, "exactly one receiver_cb invocation");

    let deadline = Instant::now() + Duration::from_secs(2);
    while completion.lock().unwrap().is_none() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(*completion.lock().unwrap(), Some(CompletionCode::Ok(904)));

    conn.close();
    scheduler.stop();
    let _ = worker.join();

    let frames_seen = frame_count_rx.recv_timeout(Duration::from_secs(2)).unwrap_or(0);
    assert_eq!(frames_seen, 2, "4096-byte fragment + 904-byte message-boundary frame");
    let _ = server.join();
}
