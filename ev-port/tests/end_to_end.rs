//! End-to-end loopback scenario, in the spirit of mio's own
//! `tests/end_to_end.rs`: register a real connected TCP pair with one port
//! and confirm both read-readiness (data arrives) and write-readiness
//! (a writable socket) get dispatched.
//!
//! Unix-only: uses raw fd conversions directly rather than going through
//! `pal-socket`, to exercise `ev-port` in isolation.
#![cfg(unix)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::unix::io::AsRawFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::time::Duration;

use ev_port::event::{EventType, Flow, Handler};
use ev_port::{EventPort, Interest};
use prx_error::PrxErrorKind;

struct Recorder {
    reads: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
    tx: mpsc::Sender<EventType>,
}

impl Handler for Recorder {
    fn handle(&self, event: EventType, _error: Option<PrxErrorKind>) -> Flow {
        match event {
            EventType::Read => {
                self.reads.fetch_add(1, Ordering::SeqCst);
                let _ = self.tx.send(event);
                Flow::Done
            }
            EventType::Write => {
                self.writes.fetch_add(1, Ordering::SeqCst);
                let _ = self.tx.send(event);
                Flow::Done
            }
            _ => Flow::Done,
        }
    }
}

#[test]
fn connected_tcp_pair_reports_read_and_write_readiness() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().unwrap();

    let client = TcpStream::connect(addr).expect("connect to loopback listener");
    let (mut server_side, _) = listener.accept().expect("accept loopback connection");

    let port = EventPort::new().expect("open event port");
    let reads = Arc::new(AtomicUsize::new(0));
    let writes = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = mpsc::channel();

    let handler = Recorder { reads: reads.clone(), writes: writes.clone(), tx };
    let fd = client.as_raw_fd();
    let handle = port
        .register(fd, handler, Interest::READABLE | Interest::WRITABLE)
        .expect("register client socket");

    // A freshly connected socket is writable immediately.
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).expect("writable fired"), EventType::Write);
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    server_side.write_all(b"hello").expect("server write");
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).expect("readable fired"), EventType::Read);
    assert_eq!(reads.load(Ordering::SeqCst), 1);

    let mut buf = [0u8; 5];
    client.try_clone().unwrap().read_exact(&mut buf).unwrap();
    assert_eq!(&buf, b"hello");

    port.close(handle, false).unwrap();
    // `close_fd: false` leaves the fd open; `client`'s own `Drop` closes it.
    drop(client);
}
