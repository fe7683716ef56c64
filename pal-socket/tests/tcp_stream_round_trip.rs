//! End-to-end TCP scenarios: a plain `std::net::TcpListener` echoes back
//! whatever it reads, a `PalSocket` stream connects to it non-blockingly
//! and exercises the write-then-read edges through a real `EventPort`; and
//! a `PalSocket` listener accepts a loopback connection and hands it off
//! to a fresh `PalSocket` of its own. The UDP round trip lives as a unit
//! test beside the code.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use bytes::{Bytes, BytesMut};

use ev_port::EventPort;
use pal_socket::resolver::StdResolver;
use pal_socket::{AcceptDecision, PalSocket, SocketHandler, SocketKind, SocketProperties};
use prx_error::PrxError;

struct EchoClient {
    outbox: Mutex<Option<Bytes>>,
    tx: mpsc::Sender<Vec<u8>>,
}

impl SocketHandler for EchoClient {
    fn begin_send(&self) -> Option<(Bytes, Option<std::net::SocketAddr>)> {
        self.outbox.lock().unwrap().take().map(|b| (b, None))
    }

    fn begin_recv(&self) -> Option<BytesMut> {
        Some(BytesMut::zeroed(64))
    }

    fn end_recv(&self, buffer: BytesMut, _source: Option<std::net::SocketAddr>, error: Option<PrxError>) {
        if error.is_none() && !buffer.is_empty() {
            let _ = self.tx.send(buffer.to_vec());
        }
    }
}

#[test]
fn connect_send_and_receive_over_loopback_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind echo listener");
    let addr = listener.local_addr().unwrap();

    let echo_thread = thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept loopback connection");
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).expect("read client bytes");
        stream.write_all(&buf[..n]).expect("echo bytes back");
    });

    let port = EventPort::new().expect("open event port");
    let (tx, rx) = mpsc::channel();
    let handler = Arc::new(EchoClient {
        outbox: Mutex::new(Some(Bytes::from_static(b"ping"))),
        tx,
    });

    let socket = PalSocket::open(
        port,
        SocketKind::Stream,
        SocketProperties { connect: Some(addr), ..Default::default() },
        &[],
        &StdResolver,
        handler,
    )
    .expect("open connecting stream socket");

    let echoed = rx.recv_timeout(Duration::from_secs(2)).expect("echo reply delivered");
    assert_eq!(echoed, b"ping");

    socket.close().unwrap();
    echo_thread.join().unwrap();
}

struct ListenerHandler {
    tx: Mutex<mpsc::Sender<(PalSocket, SocketAddr)>>,
}

impl SocketHandler for ListenerHandler {
    fn begin_accept(&self) -> AcceptDecision {
        AcceptDecision::Accept(Arc::new(QuietHandler))
    }

    fn end_accept(&self, result: Result<(PalSocket, SocketAddr), PrxError>) {
        if let Ok(pair) = result {
            let _ = self.tx.lock().unwrap().send(pair);
        }
    }
}

struct QuietHandler;
impl SocketHandler for QuietHandler {}

#[test]
fn listener_accept_hands_connection_off_to_a_fresh_palsocket() {
    let port = EventPort::new().expect("open event port");
    let (tx, rx) = mpsc::channel();

    let listener = PalSocket::open(
        port.clone(),
        SocketKind::Listener,
        SocketProperties { bind: Some("127.0.0.1:0".parse().unwrap()), ..Default::default() },
        &[],
        &StdResolver,
        Arc::new(ListenerHandler { tx: Mutex::new(tx) }),
    )
    .expect("open listening socket");

    let listen_addr = listener.local_addr().expect("listener has a local address");
    let client = TcpStream::connect(listen_addr).expect("connect to loopback listener");

    let (peer, peer_addr) = rx.recv_timeout(Duration::from_secs(2)).expect("accept handed off a peer socket");
    assert_eq!(peer_addr.ip(), listen_addr.ip());

    drop(client);
    peer.close().unwrap();
    listener.close().unwrap();
}
