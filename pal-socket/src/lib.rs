//! Per-socket event state machine on top of `ev-port`.
//!
//! One [`PalSocket`] wraps one native socket and the single [`ev_port::EventPort`]
//! registration driving it; the accept/stream/datagram read-and-write loops
//! described in the external-interfaces section are the state machine in
//! [`Adapter::handle`], grounded in mio's `sys::unix::tcp::{listener,stream}`
//! read/write-readiness loops.

pub mod handler;
pub mod kind;
pub mod option;
mod raw;
pub mod resolver;

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use ev_port::event::{EventType, Flow, Handler as EvHandler};
use ev_port::{EventHandle, EventPort, Interest, RawFdLike};
use prx_error::{PrxError, PrxErrorKind};

pub use handler::{AcceptDecision, SocketHandler};
pub use kind::{AddressFamily, SocketKind};
pub use option::{ShutdownDirection, SocketOption};
pub use raw::RawSocket;
pub use resolver::{Resolver, StdResolver};

/// Properties supplied to [`PalSocket::open`]: the destination (for a
/// stream/datagram client) or bind address (for a listener), plus the
/// socket options to apply before the connect/listen call.
#[derive(Debug, Clone, Default)]
pub struct SocketProperties {
    pub bind: Option<SocketAddr>,
    pub connect: Option<SocketAddr>,
    /// A host/interface name and port to resolve via `open`'s `resolver`
    /// before binding, taking priority over `bind` when set.
    pub bind_host: Option<(String, u16)>,
    /// A host/interface name and port to resolve via `open`'s `resolver`
    /// before connecting, taking priority over `connect` when set.
    pub connect_host: Option<(String, u16)>,
    pub family: AddressFamily,
    pub listen_backlog: i32,
}

/// A buffer the handler offered for sending, parked here until the write
/// edge actually has capacity.
struct RecvState {
    closed: bool,
}

struct Adapter {
    kind: SocketKind,
    socket: RawSocket,
    handler: Arc<dyn SocketHandler>,
    recv: Mutex<RecvState>,
    port: Arc<EventPort>,
}

impl Adapter {
    fn emit_error(&self, err: PrxError) {
        if self.kind == SocketKind::Listener {
            self.handler.end_accept(Err(err));
        } else {
            self.handler.end_recv(BytesMut::new(), None, Some(err));
        }
    }

    fn drain_accept(&self) -> Flow {
        loop {
            match self.socket.accept() {
                Ok((peer_socket, addr)) => match self.handler.begin_accept() {
                    AcceptDecision::Accept(peer_handler) => {
                        match register_adapter(self.port.clone(), SocketKind::Stream, peer_socket, peer_handler) {
                            Ok(peer) => self.handler.end_accept(Ok((peer, addr))),
                            Err(err) => self.handler.end_accept(Err(err)),
                        }
                    }
                    AcceptDecision::Reject => {
                        let _ = peer_socket.close();
                    }
                },
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Flow::Done,
                Err(e) => {
                    self.handler.end_accept(Err(PrxError::from(e)));
                    return Flow::Done;
                }
            }
        }
    }

    fn drain_recv(&self) -> Flow {
        loop {
            if self.recv.lock().unwrap().closed {
                return Flow::Done;
            }
            let mut buf = match self.handler.begin_recv() {
                Some(buf) if !buf.is_empty() => buf,
                _ => return Flow::Done,
            };
            let read_result = if self.kind == SocketKind::Datagram {
                self.socket.recvfrom(&mut buf).map(|(n, addr)| (n, Some(addr)))
            } else {
                self.socket.recv(&mut buf).map(|n| (n, None))
            };
            match read_result {
                Ok((0, _)) if self.kind != SocketKind::Datagram => {
                    self.recv.lock().unwrap().closed = true;
                    buf.truncate(0);
                    self.handler.end_recv(buf, None, Some(PrxError::new(PrxErrorKind::Closed)));
                    return Flow::Done;
                }
                Ok((n, addr)) => {
                    buf.truncate(n);
                    self.handler.end_recv(buf, addr, None);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Flow::Done,
                Err(e) => {
                    self.handler.end_recv(BytesMut::new(), None, Some(PrxError::from(e)));
                    return Flow::Done;
                }
            }
        }
    }

    fn drain_send(&self) -> Flow {
        loop {
            let (payload, dest) = match self.handler.begin_send() {
                Some(p) => p,
                None => return Flow::Done,
            };
            let send_result = match dest {
                Some(addr) => self.socket.sendto(&payload, addr),
                None => self.socket.send(&payload),
            };
            match send_result {
                Ok(n) => self.handler.end_send(Ok(n)),
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => return Flow::Done,
                Err(e) => {
                    self.handler.end_send(Err(PrxError::from(e)));
                    return Flow::Done;
                }
            }
        }
    }
}

impl EvHandler for Adapter {
    fn handle(&self, event: EventType, error: Option<PrxErrorKind>) -> Flow {
        match event {
            EventType::Error => {
                self.emit_error(PrxError::new(error.unwrap_or(PrxErrorKind::Unknown)));
                Flow::Done
            }
            EventType::Read if self.kind == SocketKind::Listener => self.drain_accept(),
            EventType::Read => self.drain_recv(),
            EventType::Write => self.drain_send(),
            EventType::Close => {
                self.recv.lock().unwrap().closed = true;
                self.handler.end_recv(BytesMut::new(), None, Some(PrxError::new(PrxErrorKind::Closed)));
                Flow::Done
            }
            EventType::Destroy => {
                self.handler.closed(Ok(()));
                Flow::Done
            }
        }
    }
}

/// A single open socket: native fd, event-port registration, and the
/// [`SocketHandler`] driving its read/write/accept loops.
pub struct PalSocket {
    port: Arc<EventPort>,
    handle: EventHandle,
    adapter: Arc<Adapter>,
}

impl PalSocket {
    /// Resolves `bind_host`/`connect_host` (if given) via `resolver`, opens a
    /// native socket per `kind`, applies `options`, optionally
    /// binds/listens/connects, and registers it with `port`. `opened` fires
    /// on `handler` before this returns.
    pub fn open(
        port: Arc<EventPort>,
        kind: SocketKind,
        properties: SocketProperties,
        options: &[SocketOption],
        resolver: &dyn Resolver,
        handler: Arc<dyn SocketHandler>,
    ) -> Result<PalSocket, PrxError> {
        let bind = match &properties.bind_host {
            Some((host, port)) => Some(resolve_one(resolver, host, *port, properties.family)?),
            None => properties.bind,
        };
        let connect = match &properties.connect_host {
            Some((host, port)) => Some(resolve_one(resolver, host, *port, properties.family)?),
            None => properties.connect,
        };

        let family_hint = connect.or(bind);
        let socket = RawSocket::for_kind(kind, family_hint)?;

        for opt in options {
            opt.apply(&socket)?;
        }

        let open_result = (|| -> Result<(), PrxError> {
            if let Some(bind) = bind {
                socket.bind(bind)?;
            }
            match kind {
                SocketKind::Listener => {
                    socket.listen(if properties.listen_backlog > 0 {
                        properties.listen_backlog
                    } else {
                        128
                    })?;
                }
                SocketKind::Stream | SocketKind::Datagram => {
                    if let Some(connect) = connect {
                        socket.connect(connect)?;
                    }
                }
            }
            Ok(())
        })();

        if let Err(err) = open_result {
            let kind = err.kind();
            handler.opened(Err(err));
            handler.closed(Err(PrxError::new(kind)));
            return Err(PrxError::new(kind));
        }

        register_adapter(port, kind, socket, handler)
    }

    /// Toggles write-readiness interest; `true` resumes `begin_send` polling.
    pub fn can_send(&self, on: bool) -> Result<(), PrxError> {
        if on {
            self.port.select(self.handle, Interest::WRITABLE)
        } else {
            self.port.clear(self.handle, Interest::WRITABLE)
        }
        .map_err(PrxError::from)
    }

    /// Toggles read-readiness interest; `true` resumes `begin_recv` polling.
    pub fn can_recv(&self, on: bool) -> Result<(), PrxError> {
        if on {
            self.adapter.recv.lock().unwrap().closed = false;
            self.port.select(self.handle, Interest::READABLE)
        } else {
            self.port.clear(self.handle, Interest::READABLE)
        }
        .map_err(PrxError::from)
    }

    pub fn option(&self, opt: SocketOption) -> Result<(), PrxError> {
        opt.apply(&self.adapter.socket)
    }

    pub fn available(&self) -> Result<usize, PrxError> {
        option::available(&self.adapter.socket)
    }

    pub fn local_addr(&self) -> Result<SocketAddr, PrxError> {
        self.adapter.socket.local_addr().map_err(PrxError::from)
    }

    pub fn shutdown(&self, direction: ShutdownDirection) -> Result<(), PrxError> {
        option::shutdown(&self.adapter.socket, direction)
    }

    pub fn close(self) -> Result<(), PrxError> {
        self.port.close(self.handle, true).map_err(PrxError::from)
    }
}

fn resolve_one(
    resolver: &dyn Resolver,
    host: &str,
    port: u16,
    family: AddressFamily,
) -> Result<SocketAddr, PrxError> {
    resolver
        .resolve(host, port, family)
        .map_err(PrxError::from)?
        .into_iter()
        .next()
        .ok_or_else(|| PrxError::new(PrxErrorKind::NoAddress))
}

/// Wraps an already-opened-and-optionally-connected `socket` into an
/// [`Adapter`], registers it with `port`, and fires `handler.opened(Ok(()))`.
/// Shared by [`PalSocket::open`]'s success path and `Adapter::drain_accept`'s
/// handoff of a freshly accepted connection to its own [`PalSocket`].
fn register_adapter(
    port: Arc<EventPort>,
    kind: SocketKind,
    socket: RawSocket,
    handler: Arc<dyn SocketHandler>,
) -> Result<PalSocket, PrxError> {
    let adapter = Arc::new(Adapter {
        kind,
        socket,
        handler: handler.clone(),
        recv: Mutex::new(RecvState { closed: false }),
        port: port.clone(),
    });

    let fd = adapter_raw_fd(&adapter.socket);
    let interest = match kind {
        SocketKind::Listener => Interest::READABLE,
        SocketKind::Stream | SocketKind::Datagram => Interest::READABLE | Interest::WRITABLE,
    };
    let event_handle = port.register(fd, adapter.clone(), interest).map_err(PrxError::from)?;

    handler.opened(Ok(()));

    Ok(PalSocket { port, handle: event_handle, adapter })
}

#[cfg(unix)]
fn adapter_raw_fd(socket: &RawSocket) -> RawFdLike {
    use std::os::unix::io::AsRawFd;
    socket.as_raw_fd()
}

#[cfg(windows)]
fn adapter_raw_fd(socket: &RawSocket) -> RawFdLike {
    use std::os::windows::io::AsRawSocket;
    socket.as_raw_socket() as RawFdLike
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    struct RecordingHandler {
        opened: AtomicUsize,
        recvd: Mutex<Vec<u8>>,
        tx: mpsc::Sender<()>,
    }

    impl SocketHandler for RecordingHandler {
        fn opened(&self, result: Result<(), PrxError>) {
            assert!(result.is_ok());
            self.opened.fetch_add(1, Ordering::SeqCst);
        }

        fn begin_recv(&self) -> Option<BytesMut> {
            Some(BytesMut::zeroed(1024))
        }

        fn end_recv(&self, buffer: BytesMut, _source: Option<SocketAddr>, error: Option<PrxError>) {
            if error.is_none() {
                self.recvd.lock().unwrap().extend_from_slice(&buffer);
                let _ = self.tx.send(());
            }
        }
    }

    struct QuietHandler;
    impl SocketHandler for QuietHandler {}

    #[test]
    fn udp_loopback_round_trip() {
        let port = EventPort::new().unwrap();
        let (tx, rx) = mpsc::channel();

        let recv_handler = Arc::new(RecordingHandler {
            opened: AtomicUsize::new(0),
            recvd: Mutex::new(Vec::new()),
            tx,
        });
        let recv_sock = PalSocket::open(
            port.clone(),
            SocketKind::Datagram,
            SocketProperties { bind: Some("127.0.0.1:0".parse().unwrap()), ..Default::default() },
            &[],
            &StdResolver,
            recv_handler.clone(),
        )
        .unwrap();
        assert_eq!(recv_handler.opened.load(Ordering::SeqCst), 1);
        let recv_addr = recv_sock.adapter.socket.local_addr().unwrap();

        let send_sock = PalSocket::open(
            port.clone(),
            SocketKind::Datagram,
            SocketProperties { connect: Some(recv_addr), ..Default::default() },
            &[],
            &StdResolver,
            Arc::new(QuietHandler),
        )
        .unwrap();
        send_sock.adapter.socket.send(b"hello").unwrap();

        rx.recv_timeout(std::time::Duration::from_secs(2)).expect("datagram delivered");
        assert_eq!(&recv_handler.recvd.lock().unwrap()[..], b"hello");

        send_sock.close().unwrap();
        recv_sock.close().unwrap();
    }
}
