//! The reconnecting, authenticated, message-framing tunnel .
//! Owns at most one `ws-worker-pool::ClientHandle` at a time; every field
//! is touched only from inside a job dispatched through this connection's
//! own `rt-support::Scheduler`, so the connection needs no locking of its
//! own beyond what lets a `TransportEvents` callback arriving on a worker
//! thread hand off into that scheduler: all mutation of connection state
//! happens on the connection's own scheduler task.

use std::net::{SocketAddr, TcpStream};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use io_queue::{Buffer, BufferFlags, CompletionCode, IoQueue};
use prx_error::{PrxError, PrxErrorKind};
use rt_support::{Clock, Scheduler, TaskTag};
use ws_stream::{InboundStream, OutboundStream};
use ws_worker_pool::{ClientHandle, TransportEvents, TungsteniteTransport, WorkerPool, WsFrame};

use crate::backoff::next_backoff;
use crate::config::{ConnectFlags, ProxySettings};
use crate::status::{Phase, Status};
use crate::token::TokenProvider;

/// Invoked once per fully-assembled inbound message. Returning `Err` is treated like a transport error:
/// disconnect + reset. The connection retains ownership of the message's
/// buffers and releases them itself once this returns.
pub trait Receiver: Send + Sync {
    fn on_message(&self, stream: &mut InboundStream) -> Result<(), PrxError>;
}

impl<F> Receiver for F
where
    F: Fn(&mut InboundStream) -> Result<(), PrxError> + Send + Sync,
{
    fn on_message(&self, stream: &mut InboundStream) -> Result<(), PrxError> {
        self(stream)
    }
}

/// Invoked after a disconnect edge, before scheduling the next connect
/// attempt. Returning `false` ends the episode instead of reconnecting.
pub trait Reconnect: Send + Sync {
    fn should_reconnect(&self, last_error: Option<PrxErrorKind>) -> bool;
}

impl<F> Reconnect for F
where
    F: Fn(Option<PrxErrorKind>) -> bool + Send + Sync,
{
    fn should_reconnect(&self, last_error: Option<PrxErrorKind>) -> bool {
        self(last_error)
    }
}

struct State {
    phase: Phase,
    last_error: Option<PrxErrorKind>,
    last_activity: Duration,
    last_success: Duration,
    back_off: Duration,
    token_expiry: Option<Duration>,
    client: Option<ClientHandle>,
    reconnect: Option<Arc<dyn Reconnect>>,
}

struct Inner {
    address: Url,
    user_header_key: Option<String>,
    pwd_header_key: Option<String>,
    flags: ConnectFlags,
    proxy: ProxySettings,
    scheduler: Arc<Scheduler>,
    clock: Arc<dyn Clock>,
    pool: Arc<WorkerPool>,
    token_provider: Option<Arc<dyn TokenProvider>>,
    receiver: Arc<dyn Receiver>,
    inbound: Mutex<IoQueue>,
    outbound: Mutex<IoQueue>,
    state: Mutex<State>,
}

/// A single logical, self-healing full-duplex tunnel channel. Cheaply
/// `Clone`-able; every clone refers to the same underlying connection.
#[derive(Clone)]
pub struct WsConnection(Arc<Inner>);

impl WsConnection {
    /// Builds a connection over `address`, with the scheduler's clock, the
    /// worker pool to register the underlying transport with, and an
    /// optional token provider threaded in as explicit dependencies rather
    /// than global state. `proxy` routes the outbound TCP connect through
    /// an HTTP `CONNECT` tunnel when its `host` is set.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        address: Url,
        user_header_key: Option<String>,
        pwd_header_key: Option<String>,
        flags: ConnectFlags,
        proxy: ProxySettings,
        scheduler: Arc<Scheduler>,
        clock: Arc<dyn Clock>,
        pool: Arc<WorkerPool>,
        token_provider: Option<Arc<dyn TokenProvider>>,
        receiver: Arc<dyn Receiver>,
    ) -> WsConnection {
        let now = clock.now();
        WsConnection(Arc::new(Inner {
            address,
            user_header_key,
            pwd_header_key,
            flags,
            proxy,
            scheduler,
            clock,
            pool,
            token_provider,
            receiver,
            inbound: Mutex::new(IoQueue::new()),
            outbound: Mutex::new(IoQueue::new()),
            state: Mutex::new(State {
                phase: Phase::Disconnected,
                last_error: None,
                last_activity: now,
                last_success: now,
                back_off: Duration::ZERO,
                token_expiry: None,
                client: None,
                reconnect: None,
            }),
        }))
    }

    pub fn status(&self) -> Status {
        self.0.state.lock().expect("connection state poisoned").phase.status()
    }

    pub fn last_error(&self) -> Option<PrxErrorKind> {
        self.0.state.lock().expect("connection state poisoned").last_error
    }

    /// Begins a connect episode. A no-op if the connection is already
    /// connecting/connected/closing.
    pub fn connect(&self, reconnect: impl Reconnect + 'static) {
        let inner = self.0.clone();
        {
            let mut state = inner.state.lock().expect("connection state poisoned");
            if state.phase != Phase::Disconnected {
                return;
            }
            state.reconnect = Some(Arc::new(reconnect));
        }
        schedule_connect(inner);
    }

    /// Offers `writer` a stream to fill one complete message; `on_complete`
    /// fires exactly once with the result. Safe to call at any time; if the
    /// connection is closing or closed the message completes with `Aborted`
    /// instead of being queued.
    pub fn send(
        &self,
        writer: impl FnOnce(&mut OutboundStream) + Send + 'static,
        on_complete: impl FnOnce(CompletionCode) + Send + 'static,
    ) {
        let inner = self.0.clone();
        inner.scheduler.do_next(TaskTag::Other(0), move || {
            let closing = {
                let state = inner.state.lock().expect("connection state poisoned");
                matches!(state.phase, Phase::Closing | Phase::Closed)
            };
            if closing {
                on_complete(CompletionCode::Aborted);
                return;
            }
            {
                let mut outbound = inner.outbound.lock().expect("outbound queue poisoned");
                let mut stream = OutboundStream::new(&mut outbound);
                writer(&mut stream);
                stream.finish(on_complete);
            }
            try_flush_send(&inner);
        });
    }

    /// Tears down: cancels pending tasks, aborts the outbound queue (every
    /// queued send completes with `Aborted`), flips to `closing`, and
    /// proceeds disconnect -> underlying-close -> `closed`. Callers must
    /// never invoke any other operation afterward; there is no separate
    /// explicit free — resources are released when the last `WsConnection`
    /// clone is dropped.
    pub fn close(&self) {
        let inner = self.0.clone();
        inner.scheduler.do_next(TaskTag::Other(0), move || close_task(inner));
    }
}

fn schedule_connect(inner: Arc<Inner>) {
    let delay = inner.state.lock().expect("connection state poisoned").back_off;
    if delay.is_zero() {
        let job_inner = inner.clone();
        inner.scheduler.do_next(TaskTag::Connect, move || connect_task(job_inner));
    } else {
        let job_inner = inner.clone();
        inner.scheduler.do_later(delay, TaskTag::Connect, move || connect_task(job_inner));
    }
}

fn connect_task(inner: Arc<Inner>) {
    {
        let mut state = inner.state.lock().expect("connection state poisoned");
        if matches!(state.phase, Phase::Closing | Phase::Closed) {
            return;
        }
        state.phase = Phase::Connecting;
    }

    let mut pwd_value: Option<String> = None;
    if let Some(provider) = inner.token_provider.clone() {
        match provider.acquire() {
            Ok(token) => {
                if let Some(ttl) = token.ttl {
                    let expiry = inner.clock.now() + ttl;
                    inner.state.lock().expect("connection state poisoned").token_expiry = Some(expiry);
                    schedule_token_expiry(inner.clone(), expiry);
                }
                pwd_value = Some(token.value);
            }
            Err(err) => {
                tracing::warn!(kind = ?err.kind(), "token acquisition failed, aborting connect attempt");
                fail_connect(&inner, err.kind());
                return;
            }
        }
    }

    let stream = if let Some(proxy_host) = inner.proxy.host.as_deref() {
        let (host, port) = match split_host_port(proxy_host) {
            Ok(hp) => hp,
            Err(kind) => {
                fail_connect(&inner, kind);
                return;
            }
        };
        let proxy_addr = match resolve_host_port(&host, port) {
            Ok(addr) => addr,
            Err(kind) => {
                fail_connect(&inner, kind);
                return;
            }
        };
        let Some(target_host) = inner.address.host_str() else {
            fail_connect(&inner, PrxErrorKind::NoAddress);
            return;
        };
        let Some(target_port) = inner.address.port_or_known_default() else {
            fail_connect(&inner, PrxErrorKind::NoAddress);
            return;
        };
        let auth = proxy_auth_header(&inner.proxy);
        match connect_through_proxy(proxy_addr, target_host, target_port, auth.as_deref()) {
            Ok(stream) => stream,
            Err(err) => {
                fail_connect(&inner, err.kind());
                return;
            }
        }
    } else {
        let addr = match resolve_address(&inner.address) {
            Ok(addr) => addr,
            Err(kind) => {
                fail_connect(&inner, kind);
                return;
            }
        };
        match connect_nonblocking(addr) {
            Ok(stream) => stream,
            Err(err) => {
                fail_connect(&inner, err.kind());
                return;
            }
        }
    };

    let mut headers = Vec::new();
    if let Some(key) = &inner.user_header_key {
        let user = inner.address.username();
        if !user.is_empty() {
            headers.push((key.clone(), user.to_string()));
        }
    }
    if let (Some(key), Some(value)) = (&inner.pwd_header_key, &pwd_value) {
        headers.push((key.clone(), value.clone()));
    }

    let secure = inner.address.scheme() == "wss" || inner.flags.contains(ConnectFlags::FORCE_SECURE);
    let fd = raw_handle(&stream);
    let transport = match TungsteniteTransport::connect(&inner.address, stream, secure, &headers) {
        Ok(transport) => transport,
        Err(err) => {
            tracing::warn!(kind = ?err.kind(), "websocket connect failed");
            fail_connect(&inner, err.kind());
            return;
        }
    };

    let events: Arc<dyn TransportEvents> = Arc::new(ConnTransportEvents { inner: inner.clone() });
    match inner.pool.register(fd, Box::new(transport), events) {
        Ok(client) => {
            inner.state.lock().expect("connection state poisoned").client = Some(client);
        }
        Err(err) => {
            fail_connect(&inner, err.kind());
        }
    }
}

fn fail_connect(inner: &Arc<Inner>, kind: PrxErrorKind) {
    inner.state.lock().expect("connection state poisoned").last_error = Some(kind);
    reset(inner);
}

/// `reset`: rolls back the outbound queue, asks the reconnect callback
/// whether to continue, and if so schedules the next connect attempt with
/// back-off .
fn reset(inner: &Arc<Inner>) {
    inner.outbound.lock().expect("outbound queue poisoned").rollback();

    let (reconnect_cb, last_error) = {
        let mut state = inner.state.lock().expect("connection state poisoned");
        state.client = None;
        state.phase = Phase::Disconnecting;
        (state.reconnect.clone(), state.last_error)
    };

    let should_reconnect = reconnect_cb.as_ref().is_some_and(|cb| cb.should_reconnect(last_error));
    if !should_reconnect {
        inner.state.lock().expect("connection state poisoned").phase = Phase::Disconnected;
        return;
    }

    let delay = {
        let mut state = inner.state.lock().expect("connection state poisoned");
        state.phase = Phase::Disconnected;
        state.back_off = next_backoff(state.back_off);
        state.back_off
    };
    let job_inner = inner.clone();
    inner.scheduler.do_later(delay, TaskTag::Reconnect, move || connect_task(job_inner));
}

fn disconnect_task(inner: Arc<Inner>) {
    let client = inner.state.lock().expect("connection state poisoned").client.take();
    if let Some(client) = client {
        let _ = client.close();
    }
    reset(&inner);
}

fn schedule_token_expiry(inner: Arc<Inner>, expiry: Duration) {
    let now = inner.clock.now();
    let delay = expiry.saturating_sub(now);
    let job_inner = inner.clone();
    inner.scheduler.do_later(delay, TaskTag::TokenExpiry, move || token_expiry_task(job_inner, expiry));
}

fn token_expiry_task(inner: Arc<Inner>, expected_expiry: Duration) {
    let still_current = inner.state.lock().expect("connection state poisoned").token_expiry == Some(expected_expiry);
    if !still_current {
        return;
    }
    let now = inner.clock.now();
    if now < expected_expiry {
        // Reschedule for the remaining time instead of firing early.
        let remaining = expected_expiry - now;
        let job_inner = inner.clone();
        inner.scheduler.do_later(remaining, TaskTag::TokenExpiry, move || {
            token_expiry_task(job_inner, expected_expiry)
        });
        return;
    }
    tracing::debug!("bearer token expired, forcing disconnect to obtain a fresh one");
    disconnect_task(inner);
}

fn close_task(inner: Arc<Inner>) {
    {
        let mut state = inner.state.lock().expect("connection state poisoned");
        if state.phase == Phase::Closed {
            return;
        }
        state.phase = Phase::Closing;
    }

    for tag in [
        TaskTag::Connect,
        TaskTag::Reconnect,
        TaskTag::TokenExpiry,
        TaskTag::DeliverSend,
        TaskTag::DeliverRecv,
        TaskTag::Disconnect,
    ] {
        inner.scheduler.clear(tag);
    }

    inner.outbound.lock().expect("outbound queue poisoned").abort();

    let client = inner.state.lock().expect("connection state poisoned").client.take();
    if let Some(client) = client {
        let _ = client.close();
    }
    finish_close(&inner);
}

fn finish_close(inner: &Arc<Inner>) {
    inner.state.lock().expect("connection state poisoned").phase = Phase::Closed;
}

/// Pops buffers off the outbound queue and pushes them to the transport
/// until one would block or the queue is empty. Each `io-queue` buffer becomes one complete
/// WebSocket binary message — see [`encode_frame`] for why the
/// fragment/message-boundary tag travels as a one-byte envelope rather
/// than native WebSocket continuation frames.
fn try_flush_send(inner: &Arc<Inner>) {
    let client = {
        let state = inner.state.lock().expect("connection state poisoned");
        if state.phase != Phase::Connected {
            return;
        }
        match &state.client {
            Some(client) => client.clone(),
            None => return,
        }
    };

    loop {
        let (flags, payload) = {
            let mut outbound = inner.outbound.lock().expect("outbound queue poisoned");
            if outbound.inprogress_len() == 0 && outbound.submit_next().is_none() {
                return;
            }
            let buf = outbound.inprogress_front_mut().expect("just submitted or retained above");
            (buf.flags(), buf.payload().to_vec())
        };

        let frame = encode_frame(flags, &payload);
        match client.send(&frame) {
            Ok(true) => {
                let mut outbound = inner.outbound.lock().expect("outbound queue poisoned");
                outbound.complete_front(CompletionCode::Ok(payload.len()));
            }
            Ok(false) => return, // socket send buffer full; retry on the next on_writable
            Err(err) => {
                tracing::warn!(kind = ?err.kind(), "send failed, disconnecting");
                record_transport_error(inner, err.kind());
                return;
            }
        }
    }
}

fn record_transport_error(inner: &Arc<Inner>, kind: PrxErrorKind) {
    inner.state.lock().expect("connection state poisoned").last_error = Some(kind);
    let job_inner = inner.clone();
    inner.scheduler.do_next(TaskTag::Disconnect, move || disconnect_task(job_inner));
}

/// Drains every fully-assembled message currently buffered in `inbound`,
/// invoking the receiver once per message in arrival order.
fn deliver_inbound(inner: &Arc<Inner>) {
    loop {
        let mut message = {
            let mut inbound = inner.inbound.lock().expect("inbound queue poisoned");
            match InboundStream::assemble(&mut inbound) {
                Some(message) => message,
                None => return,
            }
        };

        let result = inner.receiver.on_message(&mut message);
        message.release(&mut inner.inbound.lock().expect("inbound queue poisoned"));

        match result {
            Ok(()) => {
                inner.state.lock().expect("connection state poisoned").last_error = None;
            }
            Err(err) => {
                tracing::warn!(kind = ?err.kind(), "receiver returned an error, disconnecting");
                record_transport_error(inner, err.kind());
                return;
            }
        }
    }
}

struct ConnTransportEvents {
    inner: Arc<Inner>,
}

impl TransportEvents for ConnTransportEvents {
    fn on_handshake(&self, result: Result<(), PrxError>) {
        let inner = self.inner.clone();
        inner.scheduler.do_next(TaskTag::Connect, move || match result {
            Ok(()) => on_connected(inner),
            Err(err) => {
                let kind = err.kind();
                fail_connect(&inner, kind);
            }
        });
    }

    fn on_frame(&self, frame: WsFrame) {
        let inner = self.inner.clone();
        inner.scheduler.do_next(TaskTag::DeliverRecv, move || on_frame(inner, frame));
    }

    fn on_writable(&self) {
        let inner = self.inner.clone();
        inner.scheduler.do_next(TaskTag::DeliverSend, move || try_flush_send(&inner));
    }

    fn on_closed(&self, reason: Result<(), PrxError>) {
        let inner = self.inner.clone();
        inner.scheduler.do_next(TaskTag::Disconnect, move || on_closed(inner, reason));
    }
}

fn on_connected(inner: Arc<Inner>) {
    let now = inner.clock.now();
    {
        let mut state = inner.state.lock().expect("connection state poisoned");
        if matches!(state.phase, Phase::Closing | Phase::Closed) {
            return;
        }
        state.phase = Phase::Connected;
        state.last_error = None;
        state.back_off = Duration::ZERO;
        state.last_activity = now;
        state.last_success = now;
    }
    try_flush_send(&inner);
}

fn on_frame(inner: Arc<Inner>, frame: WsFrame) {
    match frame {
        WsFrame::Closed => on_closed(inner, Ok(())),
        WsFrame::Binary(bytes) => {
            let Some((flags, payload)) = decode_frame(&bytes) else {
                tracing::warn!("dropped malformed tunnel frame (missing envelope byte)");
                return;
            };
            inner.state.lock().expect("connection state poisoned").last_activity = inner.clock.now();
            {
                let mut inbound = inner.inbound.lock().expect("inbound queue poisoned");
                let mut buf = inbound.acquire(payload.len());
                buf.payload_mut().extend_from_slice(payload);
                buf.set_write_offset(payload.len());
                inbound.enqueue_ready(buf.with_flags(flags));
            }
            deliver_inbound(&inner);
        }
    }
}

fn on_closed(inner: Arc<Inner>, reason: Result<(), PrxError>) {
    let phase = inner.state.lock().expect("connection state poisoned").phase;
    if matches!(phase, Phase::Closing | Phase::Closed) {
        finish_close(&inner);
        return;
    }
    let kind = reason.err().map(|e| e.kind()).unwrap_or(PrxErrorKind::Closed);
    inner.state.lock().expect("connection state poisoned").last_error = Some(kind);
    disconnect_task(inner);
}

/// One leading tag byte (0 = fragment, 1 = message boundary) ahead of the
/// payload. `tungstenite`'s high-level API reassembles WebSocket-level
/// continuation frames into one complete `Message` before we ever see it,
/// so the tunnel's own fragment/message-boundary distinction has to travel
/// as an explicit envelope byte instead of riding the WS frame's FIN bit.
fn encode_frame(flags: BufferFlags, payload: &[u8]) -> Vec<u8> {
    let tag: u8 = if flags.contains(BufferFlags::MESSAGE_BOUNDARY) { 1 } else { 0 };
    let mut out = Vec::with_capacity(payload.len() + 1);
    out.push(tag);
    out.extend_from_slice(payload);
    out
}

fn decode_frame(bytes: &[u8]) -> Option<(BufferFlags, &[u8])> {
    let (tag, payload) = bytes.split_first()?;
    let flags = if *tag == 1 { BufferFlags::MESSAGE_BOUNDARY } else { BufferFlags::FRAGMENT };
    Some((flags, payload))
}

fn resolve_address(url: &Url) -> Result<SocketAddr, PrxErrorKind> {
    let host = url.host_str().ok_or(PrxErrorKind::NoAddress)?;
    let port = url.port_or_known_default().ok_or(PrxErrorKind::NoAddress)?;
    resolve_host_port(host, port)
}

fn resolve_host_port(host: &str, port: u16) -> Result<SocketAddr, PrxErrorKind> {
    use pal_socket::resolver::{Resolver, StdResolver};
    use pal_socket::kind::AddressFamily;

    StdResolver
        .resolve(host, port, AddressFamily::Unspecified)
        .map_err(|_| PrxErrorKind::HostUnknown)?
        .into_iter()
        .next()
        .ok_or(PrxErrorKind::NoAddress)
}

/// Splits a `proxy_host`-shaped `"host:port"` string, per `ConfigSource`'s
/// documented key format.
fn split_host_port(value: &str) -> Result<(String, u16), PrxErrorKind> {
    let (host, port) = value.rsplit_once(':').ok_or(PrxErrorKind::Arg)?;
    let port: u16 = port.parse().map_err(|_| PrxErrorKind::Arg)?;
    Ok((host.to_string(), port))
}

/// `Basic` credentials for the `Proxy-Authorization` header, or `None` when
/// neither `proxy_user` nor `proxy_pwd` is set.
fn proxy_auth_header(proxy: &ProxySettings) -> Option<String> {
    if proxy.user.is_none() && proxy.password.is_none() {
        return None;
    }
    use base64::Engine;
    let user = proxy.user.as_deref().unwrap_or("");
    let password = proxy.password.as_deref().unwrap_or("");
    Some(base64::engine::general_purpose::STANDARD.encode(format!("{user}:{password}")))
}

/// Opens a non-blocking TCP socket and issues `connect`, treating
/// `EINPROGRESS` as success exactly like `pal-socket`'s own `RawSocket`
/// (whose connect/option-setting machinery this reuses rather than
/// duplicating) — the handshake itself is then driven to completion by
/// `ws-worker-pool` once the socket becomes writable.
fn connect_nonblocking(addr: SocketAddr) -> Result<TcpStream, PrxError> {
    let raw = pal_socket::RawSocket::stream(Some(addr)).map_err(PrxError::from)?;
    raw.connect(addr).map_err(PrxError::from)?;
    into_std_stream(raw)
}

/// Issues an HTTP `CONNECT` to `proxy_addr` for `target_host:target_port`,
/// with an optional `Proxy-Authorization: Basic` header, and returns the
/// tunnel socket once the proxy answers `200`. Unlike `connect_nonblocking`,
/// the TCP connect and the `CONNECT` exchange itself block the scheduler
/// task — the same trade `connect_task` already makes for token
/// acquisition above — before the socket is flipped non-blocking to match
/// `connect_nonblocking`'s postcondition for the WS handshake that follows.
fn connect_through_proxy(
    proxy_addr: SocketAddr,
    target_host: &str,
    target_port: u16,
    auth: Option<&str>,
) -> Result<TcpStream, PrxError> {
    use std::io::{BufRead, BufReader, Write};

    let stream = TcpStream::connect(proxy_addr).map_err(PrxError::from)?;

    let mut request =
        format!("CONNECT {target_host}:{target_port} HTTP/1.1\r\nHost: {target_host}:{target_port}\r\n");
    if let Some(auth) = auth {
        request.push_str(&format!("Proxy-Authorization: Basic {auth}\r\n"));
    }
    request.push_str("\r\n");
    (&stream).write_all(request.as_bytes()).map_err(PrxError::from)?;

    let mut reader = BufReader::new(&stream);
    let mut status_line = String::new();
    reader.read_line(&mut status_line).map_err(PrxError::from)?;
    if status_line.split_whitespace().nth(1) != Some("200") {
        return Err(PrxError::new(PrxErrorKind::Refused));
    }
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).map_err(PrxError::from)?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    stream.set_nonblocking(true).map_err(PrxError::from)?;
    Ok(stream)
}

#[cfg(unix)]
fn into_std_stream(raw: pal_socket::RawSocket) -> Result<TcpStream, PrxError> {
    use std::os::unix::io::IntoRawFd;
    Ok(unsafe { TcpStream::from_raw_fd(raw.into_raw_fd()) })
}

#[cfg(unix)]
use std::os::unix::io::FromRawFd;

#[cfg(windows)]
fn into_std_stream(raw: pal_socket::RawSocket) -> Result<TcpStream, PrxError> {
    use std::os::windows::io::{FromRawSocket, IntoRawSocket};
    Ok(unsafe { TcpStream::from_raw_socket(raw.into_raw_socket()) })
}

#[cfg(unix)]
fn raw_handle(stream: &TcpStream) -> ev_port::RawFdLike {
    use std::os::unix::io::AsRawFd;
    stream.as_raw_fd()
}

#[cfg(windows)]
fn raw_handle(stream: &TcpStream) -> ev_port::RawFdLike {
    use std::os::windows::io::AsRawSocket;
    stream.as_raw_socket() as ev_port::RawFdLike
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    use rt_support::{ManualClock, Scheduler};

    struct EchoReceiver {
        tx: Mutex<mpsc::Sender<Vec<u8>>>,
    }

    impl Receiver for EchoReceiver {
        fn on_message(&self, stream: &mut InboundStream) -> Result<(), PrxError> {
            let mut buf = vec![0u8; stream.readable()];
            stream.read(&mut buf);
            let _ = self.tx.lock().unwrap().send(buf);
            Ok(())
        }
    }

    #[test]
    fn frame_envelope_round_trips_flags() {
        let encoded = encode_frame(BufferFlags::FRAGMENT, b"hello");
        let (flags, payload) = decode_frame(&encoded).unwrap();
        assert!(flags.contains(BufferFlags::FRAGMENT));
        assert_eq!(payload, b"hello");

        let encoded = encode_frame(BufferFlags::MESSAGE_BOUNDARY, b"world");
        let (flags, payload) = decode_frame(&encoded).unwrap();
        assert!(flags.contains(BufferFlags::MESSAGE_BOUNDARY));
        assert_eq!(payload, b"world");
    }

    #[test]
    fn connect_through_proxy_sends_connect_request_with_basic_auth() {
        use std::io::{BufRead, BufReader, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let proxy_addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::channel();
        let server = std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            let mut headers = Vec::new();
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if line == "\r\n" || line.is_empty() {
                    break;
                }
                headers.push(line);
            }
            stream.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").unwrap();
            let _ = tx.send((request_line, headers));
        });

        let proxy = ProxySettings {
            host: None,
            user: Some("alice".into()),
            password: Some("secret".into()),
        };
        let auth = proxy_auth_header(&proxy);
        let stream = connect_through_proxy(proxy_addr, "target.example", 443, auth.as_deref()).unwrap();
        drop(stream);

        let (request_line, headers) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(request_line, "CONNECT target.example:443 HTTP/1.1\r\n");
        assert!(headers.iter().any(|h| h.starts_with("Proxy-Authorization: Basic ")));
        server.join().unwrap();
    }

    #[test]
    fn proxy_auth_header_is_none_without_credentials() {
        assert!(proxy_auth_header(&ProxySettings::default()).is_none());
    }

    #[test]
    fn status_starts_disconnected_and_closes_synchronously_with_no_client() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Scheduler::new(clock.clone());
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let (tx, _rx) = mpsc::channel();
        let receiver: Arc<dyn Receiver> = Arc::new(EchoReceiver { tx: Mutex::new(tx) });

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
            receiver,
        );
        assert_eq!(conn.status(), Status::Disconnected);

        let worker = scheduler.spawn_worker();
        conn.close();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while conn.status() != Status::Closed && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(conn.status(), Status::Closed);
        scheduler.stop();
        let _ = worker.join();
    }

    #[test]
    fn send_after_close_completes_aborted() {
        let clock = Arc::new(ManualClock::new());
        let scheduler = Scheduler::new(clock.clone());
        let pool = Arc::new(WorkerPool::new(1).unwrap());
        let (tx, _rx) = mpsc::channel();
        let receiver: Arc<dyn Receiver> = Arc::new(EchoReceiver { tx: Mutex::new(tx) });
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
            receiver,
        );

        let worker = scheduler.spawn_worker();
        conn.close();

        let completions = Arc::new(AtomicUsize::new(0));
        let counter = completions.clone();
        conn.send(
            |stream| stream.write(b"late"),
            move |code| {
                assert_eq!(code, CompletionCode::Aborted);
                counter.fetch_add(1, Ordering::SeqCst);
            },
        );

        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while completions.load(Ordering::SeqCst) == 0 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(completions.load(Ordering::SeqCst), 1);
        scheduler.stop();
        let _ = worker.join();
    }
}
