//! Drives `tungstenite`'s `WebSocket<S>` state machine in non-blocking
//! mode. TLS (`wss`) goes through `native-tls`, the same crate the
//! teacher's sibling examples already depend on for TLS.

use std::io;
use std::net::TcpStream;

use native_tls::TlsConnector;
use tungstenite::client::IntoClientRequest;
use tungstenite::handshake::{client::ClientHandshake, HandshakeError, MidHandshake};
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};
use url::Url;

use prx_error::{PrxError, PrxErrorKind};

use crate::transport::{HandshakeStatus, WsFrame, WsTransport};

type Stream = MaybeTlsStream<TcpStream>;

enum State {
    Handshaking(Option<MidHandshake<ClientHandshake<Stream>>>),
    Open(WebSocket<Stream>),
    Failed,
}

pub struct TungsteniteTransport {
    state: State,
}

impl TungsteniteTransport {
    /// `stream` must already be connected (possibly still `EINPROGRESS`)
    /// and registered non-blocking with the worker's `ev-port`; this type
    /// only drives the WebSocket upgrade and framing on top of it.
    ///
    /// `secure` decides TLS independently of `url.scheme()` so a caller can
    /// force TLS over a `ws://` URL (spec's `connect_flag` bit 0x2).
    /// `extra_headers` are appended to the handshake request verbatim —
    /// `ws-connection` uses this to carry its configured user/password
    /// header pair.
    pub fn connect(
        url: &Url,
        stream: TcpStream,
        secure: bool,
        extra_headers: &[(String, String)],
    ) -> Result<TungsteniteTransport, PrxError> {
        stream.set_nonblocking(true).map_err(PrxError::from)?;
        let tls_stream = if secure {
            let connector = TlsConnector::new().map_err(|e| {
                PrxError::with_source(PrxErrorKind::Fatal, e)
            })?;
            // native-tls's blocking handshake is acceptable here only
            // because the caller already waited for TCP connect; a fully
            // non-blocking TLS handshake is out of scope for this layer.
            let tls = connector
                .connect(url.host_str().unwrap_or_default(), stream)
                .map_err(|e| PrxError::with_source(PrxErrorKind::Refused, e))?;
            MaybeTlsStream::NativeTls(tls)
        } else {
            MaybeTlsStream::Plain(stream)
        };

        let mut request = url.as_str().into_client_request().map_err(|e| {
            PrxError::with_source(PrxErrorKind::Arg, e)
        })?;
        for (name, value) in extra_headers {
            let (Ok(name), Ok(value)) = (
                tungstenite::http::HeaderName::from_bytes(name.as_bytes()),
                tungstenite::http::HeaderValue::from_str(value),
            ) else {
                continue;
            };
            request.headers_mut().insert(name, value);
        }

        match tungstenite::client(request, tls_stream) {
            Ok((ws, _response)) => Ok(TungsteniteTransport { state: State::Open(ws) }),
            Err(HandshakeError::Interrupted(mid)) => {
                Ok(TungsteniteTransport { state: State::Handshaking(Some(mid)) })
            }
            Err(HandshakeError::Failure(e)) => Err(PrxError::with_source(PrxErrorKind::Refused, e)),
        }
    }
}

impl WsTransport for TungsteniteTransport {
    fn poll_handshake(&mut self) -> HandshakeStatus {
        match &mut self.state {
            State::Open(_) => HandshakeStatus::Complete,
            State::Failed => HandshakeStatus::Failed(PrxError::new(PrxErrorKind::Closed)),
            State::Handshaking(mid) => {
                let handshake = mid.take().expect("handshake state only taken once per poll");
                match handshake.handshake() {
                    Ok((ws, _response)) => {
                        self.state = State::Open(ws);
                        HandshakeStatus::Complete
                    }
                    Err(HandshakeError::Interrupted(mid)) => {
                        self.state = State::Handshaking(Some(mid));
                        HandshakeStatus::Pending
                    }
                    Err(HandshakeError::Failure(e)) => {
                        self.state = State::Failed;
                        HandshakeStatus::Failed(PrxError::with_source(PrxErrorKind::Refused, e))
                    }
                }
            }
        }
    }

    fn begin_send(&mut self, frame: &[u8]) -> Result<bool, PrxError> {
        let ws = match &mut self.state {
            State::Open(ws) => ws,
            _ => return Err(PrxError::new(PrxErrorKind::BadState)),
        };
        match ws.send(Message::Binary(frame.to_vec().into())) {
            Ok(()) => Ok(true),
            Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(map_ws_error(e)),
        }
    }

    fn poll_frame(&mut self) -> Result<Option<WsFrame>, PrxError> {
        let ws = match &mut self.state {
            State::Open(ws) => ws,
            _ => return Err(PrxError::new(PrxErrorKind::BadState)),
        };
        match ws.read() {
            Ok(Message::Binary(data)) => Ok(Some(WsFrame::Binary(data.to_vec()))),
            Ok(Message::Close(_)) => Ok(Some(WsFrame::Closed)),
            Ok(_) => Ok(None),
            Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(tungstenite::Error::ConnectionClosed) => Ok(Some(WsFrame::Closed)),
            Err(e) => Err(map_ws_error(e)),
        }
    }

    fn close(&mut self) -> Result<(), PrxError> {
        let ws = match &mut self.state {
            State::Open(ws) => ws,
            _ => return Ok(()),
        };
        match ws.close(None) {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::Io(e)) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(map_ws_error(e)),
        }
    }
}

fn map_ws_error(err: tungstenite::Error) -> PrxError {
    use tungstenite::Error::*;
    let kind = match &err {
        ConnectionClosed | AlreadyClosed => PrxErrorKind::Closed,
        Protocol(_) => PrxErrorKind::Arg,
        Capacity(_) => PrxErrorKind::OutOfMemory,
        _ => PrxErrorKind::Unknown,
    };
    PrxError::with_source(kind, err)
}
