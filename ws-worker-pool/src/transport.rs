//! The non-blocking WebSocket transport contract a worker drives on behalf
//! of a `ws-connection`: connect / poll-handshake / non-blocking frame
//! write / non-blocking frame read / close, expressed as a plain trait per
//! mio's idiom of trait objects at adapter seams.

use prx_error::PrxError;

/// One inbound WebSocket frame, already stripped of the wire framing
/// tungstenite/`ws-worker-pool` handles — `ws-connection` only ever sees
/// `Binary` payloads (the tunnel wire format never uses text frames) and
/// `Closed`.
#[derive(Debug)]
pub enum WsFrame {
    Binary(Vec<u8>),
    Closed,
}

/// Whether the handshake has completed, is still in progress, or failed.
pub enum HandshakeStatus {
    Pending,
    Complete,
    Failed(PrxError),
}

/// A single non-blocking WebSocket connection, driven entirely from a
/// `ws-worker-pool` worker thread. Every method must return promptly — they
/// all run on the event port's own dispatch thread.
pub trait WsTransport: Send {
    /// Advances the opening handshake. Called repeatedly as the
    /// underlying socket becomes readable/writable until it returns
    /// anything other than `Pending`.
    fn poll_handshake(&mut self) -> HandshakeStatus;

    /// Attempts to write `frame` as a binary WebSocket message without
    /// blocking. `Ok(true)` means fully written; `Ok(false)` means the
    /// underlying socket's send buffer is full and the caller should retry
    /// once writable again.
    fn begin_send(&mut self, frame: &[u8]) -> Result<bool, PrxError>;

    /// Polls for a fully-received frame without blocking. `Ok(None)` means
    /// no complete frame is available yet.
    fn poll_frame(&mut self) -> Result<Option<WsFrame>, PrxError>;

    /// Starts (or continues) a graceful WebSocket close handshake.
    fn close(&mut self) -> Result<(), PrxError>;
}
