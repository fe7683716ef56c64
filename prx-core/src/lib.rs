//! Reverse-tunnel proxy runtime core.
//!
//! This crate is a facade: it re-exports the public surface of every layer
//! so a caller can depend on `prx-core` alone instead of naming each layer
//! crate, the way mio's top-level `mio` crate is the one thing most
//! users depend on even though the OS backends live in their own modules.
//!
//! # Layers
//!
//! - [`prx_error`] — the canonical error taxonomy every other layer's
//!   `Result` resolves to.
//! - [`rt_support`] — the handle map, injectable clock, and single-threaded
//!   scheduler each connection owns.
//! - [`ev_port`] — OS-abstract readiness notification (L0).
//! - [`pal_socket`] — per-socket event state machine and resolver glue (L1).
//! - [`io_queue`] / [`ws_stream`] — the buffer queue and streaming
//!   reader/writer facade over it (L2).
//! - [`ws_worker_pool`] — the pool of OS threads multiplexing WebSocket
//!   transports (L3 support).
//! - [`ws_connection`] — the reconnecting, authenticated, framing tunnel
//!   (L3), re-exported at the crate root since it's the type most callers
//!   reach for first.
//!
//! A typical embedder constructs an [`rt_support::Scheduler`], a
//! [`ws_worker_pool::WorkerPool`], and one [`WsConnection`] per logical
//! tunnel, then drives traffic through [`WsConnection::send`] and a
//! [`Receiver`] implementation. See `demos/` for runnable end-to-end
//! programs.

pub use ev_port;
pub use io_queue;
pub use pal_socket;
pub use prx_error;
pub use rt_support;
pub use ws_connection;
pub use ws_stream;
pub use ws_worker_pool;

pub use prx_error::{ErrorGroup, PrxError, PrxErrorKind};
pub use ws_connection::{
    ConfigSource, ConnectFlags, ProxySettings, Receiver, Reconnect, StaticConfig,
    StaticTokenProvider, Status, Token, TokenProvider, WsConnection,
};
