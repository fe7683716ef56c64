//! Authenticated, reconnecting, message-framing tunnel over a single
//! WebSocket, driven by a per-connection scheduler .
//!
//! Layering: [`connection::WsConnection`] owns the reconnect/back-off state
//! machine and the send/receive pipelines; it drives a
//! [`ws_worker_pool::WorkerPool`] for the non-blocking wire protocol and an
//! [`rt_support::Scheduler`] for every state transition, so its own fields
//! never need locking beyond what hands a worker-thread callback back onto
//! that scheduler.

mod backoff;
mod config;
mod connection;
mod status;
mod token;

pub use config::{ConfigSource, ConnectFlags, ProxySettings, StaticConfig, CONNECT_FLAG_SECURE};
pub use connection::{Receiver, Reconnect, WsConnection};
pub use status::Status;
pub use token::{StaticTokenProvider, Token, TokenProvider};
