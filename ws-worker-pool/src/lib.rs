//! Pool of OS threads, each multiplexing WebSocket transports over its own
//! `ev-port` instance. `ws-connection` uses this crate as the glue between
//! its reconnect/framing logic and the non-blocking WebSocket wire
//! protocol; it never touches `tungstenite` directly.

mod pool;
mod transport;
mod tungstenite_transport;

pub use pool::{ClientHandle, TransportEvents, WorkerPool};
pub use transport::{HandshakeStatus, WsFrame, WsTransport};
pub use tungstenite_transport::TungsteniteTransport;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_with_requested_worker_count() {
        let pool = WorkerPool::new(2).unwrap();
        assert_eq!(pool.worker_count(), 2);
    }
}
