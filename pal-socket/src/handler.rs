//! The per-socket event protocol, split one-method-per-event instead of the
//! single `(ctx, event, buffer, size, addr, flags, error, op_context)`
//! callback so each event carries its own typed payload.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use prx_error::PrxError;

use crate::PalSocket;

/// What a listener wants done with a freshly-accepted connection. Accepting
/// requires a handler for the new socket up front: `drain_accept` registers
/// the accepted connection under it before `end_accept` ever runs.
pub enum AcceptDecision {
    Accept(Arc<dyn SocketHandler>),
    Reject,
}

pub trait SocketHandler: Send + Sync {
    /// Fires exactly once: on success after connect (or immediately for a
    /// listener/datagram socket with no connect step), or carrying the
    /// failure that will be followed by `closed`.
    fn opened(&self, result: Result<(), PrxError>) {
        let _ = result;
    }

    /// A listener's read edge fired; a peer is waiting in the accept queue.
    /// Default rejects — there is no handler to hand the new socket to.
    fn begin_accept(&self) -> AcceptDecision {
        AcceptDecision::Reject
    }

    /// The accepted connection already registered under the handler
    /// `begin_accept` supplied, paired with the peer's address, or the
    /// reason accept failed.
    fn end_accept(&self, result: Result<(PalSocket, SocketAddr), PrxError>) {
        let _ = result;
    }

    /// The read edge fired; offer a buffer to fill, or `None` to leave the
    /// edge unconsumed (temporary back-pressure — `can_recv(true)` later to
    /// resume).
    fn begin_recv(&self) -> Option<BytesMut> {
        None
    }

    /// `buffer` holds the bytes actually read (truncated from what
    /// `begin_recv` offered); `source` is set for datagram sockets.
    /// `error = Some(Closed)` signals end-of-stream.
    fn end_recv(&self, buffer: BytesMut, source: Option<SocketAddr>, error: Option<PrxError>) {
        let _ = (buffer, source, error);
    }

    /// The write edge fired and there's spare send capacity; offer payload
    /// to send, or `None` if nothing is queued (interest is cleared until
    /// `can_send(true)`).
    fn begin_send(&self) -> Option<(Bytes, Option<SocketAddr>)> {
        None
    }

    fn end_send(&self, result: Result<usize, PrxError>) {
        let _ = result;
    }

    /// Fires exactly once, before the handle is torn down.
    fn closed(&self, reason: Result<(), PrxError>) {
        let _ = reason;
    }
}
