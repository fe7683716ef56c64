use std::sync::Arc;

use prx_error::PrxErrorKind;

/// The event types a registered handler is invoked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Read,
    Write,
    Close,
    Error,
    /// Dispatched exactly once per registration, during `close`, after every
    /// other callback for that handle has returned.
    Destroy,
}

/// What a handler returns from a `Read`/`Write` dispatch, telling the port
/// whether to keep draining in its inner loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep calling the handler for this event type; more work may be
    /// ready immediately.
    More,
    /// Stop the inner drain loop (typically because the caller observed
    /// `WouldBlock`/`EAGAIN`, or chose to pause).
    Done,
}

/// A single readiness outcome delivered to a handler.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub read_closed: bool,
    pub write_closed: bool,
}

/// The callback installed at `register` time. Handlers must never block —
/// they run on the event port's own dispatch thread.
pub trait Handler: Send + Sync {
    fn handle(&self, event: EventType, error: Option<PrxErrorKind>) -> Flow;
}

impl<F> Handler for F
where
    F: Fn(EventType, Option<PrxErrorKind>) -> Flow + Send + Sync,
{
    fn handle(&self, event: EventType, error: Option<PrxErrorKind>) -> Flow {
        self(event, error)
    }
}

/// Lets callers register an `Arc<SomeHandler>` they're also holding onto
/// elsewhere (e.g. to drive it from outside the dispatch loop), instead of
/// having `register` wrap it in a second `Arc`.
impl<T: Handler + ?Sized> Handler for Arc<T> {
    fn handle(&self, event: EventType, error: Option<PrxErrorKind>) -> Flow {
        (**self).handle(event, error)
    }
}
