//! Worker pool: a fixed-size set of OS threads, each driving its own
//! `ev-port` instance and a bounded set of `WsTransport` state machines,
//! handing frames to connections via channel. `MAX_WEBSOCKET_PER_WORKER`
//! is derived from the process fd table size (`getdtablesize() - 1`),
//! matching the OS-imposed ceiling on open sockets per process.

use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use ev_port::event::{EventType, Flow, Handler as EvHandler};
use ev_port::{EventHandle, EventPort, Interest, RawFdLike};
use prx_error::{PrxError, PrxErrorKind};

use crate::transport::{HandshakeStatus, WsFrame, WsTransport};

/// Callbacks a `ws-connection` supplies when registering a transport with
/// the pool. Every call happens on the owning worker thread, so the
/// connection's own single-threaded scheduler is the only place these
/// should touch connection state (typically by forwarding to it via its
/// own channel/task queue).
pub trait TransportEvents: Send + Sync {
    fn on_handshake(&self, result: Result<(), PrxError>);
    fn on_frame(&self, frame: WsFrame);
    /// The transport can accept more `begin_send` calls.
    fn on_writable(&self);
    fn on_closed(&self, reason: Result<(), PrxError>);
}

fn max_websockets_per_worker() -> usize {
    #[cfg(unix)]
    {
        let limit = unsafe { libc::sysconf(libc::_SC_OPEN_MAX) };
        (limit.max(2) - 1) as usize
    }
    #[cfg(not(unix))]
    {
        4096
    }
}

struct Adapter {
    transport: Mutex<Box<dyn WsTransport>>,
    events: Arc<dyn TransportEvents>,
    handshake_done: std::sync::atomic::AtomicBool,
}

impl EvHandler for Adapter {
    fn handle(&self, event: EventType, error: Option<PrxErrorKind>) -> Flow {
        let mut transport = self.transport.lock().unwrap();

        if let Some(kind) = error {
            self.events.on_closed(Err(PrxError::new(kind)));
            return Flow::Done;
        }

        if matches!(event, EventType::Destroy) {
            return Flow::Done;
        }

        if !self.handshake_done.load(Ordering::Acquire) {
            match transport.poll_handshake() {
                HandshakeStatus::Pending => return Flow::Done,
                HandshakeStatus::Complete => {
                    self.handshake_done.store(true, Ordering::Release);
                    self.events.on_handshake(Ok(()));
                }
                HandshakeStatus::Failed(err) => {
                    self.events.on_handshake(Err(err));
                    return Flow::Done;
                }
            }
        }

        match event {
            EventType::Read => loop {
                match transport.poll_frame() {
                    Ok(Some(WsFrame::Closed)) => {
                        self.events.on_closed(Ok(()));
                        return Flow::Done;
                    }
                    Ok(Some(frame)) => self.events.on_frame(frame),
                    Ok(None) => return Flow::Done,
                    Err(e) => {
                        self.events.on_closed(Err(e));
                        return Flow::Done;
                    }
                }
            },
            EventType::Write => {
                self.events.on_writable();
                Flow::Done
            }
            EventType::Close => {
                self.events.on_closed(Ok(()));
                Flow::Done
            }
            _ => Flow::Done,
        }
    }
}

/// A transport's registration with the pool; releasing it unregisters
/// from the owning worker's `ev-port` and drops its slot. Cheaply
/// `Clone`-able (an `Arc<Worker>` plus a `Copy` handle) so a connection can
/// keep one for sending while handing another off to be consumed by
/// `close`.
#[derive(Clone)]
pub struct ClientHandle {
    worker: Arc<Worker>,
    event_handle: EventHandle,
}

impl ClientHandle {
    pub fn send(&self, frame: &[u8]) -> Result<bool, PrxError> {
        let adapter = self.worker.adapter_for(self.event_handle)?;
        adapter.transport.lock().unwrap().begin_send(frame)
    }

    pub fn close(self) -> Result<(), PrxError> {
        self.worker.release(self.event_handle);
        self.worker.port.close(self.event_handle, true).map_err(PrxError::from)
    }
}

struct Worker {
    port: Arc<EventPort>,
    clients: Mutex<Vec<(EventHandle, Arc<Adapter>)>>,
    cap: usize,
}

impl Worker {
    fn load(&self) -> usize {
        self.clients.lock().unwrap().len()
    }

    fn has_capacity(&self) -> bool {
        self.load() < self.cap
    }

    fn adapter_for(&self, handle: EventHandle) -> Result<Arc<Adapter>, PrxError> {
        self.clients
            .lock()
            .unwrap()
            .iter()
            .find(|(h, _)| *h == handle)
            .map(|(_, a)| a.clone())
            .ok_or_else(|| PrxError::new(PrxErrorKind::NotFound))
    }

    fn release(&self, handle: EventHandle) {
        self.clients.lock().unwrap().retain(|(h, _)| *h != handle);
    }
}

/// A fixed-size set of worker threads, each multiplexing up to
/// `MAX_WEBSOCKET_PER_WORKER` WebSocket transports over its own
/// `ev-port::EventPort`.
pub struct WorkerPool {
    workers: Vec<Arc<Worker>>,
    next: AtomicUsize,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> io::Result<WorkerPool> {
        let cap = max_websockets_per_worker();
        let mut workers = Vec::with_capacity(worker_count.max(1));
        for _ in 0..worker_count.max(1) {
            let port = EventPort::new()?;
            workers.push(Arc::new(Worker { port, clients: Mutex::new(Vec::new()), cap }));
        }
        Ok(WorkerPool { workers, next: AtomicUsize::new(0) })
    }

    /// Registers a connected, non-blocking socket plus its driving
    /// transport with whichever worker has spare capacity, round-robin
    /// among those that do.
    pub fn register(
        &self,
        fd: RawFdLike,
        transport: Box<dyn WsTransport>,
        events: Arc<dyn TransportEvents>,
    ) -> Result<ClientHandle, PrxError> {
        let start = self.next.fetch_add(1, Ordering::Relaxed) % self.workers.len();
        let worker = (0..self.workers.len())
            .map(|i| &self.workers[(start + i) % self.workers.len()])
            .find(|w| w.has_capacity())
            .ok_or_else(|| PrxError::new(PrxErrorKind::NoMore))?;

        let adapter = Arc::new(Adapter {
            transport: Mutex::new(transport),
            events,
            handshake_done: std::sync::atomic::AtomicBool::new(false),
        });
        let event_handle = worker
            .port
            .register(fd, adapter.clone(), Interest::READABLE | Interest::WRITABLE)
            .map_err(PrxError::from)?;
        worker.clients.lock().unwrap().push((event_handle, adapter));

        Ok(ClientHandle { worker: worker.clone(), event_handle })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}
