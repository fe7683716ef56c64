//! OS-abstract readiness-notification layer: one worker thread per port
//! driving a platform `Selector`, dispatching `read`/`write`/`close`/`error`
//! to registered handlers. See `sys` for the four backend implementations
//! this hides behind a single `cfg`-free API.

pub mod event;
pub mod interest;
mod registry;
pub mod sys;
pub mod token;

use std::cell::Cell;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

pub use event::{EventType, Flow, Handler, Readiness};
pub use interest::Interest;
pub use sys::{Backend, RawEvent, RawFdLike, Selector};
pub use token::Token;

use registry::{Registration, Registry};

/// Reserved token for the port's own [`sys::Waker`] registration; real
/// handles are assigned densely from 0 by `Registry::insert` and never
/// reach `usize::MAX`.
const WAKER_TOKEN: Token = Token(usize::MAX);

/// Handle returned by [`EventPort::register`]; opaque to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventHandle(u32);

thread_local! {
    /// The handle whose callback is currently executing on *this* thread,
    /// if any. Only ever set by a port's own worker thread. Lets `close`
    /// detect the "handler closes its own handle" reentrancy the port must defer.
    static DISPATCHING: Cell<Option<u32>> = Cell::new(None);
}

struct DispatchGuard(u32);

impl DispatchGuard {
    fn enter(handle: u32) -> DispatchGuard {
        DISPATCHING.with(|cell| cell.set(Some(handle)));
        DispatchGuard(handle)
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|cell| cell.set(None));
    }
}

struct Inner {
    selector: Selector,
    registry: Mutex<Registry>,
    running: AtomicBool,
    backend: Backend,
    waker: sys::Waker,
}

/// An OS-abstract event port: `register`/`select`/`clear`/`close` over one
/// of the four platform selectors.
pub struct EventPort {
    inner: Arc<Inner>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl EventPort {
    /// Opens a port on the platform's native backend.
    pub fn new() -> io::Result<Arc<EventPort>> {
        Self::with_backend(Backend::native())
    }

    pub fn with_backend(backend: Backend) -> io::Result<Arc<EventPort>> {
        let selector = Selector::new(backend)?;
        let waker = selector.make_waker(WAKER_TOKEN)?;
        let inner = Arc::new(Inner {
            selector,
            registry: Mutex::new(Registry::default()),
            running: AtomicBool::new(true),
            backend,
            waker,
        });

        let port = Arc::new(EventPort { inner: inner.clone(), worker: Mutex::new(None) });
        let worker_inner = inner.clone();
        let handle = std::thread::Builder::new()
            .name("ev-port-worker".into())
            .spawn(move || dispatch_loop(worker_inner))
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        *port.worker.lock().unwrap() = Some(handle);
        Ok(port)
    }

    pub fn backend(&self) -> Backend {
        self.inner.backend
    }

    /// Registers `fd` for `interest`, setting it non-blocking. `handler` is
    /// invoked for every edge; see [`EventType`] for the event taxonomy.
    pub fn register<H>(&self, fd: RawFdLike, handler: H, interest: Interest) -> io::Result<EventHandle>
    where
        H: Handler + 'static,
    {
        set_nonblocking(fd)?;
        let mut registry = self.inner.registry.lock().unwrap();
        let reg = Registration { fd, handler: Arc::new(handler), interest, close_fd: true, closing: false };
        let slot = registry.insert(reg);
        if let Err(err) = self.inner.selector.register(fd, Token(slot as usize), interest) {
            registry.remove(slot);
            return Err(err);
        }
        Ok(EventHandle(slot))
    }

    /// Adds `interest` bits to an existing registration.
    pub fn select(&self, handle: EventHandle, interest: Interest) -> io::Result<()> {
        self.mutate_interest(handle, |current| current.with(interest))
    }

    /// Removes `interest` bits from an existing registration.
    pub fn clear(&self, handle: EventHandle, interest: Interest) -> io::Result<()> {
        self.mutate_interest(handle, |current| current.without(interest))
    }

    fn mutate_interest(
        &self,
        handle: EventHandle,
        f: impl FnOnce(Interest) -> Interest,
    ) -> io::Result<()> {
        let mut registry = self.inner.registry.lock().unwrap();
        let reg = registry
            .get_mut(handle.0)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let new_interest = f(reg.interest);
        reg.interest = new_interest;
        self.inner.selector.reregister(reg.fd, Token(handle.0 as usize), new_interest)
    }

    /// Tears down `handle`. If called from inside that handle's own
    /// callback, the actual unregister/free and the `Destroy` dispatch are
    /// deferred until the enclosing drain loop returns.
    pub fn close(&self, handle: EventHandle, close_fd: bool) -> io::Result<()> {
        let reentrant = DISPATCHING.with(|cell| cell.get() == Some(handle.0));

        let mut registry = self.inner.registry.lock().unwrap();
        let Some(reg) = registry.get_mut(handle.0) else {
            return Ok(()); // already closed
        };
        if reg.closing {
            return Ok(());
        }
        reg.closing = true;
        reg.close_fd = close_fd;
        let fd = reg.fd;
        let _ = self.inner.selector.deregister(fd);

        if reentrant {
            // The worker's dispatch loop will finish the removal once the
            // currently-running callback for this handle returns.
            return Ok(());
        }

        let removed = registry.remove(handle.0).expect("just verified present");
        drop(registry);
        removed.handler.handle(EventType::Destroy, None);
        if removed.close_fd {
            close_raw(removed.fd);
        }
        Ok(())
    }

    pub fn shutdown(&self) {
        self.inner.running.store(false, Ordering::SeqCst);
        let _ = self.inner.waker.wake();
        if let Some(handle) = self.worker.lock().unwrap().take() {
            let _ = handle.join();
        }
    }
}

impl Drop for EventPort {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn dispatch_loop(inner: Arc<Inner>) {
    let mut events: Vec<RawEvent> = Vec::with_capacity(256);
    // Only the generic poll backend needs a periodic wake to notice a
    // cancelled port: it has no edge-triggered re-arm to rely on. Epoll,
    // kqueue and WinSelect are woken directly by `shutdown`'s waker, so
    // they can block indefinitely.
    let timeout = match inner.backend {
        Backend::Poll => Some(Duration::from_secs(600)),
        Backend::Epoll | Backend::Kqueue | Backend::WinSelect => None,
    };

    while inner.running.load(Ordering::SeqCst) {
        if let Err(err) = inner.selector.select(&mut events, timeout) {
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            tracing::warn!(%err, "selector wait failed");
            continue;
        }

        for raw in events.drain(..) {
            if raw.token == WAKER_TOKEN {
                inner.waker.ack();
                continue;
            }
            dispatch_one(&inner, raw);
        }
    }
}

fn dispatch_one(inner: &Arc<Inner>, raw: RawEvent) {
    let handle = raw.token.0 as u32;

    let (handler, close_on_hup) = {
        let registry = inner.registry.lock().unwrap();
        match registry.get(handle) {
            Some(reg) if !reg.closing => (reg.handler.clone(), raw.read_closed || raw.write_closed),
            _ => return,
        }
    };

    let _guard = DispatchGuard::enter(handle);

    if raw.error && !is_closing(inner, handle) {
        // ev-port only sees EPOLLERR/EV_ERROR/POLLERR/WinSock error bits; the
        // concrete errno is resolved by pal-socket via SO_ERROR.
        handler.handle(EventType::Error, None);
    }

    if (raw.readable || close_on_hup) && !is_closing(inner, handle) {
        drain(inner, handle, &handler, EventType::Read);
    }
    if raw.writable && !is_closing(inner, handle) {
        drain(inner, handle, &handler, EventType::Write);
    }
    if close_on_hup && !is_closing(inner, handle) {
        handler.handle(EventType::Close, None);
    }

    finish_if_closing(inner, handle);
}

fn is_closing(inner: &Arc<Inner>, handle: u32) -> bool {
    inner.registry.lock().unwrap().get(handle).map(|reg| reg.closing).unwrap_or(true)
}

fn drain(inner: &Arc<Inner>, handle: u32, handler: &Arc<dyn Handler>, event: EventType) {
    loop {
        match handler.handle(event, None) {
            Flow::More if !is_closing(inner, handle) => continue,
            _ => break,
        }
    }
}

fn finish_if_closing(inner: &Arc<Inner>, handle: u32) {
    let removed = {
        let mut registry = inner.registry.lock().unwrap();
        match registry.get(handle) {
            Some(reg) if reg.closing => registry.remove(handle),
            _ => None,
        }
    };
    if let Some(reg) = removed {
        reg.handler.handle(EventType::Destroy, None);
        if reg.close_fd {
            close_raw(reg.fd);
        }
    }
}

#[cfg(unix)]
fn set_nonblocking(fd: RawFdLike) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(io::Error::last_os_error());
    }
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(windows)]
fn set_nonblocking(fd: RawFdLike) -> io::Result<()> {
    let mut nonblocking: u32 = 1;
    let ret = unsafe {
        windows_sys::Win32::Networking::WinSock::ioctlsocket(
            fd,
            windows_sys::Win32::Networking::WinSock::FIONBIO,
            &mut nonblocking,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
fn close_raw(fd: RawFdLike) {
    unsafe {
        libc::close(fd);
    }
}

#[cfg(windows)]
fn close_raw(fd: RawFdLike) {
    unsafe {
        windows_sys::Win32::Networking::WinSock::closesocket(fd);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    struct CountingHandler {
        reads: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        destroys: Arc<AtomicUsize>,
        tx: mpsc::Sender<()>,
    }

    impl Handler for CountingHandler {
        fn handle(&self, event: EventType, _error: Option<prx_error::PrxErrorKind>) -> Flow {
            match event {
                EventType::Read => {
                    self.reads.fetch_add(1, Ordering::SeqCst);
                    let _ = self.tx.send(());
                    Flow::Done
                }
                EventType::Close => {
                    self.closes.fetch_add(1, Ordering::SeqCst);
                    Flow::Done
                }
                EventType::Destroy => {
                    self.destroys.fetch_add(1, Ordering::SeqCst);
                    Flow::Done
                }
                _ => Flow::Done,
            }
        }
    }

    #[cfg(unix)]
    #[test]
    fn pipe_write_wakes_read_handler() {
        use std::io::Write;
        use std::os::fd::{FromRawFd, IntoRawFd};

        let port = EventPort::new().expect("port");
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let (read_fd, write_fd) = (fds[0], fds[1]);

        let reads = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let destroys = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();

        let handler = CountingHandler {
            reads: reads.clone(),
            closes: closes.clone(),
            destroys: destroys.clone(),
            tx,
        };
        let handle = port.register(read_fd, handler, Interest::READABLE).expect("register");

        let mut writer = unsafe { std::fs::File::from_raw_fd(write_fd) };
        writer.write_all(b"x").unwrap();

        rx.recv_timeout(Duration::from_secs(2)).expect("handler fired");
        assert_eq!(reads.load(Ordering::SeqCst), 1);

        port.close(handle, true).unwrap();
        assert_eq!(destroys.load(Ordering::SeqCst), 1);
        let _ = writer.into_raw_fd();
    }

    #[cfg(unix)]
    #[test]
    fn close_is_idempotent() {
        let port = EventPort::new().expect("port");
        let mut fds = [0i32; 2];
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        let reads = Arc::new(AtomicUsize::new(0));
        let closes = Arc::new(AtomicUsize::new(0));
        let destroys = Arc::new(AtomicUsize::new(0));
        let (tx, _rx) = mpsc::channel();
        let handler = CountingHandler { reads, closes, destroys: destroys.clone(), tx };
        let handle = port.register(fds[0], handler, Interest::READABLE).expect("register");

        port.close(handle, true).unwrap();
        port.close(handle, true).unwrap();
        assert_eq!(destroys.load(Ordering::SeqCst), 1);
        unsafe {
            libc::close(fds[1]);
        }
    }
}
