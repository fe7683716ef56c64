//! Per-OS selector backends behind one shared shape: a trait plus one
//! module per platform instead of a `#ifdef` forest. Each backend exposes
//! the same inherent methods (`new`, `select`, `register`, `reregister`,
//! `deregister`) so [`crate::port`] never branches on `cfg` itself; only
//! this module does.

use crate::{Interest, Token};

/// One readiness outcome reported by a selector's `select` call.
#[derive(Debug, Clone, Copy)]
pub struct RawEvent {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    pub error: bool,
    pub read_closed: bool,
    pub write_closed: bool,
}

/// Which concrete backend an [`crate::EventPort`] is driving. Exposed so
/// callers/tests can force a specific backend (e.g. the generic `Poll`
/// backend is available on every Unix, not only as a fallback).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Epoll,
    Kqueue,
    Poll,
    WinSelect,
}

impl Backend {
    /// The backend `EventPort::new` picks when the caller doesn't ask for
    /// one explicitly.
    pub const fn native() -> Backend {
        #[cfg(any(target_os = "linux", target_os = "android"))]
        {
            Backend::Epoll
        }
        #[cfg(any(
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "dragonfly"
        ))]
        {
            Backend::Kqueue
        }
        #[cfg(windows)]
        {
            Backend::WinSelect
        }
        #[cfg(not(any(
            target_os = "linux",
            target_os = "android",
            target_os = "macos",
            target_os = "ios",
            target_os = "freebsd",
            target_os = "netbsd",
            target_os = "openbsd",
            target_os = "dragonfly",
            windows
        )))]
        {
            Backend::Poll
        }
    }

    /// Whether this backend needs the handler's drain loop to run to
    /// exhaustion (edge-triggered) or whether the OS auto-clears interest
    /// once the handler stops consuming (level-triggered).
    pub const fn is_edge_triggered(self) -> bool {
        matches!(self, Backend::Epoll | Backend::Kqueue)
    }
}

#[cfg(unix)]
pub mod unix;
#[cfg(any(target_os = "linux", target_os = "android"))]
pub use unix::epoll;
#[cfg(unix)]
pub use unix::generic_poll;
#[cfg(any(
    target_os = "macos",
    target_os = "ios",
    target_os = "freebsd",
    target_os = "netbsd",
    target_os = "openbsd",
    target_os = "dragonfly"
))]
pub use unix::kqueue;
#[cfg(unix)]
pub use unix::waker::Waker;

#[cfg(windows)]
pub mod windows;
#[cfg(windows)]
pub use windows::waker::Waker;
#[cfg(windows)]
pub use windows::winselect;

#[cfg(unix)]
pub type RawFdLike = std::os::unix::io::RawFd;
#[cfg(windows)]
pub type RawFdLike = windows_sys::Win32::Networking::WinSock::SOCKET;

/// Enum-dispatched selector: one variant per backend compiled for this
/// platform.
pub enum Selector {
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Epoll(epoll::Selector),
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "netbsd",
        target_os = "openbsd",
        target_os = "dragonfly"
    ))]
    Kqueue(kqueue::Selector),
    #[cfg(unix)]
    Poll(generic_poll::Selector),
    #[cfg(windows)]
    WinSelect(winselect::Selector),
}

impl Selector {
    pub fn new(backend: Backend) -> std::io::Result<Selector> {
        match backend {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Backend::Epoll => Ok(Selector::Epoll(epoll::Selector::new()?)),
            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))]
            Backend::Kqueue => Ok(Selector::Kqueue(kqueue::Selector::new()?)),
            #[cfg(unix)]
            Backend::Poll => Ok(Selector::Poll(generic_poll::Selector::new()?)),
            #[cfg(windows)]
            Backend::WinSelect => Ok(Selector::WinSelect(winselect::Selector::new()?)),
            #[allow(unreachable_patterns)]
            other => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                format!("{other:?} backend not available on this platform"),
            )),
        }
    }

    pub fn select(
        &self,
        out: &mut Vec<RawEvent>,
        timeout: Option<std::time::Duration>,
    ) -> std::io::Result<()> {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(s) => s.select(out, timeout),
            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))]
            Selector::Kqueue(s) => s.select(out, timeout),
            #[cfg(unix)]
            Selector::Poll(s) => s.select(out, timeout),
            #[cfg(windows)]
            Selector::WinSelect(s) => s.select(out, timeout),
        }
    }

    pub fn register(&self, fd: RawFdLike, token: Token, interest: Interest) -> std::io::Result<()> {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(s) => s.register(fd, token, interest),
            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))]
            Selector::Kqueue(s) => s.register(fd, token, interest),
            #[cfg(unix)]
            Selector::Poll(s) => s.register(fd, token, interest),
            #[cfg(windows)]
            Selector::WinSelect(s) => s.register(fd, token, interest),
        }
    }

    pub fn reregister(
        &self,
        fd: RawFdLike,
        token: Token,
        interest: Interest,
    ) -> std::io::Result<()> {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(s) => s.reregister(fd, token, interest),
            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))]
            Selector::Kqueue(s) => s.reregister(fd, token, interest),
            #[cfg(unix)]
            Selector::Poll(s) => s.reregister(fd, token, interest),
            #[cfg(windows)]
            Selector::WinSelect(s) => s.reregister(fd, token, interest),
        }
    }

    pub fn deregister(&self, fd: RawFdLike) -> std::io::Result<()> {
        match self {
            #[cfg(any(target_os = "linux", target_os = "android"))]
            Selector::Epoll(s) => s.deregister(fd),
            #[cfg(any(
                target_os = "macos",
                target_os = "ios",
                target_os = "freebsd",
                target_os = "netbsd",
                target_os = "openbsd",
                target_os = "dragonfly"
            ))]
            Selector::Kqueue(s) => s.deregister(fd),
            #[cfg(unix)]
            Selector::Poll(s) => s.deregister(fd),
            #[cfg(windows)]
            Selector::WinSelect(s) => s.deregister(fd),
        }
    }

    /// Builds the cross-thread [`Waker`] for this selector, folding its
    /// platform quirks (a registered fd on Unix, a bare event handle merged
    /// into the wait set on Windows) behind one call.
    #[cfg(unix)]
    pub fn make_waker(&self, token: Token) -> std::io::Result<Waker> {
        Waker::new(self, token)
    }

    #[cfg(windows)]
    pub fn make_waker(&self, token: Token) -> std::io::Result<Waker> {
        let waker = Waker::new()?;
        if let Selector::WinSelect(s) = self {
            s.register_waker(waker.handle(), token);
        }
        Ok(waker)
    }
}
