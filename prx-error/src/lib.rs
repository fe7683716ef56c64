//! The canonical, platform-neutral error taxonomy used across every layer of
//! the tunnel core (`ev-port`, `pal-socket`, `ws-connection`, ...).
//!
//! Native error codes never cross a layer boundary unmapped: [`PrxError`] is
//! the one enum every `Result` in this workspace resolves to, with
//! `from_io`/`from_raw_os_error` doing the per-OS mapping at the point a
//! native error is first observed.

use std::io;

/// One of the five error groups from this crate's error handling design.
///
/// Grouping lets callers `match` on recovery strategy without enumerating
/// every [`PrxErrorKind`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorGroup {
    /// Recovered by re-arming the event handle or rescheduling; never
    /// surfaced to a caller.
    Transient,
    /// Causes a reconnect cycle with back-off at the `ws-connection` layer;
    /// surfaced to the caller at the `pal-socket` layer.
    Connectivity,
    /// Programmer error. Never recovered; surfaced synchronously.
    Argument,
    /// Resource exhaustion. Surfaced; `ws-connection` may defer the
    /// offending buffer under transient memory pressure.
    Resource,
    /// Crashes the operation; for `ws-connection` triggers a reconnect
    /// cycle.
    Fatal,
}

/// A single canonical error kind, mapped to and from native OS error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PrxErrorKind {
    // --- Transient ---
    #[error("operation would block, retry once readiness is re-signaled")]
    Retry,
    #[error("operation is still in progress")]
    Waiting,
    #[error("operation timed out")]
    Timeout,
    #[error("resource busy")]
    Busy,

    // --- Connectivity ---
    #[error("connection closed")]
    Closed,
    #[error("connection reset by peer")]
    Reset,
    #[error("connection refused")]
    Refused,
    #[error("network unreachable")]
    Network,
    #[error("host unknown")]
    HostUnknown,
    #[error("no address could be resolved")]
    NoAddress,
    #[error("no route to host")]
    NoHost,
    #[error("socket is shut down")]
    Shutdown,
    #[error("connect already in progress")]
    Connecting,

    // --- Argument / programmer ---
    #[error("null argument")]
    Fault,
    #[error("invalid argument value")]
    Arg,
    #[error("operation not supported")]
    NotSupported,
    #[error("object is in the wrong state for this operation")]
    BadState,
    #[error("already exists")]
    AlreadyExists,
    #[error("not found")]
    NotFound,

    // --- Resource ---
    #[error("out of memory")]
    OutOfMemory,
    #[error("no more items / capacity exhausted")]
    NoMore,
    #[error("disk i/o error")]
    DiskIo,

    // --- Fatal ---
    #[error("fatal, unrecoverable error")]
    Fatal,
    #[error("unknown error")]
    Unknown,
    #[error("not implemented")]
    NotImpl,
}

impl PrxErrorKind {
    /// The error group this kind belongs to, per this crate's propagation
    /// policy table.
    pub const fn group(self) -> ErrorGroup {
        use PrxErrorKind::*;
        match self {
            Retry | Waiting | Timeout | Busy => ErrorGroup::Transient,
            Closed | Reset | Refused | Network | HostUnknown | NoAddress | NoHost | Shutdown
            | Connecting => ErrorGroup::Connectivity,
            Fault | Arg | NotSupported | BadState | AlreadyExists | NotFound => {
                ErrorGroup::Argument
            }
            OutOfMemory | NoMore | DiskIo => ErrorGroup::Resource,
            Fatal | Unknown | NotImpl => ErrorGroup::Fatal,
        }
    }

    /// `true` for `EAGAIN`/`EWOULDBLOCK`-shaped kinds that `pal-socket` must
    /// absorb internally by re-arming the event handle, never surfacing
    /// them to its owner.
    pub const fn is_retryable(self) -> bool {
        matches!(self, PrxErrorKind::Retry | PrxErrorKind::Waiting)
    }
}

/// The error type returned by every fallible operation in the tunnel core.
#[derive(Debug, thiserror::Error)]
#[error("{kind}")]
pub struct PrxError {
    kind: PrxErrorKind,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl PrxError {
    pub fn new(kind: PrxErrorKind) -> Self {
        PrxError { kind, source: None }
    }

    pub fn with_source(
        kind: PrxErrorKind,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        PrxError {
            kind,
            source: Some(Box::new(source)),
        }
    }

    pub const fn kind(&self) -> PrxErrorKind {
        self.kind
    }

    pub const fn group(&self) -> ErrorGroup {
        self.kind.group()
    }

    pub const fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Map an [`io::Error`] observed on a native socket/fd into the
    /// canonical taxonomy. This is the single point where OS error codes
    /// are translated on Unix-family platforms; Windows additionally
    /// consults `raw_os_error` for WinSock-specific codes via
    /// [`Self::from_raw_os_error`].
    pub fn from_io(err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::WouldBlock => PrxErrorKind::Retry,
            io::ErrorKind::TimedOut => PrxErrorKind::Timeout,
            io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted => {
                PrxErrorKind::Reset
            }
            io::ErrorKind::ConnectionRefused => PrxErrorKind::Refused,
            io::ErrorKind::NotConnected => PrxErrorKind::Closed,
            io::ErrorKind::AddrNotAvailable | io::ErrorKind::AddrInUse => PrxErrorKind::Arg,
            io::ErrorKind::AlreadyExists => PrxErrorKind::AlreadyExists,
            io::ErrorKind::NotFound => PrxErrorKind::NotFound,
            io::ErrorKind::InvalidInput | io::ErrorKind::InvalidData => PrxErrorKind::Arg,
            io::ErrorKind::Interrupted => PrxErrorKind::Retry,
            io::ErrorKind::OutOfMemory => PrxErrorKind::OutOfMemory,
            io::ErrorKind::Unsupported => PrxErrorKind::NotSupported,
            _ => raw_os_error_kind(err).unwrap_or(PrxErrorKind::Unknown),
        };
        PrxError {
            kind,
            source: Some(Box::new(io::Error::from(err.kind()))),
        }
    }

    pub fn from_raw_os_error(code: i32) -> Self {
        PrxError::new(platform::from_raw_os_error(code))
    }
}

impl From<PrxErrorKind> for PrxError {
    fn from(kind: PrxErrorKind) -> Self {
        PrxError::new(kind)
    }
}

impl From<io::Error> for PrxError {
    fn from(err: io::Error) -> Self {
        PrxError::from_io(&err)
    }
}

fn raw_os_error_kind(err: &io::Error) -> Option<PrxErrorKind> {
    err.raw_os_error().map(platform::from_raw_os_error)
}

#[cfg(unix)]
mod platform {
    use super::PrxErrorKind;

    pub fn from_raw_os_error(code: i32) -> PrxErrorKind {
        match code {
            libc::EAGAIN => PrxErrorKind::Retry,
            #[allow(unreachable_patterns)]
            libc::EWOULDBLOCK => PrxErrorKind::Retry,
            libc::EINPROGRESS => PrxErrorKind::Connecting,
            libc::ETIMEDOUT => PrxErrorKind::Timeout,
            libc::ECONNRESET => PrxErrorKind::Reset,
            libc::ECONNABORTED => PrxErrorKind::Reset,
            libc::ECONNREFUSED => PrxErrorKind::Refused,
            libc::ENETUNREACH | libc::ENETDOWN => PrxErrorKind::Network,
            libc::EHOSTUNREACH => PrxErrorKind::NoHost,
            libc::EHOSTDOWN => PrxErrorKind::HostUnknown,
            libc::ENOTCONN => PrxErrorKind::Closed,
            libc::ESHUTDOWN => PrxErrorKind::Shutdown,
            libc::EBADF | libc::EINVAL => PrxErrorKind::Arg,
            libc::EEXIST => PrxErrorKind::AlreadyExists,
            libc::ENOENT => PrxErrorKind::NotFound,
            libc::ENOMEM => PrxErrorKind::OutOfMemory,
            libc::EMFILE | libc::ENFILE => PrxErrorKind::NoMore,
            libc::ENOSYS | libc::EOPNOTSUPP => PrxErrorKind::NotSupported,
            libc::EIO => PrxErrorKind::DiskIo,
            _ => PrxErrorKind::Unknown,
        }
    }
}

#[cfg(windows)]
mod platform {
    use super::PrxErrorKind;
    use windows_sys::Win32::Networking::WinSock;

    pub fn from_raw_os_error(code: i32) -> PrxErrorKind {
        match code as u32 {
            c if c == WinSock::WSAEWOULDBLOCK as u32 => PrxErrorKind::Retry,
            c if c == WinSock::WSAEINPROGRESS as u32 => PrxErrorKind::Connecting,
            c if c == WinSock::WSAETIMEDOUT as u32 => PrxErrorKind::Timeout,
            c if c == WinSock::WSAECONNRESET as u32 => PrxErrorKind::Reset,
            c if c == WinSock::WSAECONNABORTED as u32 => PrxErrorKind::Reset,
            c if c == WinSock::WSAECONNREFUSED as u32 => PrxErrorKind::Refused,
            c if c == WinSock::WSAENETUNREACH as u32 => PrxErrorKind::Network,
            c if c == WinSock::WSAEHOSTUNREACH as u32 => PrxErrorKind::NoHost,
            c if c == WinSock::WSAENOTCONN as u32 => PrxErrorKind::Closed,
            c if c == WinSock::WSAESHUTDOWN as u32 => PrxErrorKind::Shutdown,
            c if c == WinSock::WSAEINVAL as u32 => PrxErrorKind::Arg,
            _ => PrxErrorKind::Unknown,
        }
    }
}

#[cfg(not(any(unix, windows)))]
mod platform {
    use super::PrxErrorKind;

    pub fn from_raw_os_error(_code: i32) -> PrxErrorKind {
        PrxErrorKind::Unknown
    }
}

pub type Result<T> = std::result::Result<T, PrxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds_are_transient() {
        assert_eq!(PrxErrorKind::Retry.group(), ErrorGroup::Transient);
        assert!(PrxErrorKind::Retry.is_retryable());
        assert!(!PrxErrorKind::Closed.is_retryable());
    }

    #[test]
    fn would_block_maps_to_retry() {
        let io_err = io::Error::from(io::ErrorKind::WouldBlock);
        let err = PrxError::from_io(&io_err);
        assert_eq!(err.kind(), PrxErrorKind::Retry);
        assert_eq!(err.group(), ErrorGroup::Transient);
    }

    #[test]
    fn connection_reset_is_connectivity() {
        let io_err = io::Error::from(io::ErrorKind::ConnectionReset);
        let err = PrxError::from_io(&io_err);
        assert_eq!(err.kind(), PrxErrorKind::Reset);
        assert_eq!(err.group(), ErrorGroup::Connectivity);
    }
}
