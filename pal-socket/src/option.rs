//! `prx_socket_option_t` → native `(level, name)` translation. Every
//! variant here is one user-visible option from the external-interfaces
//! surface; `apply` carries out the platform syscall.

use std::net::Ipv4Addr;
use std::time::Duration;

use prx_error::PrxError;

use crate::raw::RawSocket;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownDirection {
    Read,
    Write,
    Both,
}

#[derive(Debug, Clone, Copy)]
pub enum SocketOption {
    Linger(Option<Duration>),
    ReceiveTimeout(Duration),
    SendTimeout(Duration),
    ReuseAddress(bool),
    KeepAlive(bool),
    Broadcast(bool),
    NoDelay(bool),
    /// `prx_so_nonblocking` — handled separately by `ev_port::EventPort`
    /// on register, but exposed here so callers can query/force it.
    NonBlocking(bool),
    /// `IP_ADD_MEMBERSHIP`: join a multicast group on the given local
    /// interface (`Ipv4Addr::UNSPECIFIED` to let the OS pick one).
    JoinMulticastGroup(Ipv4Addr, Ipv4Addr),
    /// `IP_DROP_MEMBERSHIP`: leave a group joined with `JoinMulticastGroup`.
    LeaveMulticastGroup(Ipv4Addr, Ipv4Addr),
}

impl SocketOption {
    pub fn apply(self, socket: &RawSocket) -> Result<(), PrxError> {
        match self {
            SocketOption::Linger(duration) => socket.set_linger(duration),
            SocketOption::ReceiveTimeout(d) => socket.set_timeout(TimeoutSide::Receive, d),
            SocketOption::SendTimeout(d) => socket.set_timeout(TimeoutSide::Send, d),
            SocketOption::ReuseAddress(on) => socket.set_reuseaddr(on),
            SocketOption::KeepAlive(on) => socket.set_keepalive(on),
            SocketOption::Broadcast(on) => socket.set_broadcast(on),
            SocketOption::NoDelay(on) => socket.set_nodelay(on),
            SocketOption::NonBlocking(on) => socket.set_nonblocking(on),
            SocketOption::JoinMulticastGroup(group, interface) => {
                socket.join_multicast_v4(group, interface)
            }
            SocketOption::LeaveMulticastGroup(group, interface) => {
                socket.leave_multicast_v4(group, interface)
            }
        }
        .map_err(PrxError::from)
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum TimeoutSide {
    Receive,
    Send,
}

/// `prx_so_available` — bytes pending via `FIONREAD`.
pub fn available(socket: &RawSocket) -> Result<usize, PrxError> {
    socket.fionread().map_err(PrxError::from)
}

/// `prx_so_shutdown`.
pub fn shutdown(socket: &RawSocket, direction: ShutdownDirection) -> Result<(), PrxError> {
    socket.shutdown(direction).map_err(PrxError::from)
}

/// `prx_so_acceptconn` — `listen()`.
pub fn listen(socket: &RawSocket, backlog: i32) -> Result<(), PrxError> {
    socket.listen(backlog).map_err(PrxError::from)
}
