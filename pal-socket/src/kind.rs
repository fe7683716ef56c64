/// What shape of native socket a [`crate::PalSocket`] wraps. Drives which
/// edges `pal-socket`'s internal `ev_port::Handler` adapter reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketKind {
    /// Connection-oriented byte stream (`SOCK_STREAM`), client side.
    Stream,
    /// A `listen()`ed stream socket; only ever emits `begin_accept`/`end_accept`.
    Listener,
    /// Connectionless datagrams (`SOCK_DGRAM`).
    Datagram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressFamily {
    Inet,
    Inet6,
    #[default]
    Unspecified,
}
