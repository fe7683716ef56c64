//! Native socket creation/connect/accept/option-setting, grounded in the
//! teacher's `sys::unix::socket::Socket` (syscall wrapping style, the
//! `EINPROGRESS`-is-ok connect, `accept4` with `SOCK_NONBLOCK|SOCK_CLOEXEC`
//! where available) and extended with the options `pal-socket` needs that
//! plain `mio::net` sockets never expose (linger, timeouts, `FIONREAD`).

use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::kind::SocketKind;
use crate::option::{ShutdownDirection, TimeoutSide};

#[cfg(unix)]
mod imp {
    use super::*;
    use std::os::unix::io::{AsRawFd, FromRawFd, IntoRawFd, RawFd};

    fn sockaddr(addr: &SocketAddr) -> (*const libc::sockaddr, libc::socklen_t) {
        match addr {
            SocketAddr::V4(a) => (
                a as *const _ as *const libc::sockaddr,
                mem::size_of_val(a) as libc::socklen_t,
            ),
            SocketAddr::V6(a) => (
                a as *const _ as *const libc::sockaddr,
                mem::size_of_val(a) as libc::socklen_t,
            ),
        }
    }

    unsafe fn to_socket_addr(storage: *const libc::sockaddr_storage) -> io::Result<SocketAddr> {
        match (*storage).ss_family as libc::c_int {
            libc::AF_INET => Ok(SocketAddr::V4(*(storage as *const libc::sockaddr_in as *const _))),
            libc::AF_INET6 => Ok(SocketAddr::V6(*(storage as *const libc::sockaddr_in6 as *const _))),
            _ => Err(io::ErrorKind::InvalidInput.into()),
        }
    }

    #[derive(Debug)]
    pub struct RawSocket {
        fd: RawFd,
    }

    impl RawSocket {
        fn new(domain: libc::c_int, socket_type: libc::c_int) -> io::Result<Self> {
            #[cfg(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux",
                target_os = "netbsd",
                target_os = "openbsd"
            ))]
            let socket_type = socket_type | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC;

            let fd = syscall(unsafe { libc::socket(domain, socket_type, 0) })?;

            #[cfg(any(target_os = "ios", target_os = "macos"))]
            {
                if let Err(e) = syscall(unsafe { libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK) })
                    .and_then(|_| syscall(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) }))
                {
                    unsafe { libc::close(fd) };
                    return Err(e);
                }
            }

            Ok(RawSocket { fd })
        }

        pub fn stream(family_hint: Option<SocketAddr>) -> io::Result<Self> {
            let domain = match family_hint {
                Some(SocketAddr::V6(_)) => libc::AF_INET6,
                _ => libc::AF_INET,
            };
            Self::new(domain, libc::SOCK_STREAM)
        }

        pub fn datagram(family_hint: Option<SocketAddr>) -> io::Result<Self> {
            let domain = match family_hint {
                Some(SocketAddr::V6(_)) => libc::AF_INET6,
                _ => libc::AF_INET,
            };
            Self::new(domain, libc::SOCK_DGRAM)
        }

        pub fn bind(&self, addr: SocketAddr) -> io::Result<()> {
            let (storage, len) = sockaddr(&addr);
            syscall(unsafe { libc::bind(self.fd, storage, len) }).map(|_| ())
        }

        pub fn connect(&self, addr: SocketAddr) -> io::Result<()> {
            let (storage, len) = sockaddr(&addr);
            match syscall(unsafe { libc::connect(self.fd, storage, len) }) {
                Ok(_) => Ok(()),
                Err(ref e) if e.raw_os_error() == Some(libc::EINPROGRESS) => Ok(()),
                Err(e) => Err(e),
            }
        }

        pub fn listen(&self, backlog: i32) -> io::Result<()> {
            syscall(unsafe { libc::listen(self.fd, backlog) }).map(|_| ())
        }

        pub fn accept(&self) -> io::Result<(Self, SocketAddr)> {
            let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
            let mut len = mem::size_of_val(&storage) as libc::socklen_t;
            let storage_ptr = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr;

            #[cfg(any(
                target_os = "android",
                target_os = "dragonfly",
                target_os = "freebsd",
                target_os = "linux",
                target_os = "openbsd"
            ))]
            let fd = syscall(unsafe {
                libc::accept4(self.fd, storage_ptr, &mut len, libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK)
            })?;

            #[cfg(any(target_os = "ios", target_os = "macos", target_os = "netbsd"))]
            let fd = {
                let fd = syscall(unsafe { libc::accept(self.fd, storage_ptr, &mut len) })?;
                syscall(unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) })?;
                fd
            };

            let addr = unsafe { to_socket_addr(&storage)? };
            Ok((RawSocket { fd }, addr))
        }

        pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let n = syscall(unsafe {
                libc::recv(self.fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len(), 0)
            })?;
            Ok(n as usize)
        }

        pub fn recvfrom(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
            let mut len = mem::size_of_val(&storage) as libc::socklen_t;
            let n = syscall(unsafe {
                libc::recvfrom(
                    self.fd,
                    buf.as_mut_ptr() as *mut libc::c_void,
                    buf.len(),
                    0,
                    &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr,
                    &mut len,
                )
            })?;
            let addr = unsafe { to_socket_addr(&storage)? };
            Ok((n as usize, addr))
        }

        pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
            let n = syscall(unsafe {
                libc::send(self.fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0)
            })?;
            Ok(n as usize)
        }

        pub fn sendto(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
            let (storage, len) = sockaddr(&addr);
            let n = syscall(unsafe {
                libc::sendto(self.fd, buf.as_ptr() as *const libc::c_void, buf.len(), 0, storage, len)
            })?;
            Ok(n as usize)
        }

        pub fn set_nonblocking(&self, on: bool) -> io::Result<()> {
            let flags = syscall(unsafe { libc::fcntl(self.fd, libc::F_GETFL) })?;
            let flags = if on { flags | libc::O_NONBLOCK } else { flags & !libc::O_NONBLOCK };
            syscall(unsafe { libc::fcntl(self.fd, libc::F_SETFL, flags) }).map(|_| ())
        }

        pub fn set_reuseaddr(&self, on: bool) -> io::Result<()> {
            self.setsockopt_bool(libc::SOL_SOCKET, libc::SO_REUSEADDR, on)
        }

        pub fn set_keepalive(&self, on: bool) -> io::Result<()> {
            self.setsockopt_bool(libc::SOL_SOCKET, libc::SO_KEEPALIVE, on)
        }

        pub fn set_broadcast(&self, on: bool) -> io::Result<()> {
            self.setsockopt_bool(libc::SOL_SOCKET, libc::SO_BROADCAST, on)
        }

        pub fn set_nodelay(&self, on: bool) -> io::Result<()> {
            self.setsockopt_bool(libc::IPPROTO_TCP, libc::TCP_NODELAY, on)
        }

        pub fn join_multicast_v4(&self, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
            self.set_ip_mreq(libc::IP_ADD_MEMBERSHIP, group, interface)
        }

        pub fn leave_multicast_v4(&self, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
            self.set_ip_mreq(libc::IP_DROP_MEMBERSHIP, group, interface)
        }

        fn set_ip_mreq(&self, name: libc::c_int, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
            let mreq = libc::ip_mreq {
                imr_multiaddr: libc::in_addr { s_addr: u32::from_ne_bytes(group.octets()) },
                imr_interface: libc::in_addr { s_addr: u32::from_ne_bytes(interface.octets()) },
            };
            syscall(unsafe {
                libc::setsockopt(
                    self.fd,
                    libc::IPPROTO_IP,
                    name,
                    &mreq as *const _ as *const libc::c_void,
                    mem::size_of::<libc::ip_mreq>() as libc::socklen_t,
                )
            })
            .map(|_| ())
        }

        pub fn set_linger(&self, duration: Option<Duration>) -> io::Result<()> {
            let linger = libc::linger {
                l_onoff: duration.is_some() as libc::c_int,
                l_linger: duration.map(|d| d.as_secs() as libc::c_int).unwrap_or(0),
            };
            syscall(unsafe {
                libc::setsockopt(
                    self.fd,
                    libc::SOL_SOCKET,
                    libc::SO_LINGER,
                    &linger as *const _ as *const libc::c_void,
                    mem::size_of::<libc::linger>() as libc::socklen_t,
                )
            })
            .map(|_| ())
        }

        pub fn set_timeout(&self, side: TimeoutSide, duration: Duration) -> io::Result<()> {
            let name = match side {
                TimeoutSide::Receive => libc::SO_RCVTIMEO,
                TimeoutSide::Send => libc::SO_SNDTIMEO,
            };
            let tv = libc::timeval {
                tv_sec: duration.as_secs() as libc::time_t,
                tv_usec: duration.subsec_micros() as libc::suseconds_t,
            };
            syscall(unsafe {
                libc::setsockopt(
                    self.fd,
                    libc::SOL_SOCKET,
                    name,
                    &tv as *const _ as *const libc::c_void,
                    mem::size_of::<libc::timeval>() as libc::socklen_t,
                )
            })
            .map(|_| ())
        }

        pub fn fionread(&self) -> io::Result<usize> {
            let mut n: libc::c_int = 0;
            syscall(unsafe { libc::ioctl(self.fd, libc::FIONREAD, &mut n) })?;
            Ok(n as usize)
        }

        pub fn shutdown(&self, direction: ShutdownDirection) -> io::Result<()> {
            let how = match direction {
                ShutdownDirection::Read => libc::SHUT_RD,
                ShutdownDirection::Write => libc::SHUT_WR,
                ShutdownDirection::Both => libc::SHUT_RDWR,
            };
            match syscall(unsafe { libc::shutdown(self.fd, how) }) {
                Ok(_) => Ok(()),
                // Already disconnected; shutdown-on-close is best-effort.
                Err(ref e) if e.raw_os_error() == Some(libc::ENOTCONN) => Ok(()),
                Err(e) => Err(e),
            }
        }

        fn setsockopt_bool(&self, level: libc::c_int, name: libc::c_int, on: bool) -> io::Result<()> {
            let value: libc::c_int = on as libc::c_int;
            syscall(unsafe {
                libc::setsockopt(
                    self.fd,
                    level,
                    name,
                    &value as *const _ as *const libc::c_void,
                    mem::size_of::<libc::c_int>() as libc::socklen_t,
                )
            })
            .map(|_| ())
        }

        pub fn take_error(&self) -> io::Result<Option<io::Error>> {
            let mut value: libc::c_int = 0;
            let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
            syscall(unsafe {
                libc::getsockopt(
                    self.fd,
                    libc::SOL_SOCKET,
                    libc::SO_ERROR,
                    &mut value as *mut _ as *mut libc::c_void,
                    &mut len,
                )
            })?;
            Ok(if value == 0 { None } else { Some(io::Error::from_raw_os_error(value)) })
        }

        pub fn close(&self) -> io::Result<()> {
            syscall(unsafe { libc::close(self.fd) }).map(|_| ())
        }

        pub fn local_addr(&self) -> io::Result<SocketAddr> {
            let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
            let mut len = mem::size_of_val(&storage) as libc::socklen_t;
            syscall(unsafe {
                libc::getsockname(self.fd, &mut storage as *mut _ as *mut libc::sockaddr, &mut len)
            })?;
            unsafe { to_socket_addr(&storage) }
        }
    }

    impl AsRawFd for RawSocket {
        fn as_raw_fd(&self) -> RawFd {
            self.fd
        }
    }

    impl FromRawFd for RawSocket {
        unsafe fn from_raw_fd(fd: RawFd) -> Self {
            RawSocket { fd }
        }
    }

    impl IntoRawFd for RawSocket {
        fn into_raw_fd(self) -> RawFd {
            let fd = self.fd;
            mem::forget(self);
            fd
        }
    }

    fn syscall(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }
}

#[cfg(windows)]
mod imp {
    use super::*;
    use std::os::windows::io::{AsRawSocket, FromRawSocket, IntoRawSocket, RawSocket as RawSocketHandle};
    use windows_sys::Win32::Networking::WinSock;

    #[derive(Debug)]
    pub struct RawSocket {
        sock: WinSock::SOCKET,
    }

    fn check(ret: i32) -> io::Result<()> {
        if ret == WinSock::SOCKET_ERROR {
            Err(io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() }))
        } else {
            Ok(())
        }
    }

    impl RawSocket {
        fn new(family: i32, socket_type: i32) -> io::Result<Self> {
            let sock = unsafe { WinSock::socket(family, socket_type, 0) };
            if sock == WinSock::INVALID_SOCKET {
                return Err(io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() }));
            }
            Ok(RawSocket { sock })
        }

        pub fn stream(family_hint: Option<SocketAddr>) -> io::Result<Self> {
            let family = match family_hint {
                Some(SocketAddr::V6(_)) => WinSock::AF_INET6.into(),
                _ => WinSock::AF_INET.into(),
            };
            Self::new(family, WinSock::SOCK_STREAM.into())
        }

        pub fn datagram(family_hint: Option<SocketAddr>) -> io::Result<Self> {
            let family = match family_hint {
                Some(SocketAddr::V6(_)) => WinSock::AF_INET6.into(),
                _ => WinSock::AF_INET.into(),
            };
            Self::new(family, WinSock::SOCK_DGRAM.into())
        }

        pub fn bind(&self, addr: SocketAddr) -> io::Result<()> {
            let sock_addr: socket2_like::SockAddr = addr.into();
            check(unsafe { WinSock::bind(self.sock, sock_addr.as_ptr(), sock_addr.len()) })
        }

        pub fn connect(&self, addr: SocketAddr) -> io::Result<()> {
            let sock_addr: socket2_like::SockAddr = addr.into();
            match check(unsafe { WinSock::connect(self.sock, sock_addr.as_ptr(), sock_addr.len()) }) {
                Ok(()) => Ok(()),
                Err(e) if e.raw_os_error() == Some(WinSock::WSAEWOULDBLOCK) => Ok(()),
                Err(e) => Err(e),
            }
        }

        pub fn listen(&self, backlog: i32) -> io::Result<()> {
            check(unsafe { WinSock::listen(self.sock, backlog) })
        }

        pub fn accept(&self) -> io::Result<(Self, SocketAddr)> {
            let mut storage: WinSock::SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
            let mut len = std::mem::size_of_val(&storage) as i32;
            let sock = unsafe {
                WinSock::accept(self.sock, &mut storage as *mut _ as *mut WinSock::SOCKADDR, &mut len)
            };
            if sock == WinSock::INVALID_SOCKET {
                return Err(io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() }));
            }
            let addr = socket2_like::to_socket_addr(&storage)?;
            Ok((RawSocket { sock }, addr))
        }

        pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let n = unsafe { WinSock::recv(self.sock, buf.as_mut_ptr(), buf.len() as i32, 0) };
            if n == WinSock::SOCKET_ERROR {
                return Err(io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() }));
            }
            Ok(n as usize)
        }

        pub fn recvfrom(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            let mut storage: WinSock::SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
            let mut len = std::mem::size_of_val(&storage) as i32;
            let n = unsafe {
                WinSock::recvfrom(
                    self.sock,
                    buf.as_mut_ptr(),
                    buf.len() as i32,
                    0,
                    &mut storage as *mut _ as *mut WinSock::SOCKADDR,
                    &mut len,
                )
            };
            if n == WinSock::SOCKET_ERROR {
                return Err(io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() }));
            }
            let addr = socket2_like::to_socket_addr(&storage)?;
            Ok((n as usize, addr))
        }

        pub fn send(&self, buf: &[u8]) -> io::Result<usize> {
            let n = unsafe { WinSock::send(self.sock, buf.as_ptr(), buf.len() as i32, 0) };
            if n == WinSock::SOCKET_ERROR {
                return Err(io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() }));
            }
            Ok(n as usize)
        }

        pub fn sendto(&self, buf: &[u8], addr: SocketAddr) -> io::Result<usize> {
            let sock_addr: socket2_like::SockAddr = addr.into();
            let n = unsafe {
                WinSock::sendto(self.sock, buf.as_ptr(), buf.len() as i32, 0, sock_addr.as_ptr(), sock_addr.len())
            };
            if n == WinSock::SOCKET_ERROR {
                return Err(io::Error::from_raw_os_error(unsafe { WinSock::WSAGetLastError() }));
            }
            Ok(n as usize)
        }

        pub fn set_nonblocking(&self, on: bool) -> io::Result<()> {
            let mut mode: u32 = on as u32;
            check(unsafe { WinSock::ioctlsocket(self.sock, WinSock::FIONBIO, &mut mode) })
        }

        pub fn set_reuseaddr(&self, on: bool) -> io::Result<()> {
            self.setsockopt_bool(WinSock::SOL_SOCKET, WinSock::SO_REUSEADDR, on)
        }

        pub fn set_keepalive(&self, on: bool) -> io::Result<()> {
            self.setsockopt_bool(WinSock::SOL_SOCKET, WinSock::SO_KEEPALIVE, on)
        }

        pub fn set_broadcast(&self, on: bool) -> io::Result<()> {
            self.setsockopt_bool(WinSock::SOL_SOCKET, WinSock::SO_BROADCAST, on)
        }

        pub fn set_nodelay(&self, on: bool) -> io::Result<()> {
            self.setsockopt_bool(WinSock::IPPROTO_TCP as i32, WinSock::TCP_NODELAY, on)
        }

        pub fn join_multicast_v4(&self, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
            self.set_ip_mreq(WinSock::IP_ADD_MEMBERSHIP, group, interface)
        }

        pub fn leave_multicast_v4(&self, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
            self.set_ip_mreq(WinSock::IP_DROP_MEMBERSHIP, group, interface)
        }

        fn set_ip_mreq(&self, name: u32, group: Ipv4Addr, interface: Ipv4Addr) -> io::Result<()> {
            let mreq = WinSock::IP_MREQ {
                imr_multiaddr: WinSock::IN_ADDR {
                    S_un: WinSock::IN_ADDR_0 { S_addr: u32::from_ne_bytes(group.octets()) },
                },
                imr_interface: WinSock::IN_ADDR {
                    S_un: WinSock::IN_ADDR_0 { S_addr: u32::from_ne_bytes(interface.octets()) },
                },
            };
            check(unsafe {
                WinSock::setsockopt(
                    self.sock,
                    WinSock::IPPROTO_IP as i32,
                    name as i32,
                    &mreq as *const _ as *const u8,
                    std::mem::size_of::<WinSock::IP_MREQ>() as i32,
                )
            })
        }

        pub fn set_linger(&self, duration: Option<Duration>) -> io::Result<()> {
            let linger = WinSock::LINGER {
                l_onoff: duration.is_some() as u16,
                l_linger: duration.map(|d| d.as_secs() as u16).unwrap_or(0),
            };
            check(unsafe {
                WinSock::setsockopt(
                    self.sock,
                    WinSock::SOL_SOCKET,
                    WinSock::SO_LINGER,
                    &linger as *const _ as *const u8,
                    std::mem::size_of::<WinSock::LINGER>() as i32,
                )
            })
        }

        pub fn set_timeout(&self, side: TimeoutSide, duration: Duration) -> io::Result<()> {
            let name = match side {
                TimeoutSide::Receive => WinSock::SO_RCVTIMEO,
                TimeoutSide::Send => WinSock::SO_SNDTIMEO,
            };
            let millis: u32 = duration.as_millis() as u32;
            check(unsafe {
                WinSock::setsockopt(
                    self.sock,
                    WinSock::SOL_SOCKET,
                    name,
                    &millis as *const _ as *const u8,
                    std::mem::size_of::<u32>() as i32,
                )
            })
        }

        pub fn fionread(&self) -> io::Result<usize> {
            let mut n: u32 = 0;
            check(unsafe { WinSock::ioctlsocket(self.sock, WinSock::FIONREAD, &mut n) })?;
            Ok(n as usize)
        }

        pub fn shutdown(&self, direction: ShutdownDirection) -> io::Result<()> {
            let how = match direction {
                ShutdownDirection::Read => WinSock::SD_RECEIVE,
                ShutdownDirection::Write => WinSock::SD_SEND,
                ShutdownDirection::Both => WinSock::SD_BOTH,
            };
            match check(unsafe { WinSock::shutdown(self.sock, how) }) {
                Ok(()) => Ok(()),
                Err(e) if e.raw_os_error() == Some(WinSock::WSAENOTCONN) => Ok(()),
                Err(e) => Err(e),
            }
        }

        fn setsockopt_bool(&self, level: i32, name: i32, on: bool) -> io::Result<()> {
            let value: i32 = on as i32;
            check(unsafe {
                WinSock::setsockopt(
                    self.sock,
                    level,
                    name,
                    &value as *const _ as *const u8,
                    std::mem::size_of::<i32>() as i32,
                )
            })
        }

        pub fn take_error(&self) -> io::Result<Option<io::Error>> {
            let mut value: i32 = 0;
            let mut len = std::mem::size_of::<i32>() as i32;
            check(unsafe {
                WinSock::getsockopt(
                    self.sock,
                    WinSock::SOL_SOCKET,
                    WinSock::SO_ERROR,
                    &mut value as *mut _ as *mut u8,
                    &mut len,
                )
            })?;
            Ok(if value == 0 { None } else { Some(io::Error::from_raw_os_error(value)) })
        }

        pub fn close(&self) -> io::Result<()> {
            check(unsafe { WinSock::closesocket(self.sock) as i32 })
        }

        pub fn local_addr(&self) -> io::Result<SocketAddr> {
            let mut storage: WinSock::SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
            let mut len = std::mem::size_of_val(&storage) as i32;
            check(unsafe {
                WinSock::getsockname(self.sock, &mut storage as *mut _ as *mut WinSock::SOCKADDR, &mut len) as i32
            })?;
            socket2_like::to_socket_addr(&storage)
        }
    }

    impl AsRawSocket for RawSocket {
        fn as_raw_socket(&self) -> RawSocketHandle {
            self.sock as RawSocketHandle
        }
    }

    impl FromRawSocket for RawSocket {
        unsafe fn from_raw_socket(sock: RawSocketHandle) -> Self {
            RawSocket { sock: sock as WinSock::SOCKET }
        }
    }

    impl IntoRawSocket for RawSocket {
        fn into_raw_socket(self) -> RawSocketHandle {
            let sock = self.sock;
            std::mem::forget(self);
            sock as RawSocketHandle
        }
    }

    /// Minimal `sockaddr` (de)serialization; a stand-in for the `socket2`
    /// crate's `SockAddr` since we only need the two address families here.
    mod socket2_like {
        use super::*;
        use std::net::{SocketAddrV4, SocketAddrV6};

        pub(super) struct SockAddr {
            storage: WinSock::SOCKADDR_STORAGE,
            len: i32,
        }

        impl SockAddr {
            pub(super) fn as_ptr(&self) -> *const WinSock::SOCKADDR {
                &self.storage as *const _ as *const WinSock::SOCKADDR
            }

            pub(super) fn len(&self) -> i32 {
                self.len
            }
        }

        impl From<SocketAddr> for SockAddr {
            fn from(addr: SocketAddr) -> Self {
                let mut storage: WinSock::SOCKADDR_STORAGE = unsafe { std::mem::zeroed() };
                let len = match addr {
                    SocketAddr::V4(v4) => {
                        let raw = to_sockaddr_in(v4);
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                &raw as *const _ as *const u8,
                                &mut storage as *mut _ as *mut u8,
                                std::mem::size_of_val(&raw),
                            )
                        };
                        std::mem::size_of_val(&raw) as i32
                    }
                    SocketAddr::V6(v6) => {
                        let raw = to_sockaddr_in6(v6);
                        unsafe {
                            std::ptr::copy_nonoverlapping(
                                &raw as *const _ as *const u8,
                                &mut storage as *mut _ as *mut u8,
                                std::mem::size_of_val(&raw),
                            )
                        };
                        std::mem::size_of_val(&raw) as i32
                    }
                };
                SockAddr { storage, len }
            }
        }

        fn to_sockaddr_in(addr: SocketAddrV4) -> WinSock::SOCKADDR_IN {
            WinSock::SOCKADDR_IN {
                sin_family: WinSock::AF_INET as u16,
                sin_port: addr.port().to_be(),
                sin_addr: WinSock::IN_ADDR {
                    S_un: WinSock::IN_ADDR_0 { S_addr: u32::from_ne_bytes(addr.ip().octets()) },
                },
                sin_zero: [0; 8],
            }
        }

        fn to_sockaddr_in6(addr: SocketAddrV6) -> WinSock::SOCKADDR_IN6 {
            WinSock::SOCKADDR_IN6 {
                sin6_family: WinSock::AF_INET6 as u16,
                sin6_port: addr.port().to_be(),
                sin6_flowinfo: addr.flowinfo(),
                sin6_addr: WinSock::IN6_ADDR { u: WinSock::IN6_ADDR_0 { Byte: addr.ip().octets() } },
                Anonymous: WinSock::SOCKADDR_IN6_0 { sin6_scope_id: addr.scope_id() },
            }
        }

        pub(super) fn to_socket_addr(storage: &WinSock::SOCKADDR_STORAGE) -> io::Result<SocketAddr> {
            match storage.ss_family as i32 {
                WinSock::AF_INET => {
                    let raw = unsafe { &*(storage as *const _ as *const WinSock::SOCKADDR_IN) };
                    let ip = unsafe { raw.sin_addr.S_un.S_addr }.to_ne_bytes();
                    Ok(SocketAddr::V4(SocketAddrV4::new(ip.into(), u16::from_be(raw.sin_port))))
                }
                WinSock::AF_INET6 => {
                    let raw = unsafe { &*(storage as *const _ as *const WinSock::SOCKADDR_IN6) };
                    let ip = unsafe { raw.sin6_addr.u.Byte };
                    Ok(SocketAddr::V6(SocketAddrV6::new(
                        ip.into(),
                        u16::from_be(raw.sin6_port),
                        raw.sin6_flowinfo,
                        unsafe { raw.Anonymous.sin6_scope_id },
                    )))
                }
                _ => Err(io::ErrorKind::InvalidInput.into()),
            }
        }
    }
}

pub use imp::RawSocket;

impl RawSocket {
    pub fn for_kind(kind: SocketKind, family_hint: Option<SocketAddr>) -> io::Result<Self> {
        match kind {
            SocketKind::Stream | SocketKind::Listener => RawSocket::stream(family_hint),
            SocketKind::Datagram => RawSocket::datagram(family_hint),
        }
    }
}
