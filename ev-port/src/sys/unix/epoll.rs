//! `epoll(7)` backend. Always edge-triggered (`EPOLLET`) — the port's
//! dispatch loop is responsible for draining each fd to `WouldBlock` before
//! returning to `select`.

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::Duration;

use libc::{EPOLLERR, EPOLLET, EPOLLHUP, EPOLLIN, EPOLLOUT, EPOLLRDHUP};

use crate::sys::RawEvent;
use crate::{Interest, Token};

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

#[derive(Debug)]
pub struct Selector {
    ep: OwnedFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let fd = cvt(unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) })?;
        // SAFETY: `epoll_create1` returned a freshly owned, valid fd.
        let ep = unsafe { OwnedFd::from_raw_fd(fd) };
        Ok(Selector { ep })
    }

    pub fn select(&self, out: &mut Vec<RawEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = timeout
            .map(|to| {
                to.checked_add(Duration::from_nanos(999_999))
                    .unwrap_or(to)
                    .as_millis() as libc::c_int
            })
            .unwrap_or(-1);

        out.clear();
        let mut buf: [libc::epoll_event; 256] = unsafe { std::mem::zeroed() };
        let n = cvt(unsafe {
            libc::epoll_wait(
                self.ep.as_raw_fd(),
                buf.as_mut_ptr(),
                buf.len() as libc::c_int,
                timeout_ms,
            )
        })?;

        for raw in &buf[..n as usize] {
            let events = raw.events as libc::c_int;
            out.push(RawEvent {
                token: Token(raw.u64 as usize),
                readable: events & EPOLLIN != 0,
                writable: events & EPOLLOUT != 0,
                error: events & EPOLLERR != 0,
                read_closed: events & EPOLLHUP != 0
                    || (events & EPOLLIN != 0 && events & EPOLLRDHUP != 0),
                write_closed: events & EPOLLHUP != 0 || (events & EPOLLOUT != 0 && events & EPOLLERR != 0),
            });
        }
        Ok(())
    }

    pub fn register(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interests_to_epoll(interest),
            u64: token.0 as u64,
        };
        cvt(unsafe {
            libc::epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_ADD, fd, &mut event)
        })
        .map(|_| ())
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut event = libc::epoll_event {
            events: interests_to_epoll(interest),
            u64: token.0 as u64,
        };
        cvt(unsafe {
            libc::epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_MOD, fd, &mut event)
        })
        .map(|_| ())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        cvt(unsafe {
            libc::epoll_ctl(self.ep.as_raw_fd(), libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut())
        })
        .map(|_| ())
    }
}

fn interests_to_epoll(interest: Interest) -> u32 {
    let mut kind = EPOLLET;
    if interest.is_readable() {
        kind |= EPOLLIN | EPOLLRDHUP;
    }
    if interest.is_writable() {
        kind |= EPOLLOUT;
    }
    kind as u32
}
