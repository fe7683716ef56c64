//! Portable `poll(2)` backend: one of the four real backends (not merely a
//! fallback) for platforms/targets where edge-
//! triggered epoll/kqueue aren't wanted; it is level-triggered, so the port
//! relies on the OS re-reporting readiness rather than on drain-to-`WouldBlock`.

use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::Mutex;
use std::time::Duration;

use crate::sys::RawEvent;
use crate::{Interest, Token};

struct FdEntry {
    index: usize,
    token: Token,
}

struct State {
    poll_fds: Vec<libc::pollfd>,
    by_fd: HashMap<RawFd, FdEntry>,
}

pub struct Selector {
    state: Mutex<State>,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        Ok(Selector {
            state: Mutex::new(State { poll_fds: Vec::new(), by_fd: HashMap::new() }),
        })
    }

    pub fn select(&self, out: &mut Vec<RawEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let timeout_ms = timeout
            .map(|to| {
                let mut ms = to.as_millis().min(i32::MAX as u128) as i32;
                if Duration::from_millis(ms as u64) < to {
                    ms = ms.saturating_add(1);
                }
                ms
            })
            .unwrap_or(-1);

        // Snapshot the pollfd set under the lock, then poll unlocked so a
        // concurrent register/reregister/deregister isn't stalled for the
        // whole timeout; re-lock only to translate indices back to tokens.
        let mut poll_fds = { self.state.lock().unwrap().poll_fds.clone() };

        let n = loop {
            let ret = unsafe {
                libc::poll(poll_fds.as_mut_ptr(), poll_fds.len() as libc::nfds_t, timeout_ms)
            };
            if ret == -1 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    continue;
                }
                return Err(err);
            }
            break ret as usize;
        };

        out.clear();
        if n == 0 {
            return Ok(());
        }

        let state = self.state.lock().unwrap();
        for pfd in &poll_fds {
            if pfd.revents == 0 {
                continue;
            }
            // The fd may have been deregistered between the snapshot and
            // now; a stale entry just has nothing left to report against.
            let Some(entry) = state.by_fd.get(&pfd.fd) else { continue };
            let revents = pfd.revents as libc::c_int;
            out.push(RawEvent {
                token: entry.token,
                readable: revents & (libc::POLLIN | libc::POLLPRI) != 0,
                writable: revents & libc::POLLOUT != 0,
                error: revents & libc::POLLERR != 0,
                read_closed: revents & (libc::POLLHUP | libc::POLLRDHUP) != 0,
                write_closed: revents & libc::POLLHUP != 0
                    || (revents & libc::POLLOUT != 0 && revents & libc::POLLERR != 0),
            });
        }
        Ok(())
    }

    pub fn register(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.by_fd.contains_key(&fd) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "fd already registered"));
        }
        let index = state.poll_fds.len();
        state.poll_fds.push(libc::pollfd { fd, events: interests_to_poll(interest), revents: 0 });
        state.by_fd.insert(fd, FdEntry { index, token });
        Ok(())
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        let index = state
            .by_fd
            .get(&fd)
            .map(|e| e.index)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.poll_fds[index].events = interests_to_poll(interest);
        state.by_fd.get_mut(&fd).unwrap().token = token;
        Ok(())
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.by_fd.remove(&fd).ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.poll_fds.swap_remove(entry.index);
        if let Some(moved) = state.poll_fds.get(entry.index) {
            let moved_fd = moved.fd;
            state.by_fd.get_mut(&moved_fd).unwrap().index = entry.index;
        }
        Ok(())
    }
}

fn interests_to_poll(interest: Interest) -> libc::c_short {
    let mut kind = 0;
    if interest.is_readable() {
        kind |= libc::POLLIN | libc::POLLRDHUP;
    }
    if interest.is_writable() {
        kind |= libc::POLLOUT;
    }
    kind
}
