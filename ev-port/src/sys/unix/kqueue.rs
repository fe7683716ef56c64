//! `kqueue(2)` backend for the BSD family. Registers both filters
//! unconditionally and adds/removes with `EV_ADD`/`EV_DELETE` depending on
//! interest, matching mio's "can't inspect current filters" approach
//! since kqueue has no read-back.

use std::io;
use std::os::fd::{AsRawFd, RawFd};
use std::time::Duration;

use crate::sys::RawEvent;
use crate::{Interest, Token};

#[cfg(any(target_os = "freebsd", target_os = "dragonfly", target_os = "ios", target_os = "macos"))]
type Data = libc::intptr_t;
#[cfg(any(target_os = "netbsd", target_os = "openbsd"))]
type Data = i64;

#[cfg(not(target_os = "netbsd"))]
type Count = libc::c_int;
#[cfg(target_os = "netbsd")]
type Count = libc::size_t;

macro_rules! kevent {
    ($id:expr, $filter:expr, $flags:expr, $udata:expr) => {
        libc::kevent {
            ident: $id as libc::uintptr_t,
            filter: $filter as _,
            flags: $flags,
            fflags: 0,
            data: 0,
            udata: $udata as *mut libc::c_void,
        }
    };
}

fn cvt(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret == -1 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

#[derive(Debug)]
pub struct Selector {
    kq: RawFd,
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        let kq = cvt(unsafe { libc::kqueue() })?;
        cvt(unsafe { libc::fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC) })?;
        Ok(Selector { kq })
    }

    pub fn select(&self, out: &mut Vec<RawEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let ts = timeout.map(|to| libc::timespec {
            tv_sec: to.as_secs() as libc::time_t,
            tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
        });
        let ts_ptr = ts.as_ref().map(|t| t as *const _).unwrap_or(std::ptr::null());

        let mut buf: [libc::kevent; 256] = unsafe { std::mem::zeroed() };
        let n = cvt(unsafe {
            libc::kevent(
                self.kq,
                std::ptr::null(),
                0,
                buf.as_mut_ptr(),
                buf.len() as Count,
                ts_ptr,
            )
        })?;

        out.clear();
        for raw in &buf[..n as usize] {
            let token = Token(raw.udata as usize);
            let readable = raw.filter == libc::EVFILT_READ;
            let writable = raw.filter == libc::EVFILT_WRITE;
            let error = (raw.flags & libc::EV_ERROR) != 0
                || ((raw.flags & libc::EV_EOF) != 0 && raw.fflags != 0);
            out.push(RawEvent {
                token,
                readable,
                writable,
                error,
                read_closed: readable && raw.flags & libc::EV_EOF != 0,
                write_closed: writable && raw.flags & libc::EV_EOF != 0,
            });
        }
        Ok(())
    }

    pub fn register(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let flags = libc::EV_CLEAR | libc::EV_RECEIPT | libc::EV_ADD;
        let mut changes = Vec::with_capacity(2);
        if interest.is_writable() {
            changes.push(kevent!(fd, libc::EVFILT_WRITE, flags, token.0));
        }
        if interest.is_readable() {
            changes.push(kevent!(fd, libc::EVFILT_READ, flags, token.0));
        }
        // Ignore EPIPE: registering a pipe whose other end is already gone
        // can return it on some BSDs even though kqueue will still report
        // events for it afterwards.
        kevent_register(self.kq, &mut changes, &[libc::EPIPE as Data])
    }

    pub fn reregister(&self, fd: RawFd, token: Token, interest: Interest) -> io::Result<()> {
        let flags = libc::EV_CLEAR | libc::EV_RECEIPT;
        let write_flags = if interest.is_writable() { flags | libc::EV_ADD } else { flags | libc::EV_DELETE };
        let read_flags = if interest.is_readable() { flags | libc::EV_ADD } else { flags | libc::EV_DELETE };
        let mut changes = vec![
            kevent!(fd, libc::EVFILT_WRITE, write_flags, token.0),
            kevent!(fd, libc::EVFILT_READ, read_flags, token.0),
        ];
        kevent_register(self.kq, &mut changes, &[libc::ENOENT as Data, libc::EPIPE as Data])
    }

    pub fn deregister(&self, fd: RawFd) -> io::Result<()> {
        let flags = libc::EV_DELETE | libc::EV_RECEIPT;
        let mut changes = vec![
            kevent!(fd, libc::EVFILT_WRITE, flags, 0),
            kevent!(fd, libc::EVFILT_READ, flags, 0),
        ];
        kevent_register(self.kq, &mut changes, &[libc::ENOENT as Data])
    }
}

impl AsRawFd for Selector {
    fn as_raw_fd(&self) -> RawFd {
        self.kq
    }
}

impl Drop for Selector {
    fn drop(&mut self) {
        if unsafe { libc::close(self.kq) } == -1 {
            tracing::warn!(error = %io::Error::last_os_error(), "closing kqueue fd failed");
        }
    }
}

fn kevent_register(kq: RawFd, changes: &mut [libc::kevent], ignored: &[Data]) -> io::Result<()> {
    let n = changes.len() as Count;
    cvt(unsafe { libc::kevent(kq, changes.as_ptr(), n, changes.as_mut_ptr(), n, std::ptr::null()) })
        .map(|_| ())
        .or_else(|err| if err.raw_os_error() == Some(libc::EINTR) { Ok(()) } else { Err(err) })?;

    for c in changes.iter() {
        let data = c.data;
        if (c.flags & libc::EV_ERROR != 0) && data != 0 && !ignored.contains(&data) {
            return Err(io::Error::from_raw_os_error(data as i32));
        }
    }
    Ok(())
}
