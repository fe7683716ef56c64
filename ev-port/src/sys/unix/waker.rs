//! Cross-thread wakeup for a blocked `select`. Backed by `eventfd` on Linux
//! and a self-pipe everywhere else `eventfd` isn't available, following the
//! teacher's per-platform waker split.

use std::io;
use std::os::fd::{AsRawFd, RawFd};

use crate::sys::{RawFdLike, Selector};
use crate::{Interest, Token};

#[cfg(any(target_os = "linux", target_os = "android"))]
mod backing {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::{AsRawFd, FromRawFd, RawFd};

    pub struct Backing(File);

    impl Backing {
        pub fn new() -> io::Result<Backing> {
            let fd = unsafe { libc::eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK) };
            if fd == -1 {
                return Err(io::Error::last_os_error());
            }
            Ok(Backing(unsafe { File::from_raw_fd(fd) }))
        }

        pub fn notify(&self) -> io::Result<()> {
            let buf = 1u64.to_ne_bytes();
            match (&self.0).write(&buf) {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(e),
            }
        }

        pub fn ack(&self) {
            let mut buf = [0u8; 8];
            let _ = (&self.0).read_exact(&mut buf).or_else(|e| {
                if e.kind() == io::ErrorKind::WouldBlock {
                    Ok(())
                } else {
                    Err(e)
                }
            });
        }
    }

    impl AsRawFd for Backing {
        fn as_raw_fd(&self) -> RawFd {
            self.0.as_raw_fd()
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
mod backing {
    use std::fs::File;
    use std::io::{self, Read, Write};
    use std::os::fd::{AsRawFd, FromRawFd, RawFd};

    pub struct Backing {
        read: File,
        write: File,
    }

    impl Backing {
        pub fn new() -> io::Result<Backing> {
            let mut fds = [0; 2];
            if unsafe { libc::pipe(fds.as_mut_ptr()) } == -1 {
                return Err(io::Error::last_os_error());
            }
            let flags = unsafe { libc::fcntl(fds[0], libc::F_GETFL) };
            unsafe { libc::fcntl(fds[0], libc::F_SETFL, flags | libc::O_NONBLOCK) };
            Ok(Backing {
                read: unsafe { File::from_raw_fd(fds[0]) },
                write: unsafe { File::from_raw_fd(fds[1]) },
            })
        }

        pub fn notify(&self) -> io::Result<()> {
            match (&self.write).write(&[1u8]) {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
                Err(e) => Err(e),
            }
        }

        pub fn ack(&self) {
            let mut buf = [0u8; 64];
            while matches!((&self.read).read(&mut buf), Ok(n) if n > 0) {}
        }
    }

    impl AsRawFd for Backing {
        fn as_raw_fd(&self) -> RawFd {
            self.read.as_raw_fd()
        }
    }
}

/// Wakes a thread blocked in [`Selector::select`] by registering itself as
/// an ordinary readable fd and writing to it; the port's dispatch loop
/// acks (drains) it like any other readable source.
pub struct Waker {
    backing: backing::Backing,
}

impl Waker {
    pub fn new(selector: &Selector, token: Token) -> io::Result<Waker> {
        let backing = backing::Backing::new()?;
        selector.register(backing.as_raw_fd() as RawFdLike, token, Interest::READABLE)?;
        Ok(Waker { backing })
    }

    pub fn wake(&self) -> io::Result<()> {
        self.backing.notify()
    }

    pub fn ack(&self) {
        self.backing.ack()
    }

    pub fn raw_fd(&self) -> RawFd {
        self.backing.as_raw_fd()
    }
}
