//! Cross-thread wakeup via a manual-reset Win32 event object included
//! alongside the WinSock event handles `winselect::Selector::select` waits
//! on.

use std::io;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
use windows_sys::Win32::System::Threading::{CreateEventW, ResetEvent, SetEvent};

pub struct Waker {
    handle: HANDLE,
}

unsafe impl Send for Waker {}
unsafe impl Sync for Waker {}

impl Waker {
    pub fn new() -> io::Result<Waker> {
        let handle = unsafe { CreateEventW(std::ptr::null(), 1, 0, std::ptr::null()) };
        if handle == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Waker { handle })
    }

    pub fn wake(&self) -> io::Result<()> {
        if unsafe { SetEvent(self.handle) } == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn ack(&self) {
        unsafe {
            ResetEvent(self.handle);
        }
    }

    pub fn handle(&self) -> HANDLE {
        self.handle
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.handle);
        }
    }
}
