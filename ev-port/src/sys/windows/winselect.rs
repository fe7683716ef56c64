//! `WSAEventSelect` + `WSAWaitForMultipleEvents` backend, chosen over IOCP
//! for parity with the other platform backends. Level-triggered like
//! `poll`: Windows keeps signaling the event object until the underlying
//! condition is no longer true.

use std::collections::HashMap;
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use windows_sys::Win32::Foundation::{CloseHandle, HANDLE, WAIT_FAILED, WAIT_TIMEOUT};
use windows_sys::Win32::Networking::WinSock::{
    WSACreateEvent, WSAEnumNetworkEvents, WSAEventSelect, WSAGetLastError, FD_ACCEPT, FD_CLOSE,
    FD_CONNECT, FD_READ, FD_WRITE, SOCKET, WSAEVENT, WSANETWORKEVENTS,
};
use windows_sys::Win32::System::Threading::{WaitForMultipleObjects, INFINITE, WAIT_OBJECT_0};

use crate::sys::RawEvent;
use crate::{Interest, Token};

struct Registration {
    socket: SOCKET,
    event: WSAEVENT,
    token: Token,
}

pub struct Selector {
    state: Mutex<Vec<Registration>>,
    waker_handle: Mutex<Option<(HANDLE, Token)>>,
}

fn last_error() -> io::Error {
    io::Error::from_raw_os_error(unsafe { WSAGetLastError() })
}

impl Selector {
    pub fn new() -> io::Result<Selector> {
        Ok(Selector { state: Mutex::new(Vec::new()), waker_handle: Mutex::new(None) })
    }

    /// Folds a standalone Win32 event object (the [`super::waker::Waker`])
    /// into the handle set `select` waits on.
    pub(crate) fn register_waker(&self, handle: HANDLE, token: Token) {
        *self.waker_handle.lock().unwrap() = Some((handle, token));
    }

    pub fn select(&self, out: &mut Vec<RawEvent>, timeout: Option<Duration>) -> io::Result<()> {
        let state = self.state.lock().unwrap();
        let waker = *self.waker_handle.lock().unwrap();
        out.clear();
        if state.is_empty() && waker.is_none() {
            // `WaitForMultipleObjects` rejects an empty handle array; honor
            // the requested timeout as an idle sleep instead.
            if let Some(d) = timeout {
                std::thread::sleep(d);
            }
            return Ok(());
        }

        let mut handles: Vec<HANDLE> = state.iter().map(|r| r.event as HANDLE).collect();
        if let Some((h, _)) = waker {
            handles.push(h);
        }
        let timeout_ms = timeout.map(|d| d.as_millis().min(u128::from(u32::MAX)) as u32).unwrap_or(INFINITE);

        let wait = unsafe {
            WaitForMultipleObjects(handles.len() as u32, handles.as_ptr(), 0, timeout_ms)
        };

        if wait == WAIT_TIMEOUT {
            return Ok(());
        }
        if wait == WAIT_FAILED {
            return Err(io::Error::last_os_error());
        }

        // `WaitForMultipleObjects(bWaitAll = FALSE)` only reports the lowest
        // signaled index, but `WSAEnumNetworkEvents` is itself non-blocking
        // and reports the real pending flags for any socket, so poll every
        // registration rather than just the one the wait call named.
        let _ = wait - WAIT_OBJECT_0;
        for reg in state.iter() {
            let mut events: WSANETWORKEVENTS = unsafe { std::mem::zeroed() };
            if unsafe { WSAEnumNetworkEvents(reg.socket, reg.event, &mut events) } != 0 {
                continue;
            }
            let flags = events.lNetworkEvents;
            if flags == 0 {
                continue;
            }
            out.push(RawEvent {
                token: reg.token,
                readable: flags & (FD_READ | FD_ACCEPT) != 0,
                writable: flags & (FD_WRITE | FD_CONNECT) != 0,
                error: events.iErrorCode.iter().any(|&e| e != 0),
                read_closed: flags & FD_CLOSE != 0,
                write_closed: flags & FD_CLOSE != 0,
            });
        }
        if let Some((handle, token)) = waker {
            // Manual-reset event: check (without consuming) whether it's
            // currently signaled; `EventPort`'s waker handler resets it via
            // `Waker::ack` once it has drained the wakeup.
            let signaled = unsafe { WaitForMultipleObjects(1, &handle, 0, 0) } == WAIT_OBJECT_0;
            if signaled {
                out.push(RawEvent {
                    token,
                    readable: true,
                    writable: false,
                    error: false,
                    read_closed: false,
                    write_closed: false,
                });
            }
        }
        Ok(())
    }

    pub fn register(&self, socket: SOCKET, token: Token, interest: Interest) -> io::Result<()> {
        let event = unsafe { WSACreateEvent() };
        if event == 0 {
            return Err(last_error());
        }
        let mask = interests_to_mask(interest);
        if unsafe { WSAEventSelect(socket, event, mask) } != 0 {
            let err = last_error();
            unsafe { CloseHandle(event as HANDLE) };
            return Err(err);
        }
        self.state.lock().unwrap().push(Registration { socket, event, token });
        Ok(())
    }

    pub fn reregister(&self, socket: SOCKET, token: Token, interest: Interest) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        let reg = state
            .iter_mut()
            .find(|r| r.socket == socket)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        reg.token = token;
        let mask = interests_to_mask(interest);
        if unsafe { WSAEventSelect(socket, reg.event, mask) } != 0 {
            return Err(last_error());
        }
        Ok(())
    }

    pub fn deregister(&self, socket: SOCKET) -> io::Result<()> {
        let mut state = self.state.lock().unwrap();
        let idx = state
            .iter()
            .position(|r| r.socket == socket)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let reg = state.swap_remove(idx);
        unsafe {
            WSAEventSelect(reg.socket, 0, 0);
            CloseHandle(reg.event as HANDLE);
        }
        Ok(())
    }
}

fn interests_to_mask(interest: Interest) -> i32 {
    let mut mask = FD_CLOSE;
    if interest.is_readable() {
        mask |= FD_READ | FD_ACCEPT;
    }
    if interest.is_writable() {
        mask |= FD_WRITE | FD_CONNECT;
    }
    mask
}
