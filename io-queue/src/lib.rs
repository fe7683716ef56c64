//! FIFO buffer queue over the four named sub-lists every I/O operation in
//! the tunnel core moves through: `ready` (filled, awaiting submit) →
//! `inprogress` (submitted, awaiting completion) → `done` (completed,
//! awaiting delivery), plus a `free` pool recycling released buffers.
//!
//! Grounded in mio's handle-table style (arena ownership, no raw
//! pointers) but the data structure itself — four `VecDeque`s a buffer
//! migrates between — comes straight from the tunnel's own queue design;
//! `mio` itself has no buffering layer to borrow one from.

use std::collections::VecDeque;

use bytes::BytesMut;
use prx_error::PrxErrorKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferFlags(u8);

impl BufferFlags {
    pub const NONE: BufferFlags = BufferFlags(0);
    /// Marks the final fragment of a logical message.
    pub const MESSAGE_BOUNDARY: BufferFlags = BufferFlags(0b01);
    /// Marks a continuation fragment, not yet a complete message.
    pub const FRAGMENT: BufferFlags = BufferFlags(0b10);

    pub const fn contains(self, other: BufferFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: BufferFlags) -> BufferFlags {
        BufferFlags(self.0 | other.0)
    }
}

/// The outcome delivered to a buffer's completion callback. `Copy` because
/// it carries no heap data — `Failed` stores only the canonical error kind,
/// not a full `PrxError` with its boxed source (the callback gets an owned
/// `CompletionCode`; anything richer belongs in the caller's own log line).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionCode {
    Ok(usize),
    Aborted,
    Failed(PrxErrorKind),
}

pub type CompletionCallback = Box<dyn FnOnce(CompletionCode) + Send>;

/// One buffer migrating through the queue's four sub-lists.
pub struct Buffer {
    payload: BytesMut,
    write_offset: usize,
    read_offset: usize,
    flags: BufferFlags,
    on_complete: Option<CompletionCallback>,
    completion_code: Option<CompletionCode>,
}

impl Buffer {
    pub fn with_capacity(capacity: usize) -> Buffer {
        Buffer {
            payload: BytesMut::with_capacity(capacity),
            write_offset: 0,
            read_offset: 0,
            flags: BufferFlags::NONE,
            on_complete: None,
            completion_code: None,
        }
    }

    pub fn from_payload(payload: BytesMut) -> Buffer {
        let write_offset = payload.len();
        Buffer { payload, write_offset, read_offset: 0, flags: BufferFlags::NONE, on_complete: None, completion_code: None }
    }

    pub fn with_flags(mut self, flags: BufferFlags) -> Buffer {
        self.flags = flags;
        self
    }

    pub fn on_complete(mut self, cb: impl FnOnce(CompletionCode) + Send + 'static) -> Buffer {
        self.on_complete = Some(Box::new(cb));
        self
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload[self.read_offset..self.write_offset]
    }

    pub fn payload_mut(&mut self) -> &mut BytesMut {
        &mut self.payload
    }

    pub fn len(&self) -> usize {
        self.write_offset - self.read_offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn flags(&self) -> BufferFlags {
        self.flags
    }

    pub fn write_offset(&self) -> usize {
        self.write_offset
    }

    pub fn set_write_offset(&mut self, offset: usize) {
        self.write_offset = offset;
    }

    pub fn read_offset(&self) -> usize {
        self.read_offset
    }

    /// Advances the read cursor after a partial consume (e.g. a short
    /// `send()`); never moves past `write_offset`.
    pub fn advance_read(&mut self, n: usize) {
        self.read_offset = (self.read_offset + n).min(self.write_offset);
    }

    pub fn completion_code(&self) -> Option<CompletionCode> {
        self.completion_code
    }

    fn reset(mut self) -> Buffer {
        self.payload.clear();
        self.write_offset = 0;
        self.read_offset = 0;
        self.flags = BufferFlags::NONE;
        self.on_complete = None;
        self.completion_code = None;
        self
    }
}

/// The four-sublist queue itself. Not `Send`/`Sync`-bounded on purpose —
/// every `io-queue` instance is owned by exactly one `ws-stream`, driven
/// from the single-threaded scheduler task for its connection.
#[derive(Default)]
pub struct IoQueue {
    ready: VecDeque<Buffer>,
    inprogress: VecDeque<Buffer>,
    done: VecDeque<Buffer>,
    free: VecDeque<Buffer>,
}

impl IoQueue {
    pub fn new() -> IoQueue {
        IoQueue::default()
    }

    /// Recycles a buffer from `free` with at least `capacity` bytes, or
    /// allocates a fresh one.
    pub fn acquire(&mut self, capacity: usize) -> Buffer {
        match self.free.pop_front() {
            Some(buf) if buf.payload.capacity() >= capacity => buf,
            Some(_) => Buffer::with_capacity(capacity),
            None => Buffer::with_capacity(capacity),
        }
    }

    pub fn enqueue_ready(&mut self, buffer: Buffer) {
        self.ready.push_back(buffer);
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub fn inprogress_len(&self) -> usize {
        self.inprogress.len()
    }

    /// Moves the head of `ready` into `inprogress`, returning a reference
    /// the caller uses to drive the actual I/O (e.g. `socket.send`).
    pub fn submit_next(&mut self) -> Option<&mut Buffer> {
        let buf = self.ready.pop_front()?;
        self.inprogress.push_back(buf);
        self.inprogress.back_mut()
    }

    pub fn inprogress_front_mut(&mut self) -> Option<&mut Buffer> {
        self.inprogress.front_mut()
    }

    /// Pops the head of `ready` without submitting it — used to undo a
    /// partial message gather when a full message isn't buffered yet.
    pub fn take_ready(&mut self) -> Option<Buffer> {
        self.ready.pop_front()
    }

    /// Pushes a buffer back onto the head of `ready`, in gather-reversal
    /// order (see [`IoQueue::take_ready`]).
    pub fn requeue_ready_front(&mut self, buffer: Buffer) {
        self.ready.push_front(buffer);
    }

    /// Pops the most recently submitted buffer back out of `inprogress` by
    /// value. Used by the inbound message-assembly path, which reuses
    /// `inprogress` as "handed off for delivery" rather than "awaiting a
    /// native I/O completion".
    pub fn take_inprogress_back(&mut self) -> Option<Buffer> {
        self.inprogress.pop_back()
    }

    /// Completes the head of `inprogress`, firing its callback and moving
    /// it to `done`.
    pub fn complete_front(&mut self, code: CompletionCode) -> bool {
        let mut buf = match self.inprogress.pop_front() {
            Some(buf) => buf,
            None => return false,
        };
        buf.completion_code = Some(code);
        if let Some(cb) = buf.on_complete.take() {
            cb(code);
        }
        self.done.push_back(buf);
        true
    }

    pub fn take_done(&mut self) -> Option<Buffer> {
        self.done.pop_front()
    }

    /// Releases a consumed buffer back into `free` for reuse.
    pub fn release(&mut self, buffer: Buffer) {
        self.free.push_back(buffer.reset());
    }

    /// Atomically moves every `inprogress` entry back to the head of
    /// `ready`, preserving original submission order — required for
    /// correct resend after reconnect.
    pub fn rollback(&mut self) {
        while let Some(buf) = self.inprogress.pop_back() {
            self.ready.push_front(buf);
        }
    }

    /// Completes every buffer still in `ready` or `inprogress` with
    /// `Aborted`, then releases it to `free`. Used on `close`.
    pub fn abort(&mut self) {
        let pending: Vec<Buffer> = self.inprogress.drain(..).chain(self.ready.drain(..)).collect();
        for mut buf in pending {
            buf.completion_code = Some(CompletionCode::Aborted);
            if let Some(cb) = buf.on_complete.take() {
                cb(CompletionCode::Aborted);
            }
            self.free.push_back(buf.reset());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn rollback_preserves_submission_order() {
        let mut q = IoQueue::new();
        for i in 0..3u8 {
            let mut buf = q.acquire(4);
            buf.payload_mut().extend_from_slice(&[i]);
            buf.set_write_offset(1);
            q.enqueue_ready(buf);
        }
        assert!(q.submit_next().is_some());
        assert!(q.submit_next().is_some());
        assert!(q.submit_next().is_some());
        assert_eq!(q.inprogress_len(), 3);
        assert_eq!(q.ready_len(), 0);

        q.rollback();
        assert_eq!(q.inprogress_len(), 0);
        assert_eq!(q.ready_len(), 3);

        let order: Vec<u8> = (0..3)
            .map(|_| {
                let buf = q.submit_next().unwrap();
                buf.payload()[0]
            })
            .collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn abort_completes_everything_pending() {
        let mut q = IoQueue::new();
        let aborted = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = aborted.clone();
            let buf = q
                .acquire(0)
                .on_complete(move |code| {
                    assert_eq!(code, CompletionCode::Aborted);
                    counter.fetch_add(1, Ordering::SeqCst);
                });
            q.enqueue_ready(buf);
        }
        q.submit_next();
        q.abort();
        assert_eq!(aborted.load(Ordering::SeqCst), 3);
        assert_eq!(q.ready_len(), 0);
        assert_eq!(q.inprogress_len(), 0);
    }

    #[test]
    fn complete_front_moves_to_done_and_fires_callback() {
        let mut q = IoQueue::new();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        let buf = q.acquire(0).on_complete(move |code| {
            assert_eq!(code, CompletionCode::Ok(5));
            counter.fetch_add(1, Ordering::SeqCst);
        });
        q.enqueue_ready(buf);
        q.submit_next();
        assert!(q.complete_front(CompletionCode::Ok(5)));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        let done = q.take_done().unwrap();
        assert_eq!(done.completion_code(), Some(CompletionCode::Ok(5)));
    }
}
