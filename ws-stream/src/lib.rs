//! Streaming reader/writer facade over `io-queue`. `ws-connection` hands a
//! [`ws-stream`] OutboundStream to a caller's writer callback and an
//! InboundStream to its receiver callback; neither ever sees `io-queue`'s
//! sub-lists directly.

use io_queue::{Buffer, BufferFlags, CompletionCode, IoQueue};

/// Every outbound frame except the message's last is tagged `FRAGMENT`;
/// the last is tagged `MESSAGE_BOUNDARY` and carries the completion.
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// A writable stream over one logical outbound message. Capacity is
/// "effectively infinite" — buffers spill and allocate as needed.
pub struct OutboundStream<'q> {
    queue: &'q mut IoQueue,
    current: Buffer,
}

impl<'q> OutboundStream<'q> {
    pub fn new(queue: &'q mut IoQueue) -> OutboundStream<'q> {
        let current = queue.acquire(DEFAULT_FRAME_SIZE);
        OutboundStream { queue, current }
    }

    /// Appends bytes, spilling the current buffer into `ready` (tagged
    /// `FRAGMENT`) whenever it fills to `DEFAULT_FRAME_SIZE`.
    pub fn write(&mut self, mut data: &[u8]) {
        while !data.is_empty() {
            let used = self.current.write_offset();
            let space = DEFAULT_FRAME_SIZE.saturating_sub(used);
            if space == 0 {
                self.spill();
                continue;
            }
            let take = space.min(data.len());
            self.current.payload_mut().extend_from_slice(&data[..take]);
            self.current.set_write_offset(used + take);
            data = &data[take..];
            if self.current.write_offset() >= DEFAULT_FRAME_SIZE {
                self.spill();
            }
        }
    }

    fn spill(&mut self) {
        let full = std::mem::replace(&mut self.current, self.queue.acquire(DEFAULT_FRAME_SIZE));
        self.queue.enqueue_ready(full.with_flags(BufferFlags::FRAGMENT));
    }

    /// Ends the message: the (possibly partial, possibly empty) current
    /// buffer is tagged `MESSAGE_BOUNDARY`, given `on_complete`, and
    /// enqueued to `ready`. The completion fires exactly once, on this
    /// final buffer only, once the connection's send pipeline completes it.
    pub fn finish(self, on_complete: impl FnOnce(CompletionCode) + Send + 'static) {
        let OutboundStream { queue, current } = self;
        let last = current.with_flags(BufferFlags::MESSAGE_BOUNDARY).on_complete(on_complete);
        queue.enqueue_ready(last);
    }

    /// Releases every buffer queued so far for this message, including the
    /// in-progress `current` buffer — no partially delivered fragment is
    /// observable after this returns.
    pub fn reset(self) {
        let OutboundStream { queue, current } = self;
        queue.release(current);
        while let Some(buf) = queue.take_ready() {
            queue.release(buf);
        }
    }
}

/// A readable stream over one fully-assembled inbound message: the
/// concatenation of every fragment buffer up to and including the one
/// tagged `MESSAGE_BOUNDARY`.
pub struct InboundStream {
    buffers: Vec<Buffer>,
    cursor: usize,
    offset: usize,
}

impl InboundStream {
    /// Drains buffers from `ready` until a `MESSAGE_BOUNDARY` buffer is
    /// found, returning the assembled message. Returns `None` (and undoes
    /// any partial gather) if the queue doesn't yet hold a complete
    /// message.
    pub fn assemble(queue: &mut IoQueue) -> Option<InboundStream> {
        let mut gathered: Vec<Buffer> = Vec::new();
        loop {
            if queue.ready_len() == 0 {
                while let Some(buf) = gathered.pop() {
                    queue.requeue_ready_front(buf);
                }
                return None;
            }
            let is_boundary = {
                let buf = queue.submit_next().expect("ready_len checked above");
                buf.flags().contains(BufferFlags::MESSAGE_BOUNDARY)
            };
            let buf = queue.take_inprogress_back().expect("buffer just submitted");
            gathered.push(buf);
            if is_boundary {
                return Some(InboundStream { buffers: gathered, cursor: 0, offset: 0 });
            }
        }
    }

    /// Copies up to `out.len()` bytes, returning the number actually read.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let mut written = 0;
        while written < out.len() && self.cursor < self.buffers.len() {
            let remaining_len = self.buffers[self.cursor].len().saturating_sub(self.offset);
            if remaining_len == 0 {
                self.cursor += 1;
                self.offset = 0;
                continue;
            }
            let payload = &self.buffers[self.cursor].payload()[self.offset..];
            let take = payload.len().min(out.len() - written);
            out[written..written + take].copy_from_slice(&payload[..take]);
            written += take;
            self.offset += take;
        }
        written
    }

    /// Bytes not yet consumed by [`InboundStream::read`].
    pub fn readable(&self) -> usize {
        self.buffers[self.cursor..]
            .iter()
            .enumerate()
            .map(|(i, buf)| if i == 0 { buf.len().saturating_sub(self.offset) } else { buf.len() })
            .sum()
    }

    /// Releases every buffer in this message back to `queue`'s `free` pool.
    /// Called after the receiver callback returns.
    pub fn release(self, queue: &mut IoQueue) {
        for buf in self.buffers {
            queue.release(buf);
        }
    }

    /// Releases every buffer without finishing the read — no partially
    /// delivered fragment remains observable once this returns.
    pub fn reset(self, queue: &mut IoQueue) {
        self.release(queue);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn write_spills_across_frame_boundaries() {
        let mut queue = IoQueue::new();
        let mut out = OutboundStream::new(&mut queue);
        let chunk = vec![7u8; DEFAULT_FRAME_SIZE + 10];
        out.write(&chunk);
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        out.finish(move |code| {
            assert_eq!(code, CompletionCode::Ok(0));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(queue.ready_len(), 2);
        let first = queue.submit_next().unwrap();
        assert!(first.flags().contains(BufferFlags::FRAGMENT));
        assert_eq!(first.len(), DEFAULT_FRAME_SIZE);
        queue.complete_front(CompletionCode::Ok(DEFAULT_FRAME_SIZE));

        let second = queue.submit_next().unwrap();
        assert!(second.flags().contains(BufferFlags::MESSAGE_BOUNDARY));
        assert_eq!(second.len(), 10);
        queue.complete_front(CompletionCode::Ok(0));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn assemble_waits_for_message_boundary() {
        let mut queue = IoQueue::new();
        let mut frag = queue.acquire(16);
        frag.payload_mut().extend_from_slice(b"hello ");
        frag.set_write_offset(6);
        queue.enqueue_ready(frag.with_flags(BufferFlags::FRAGMENT));

        assert!(InboundStream::assemble(&mut queue).is_none());
        assert_eq!(queue.ready_len(), 1, "partial gather must be rolled back");

        let mut last = queue.acquire(16);
        last.payload_mut().extend_from_slice(b"world");
        last.set_write_offset(5);
        queue.enqueue_ready(last.with_flags(BufferFlags::MESSAGE_BOUNDARY));

        let mut msg = InboundStream::assemble(&mut queue).expect("message complete");
        assert_eq!(msg.readable(), 11);
        let mut buf = [0u8; 11];
        assert_eq!(msg.read(&mut buf), 11);
        assert_eq!(&buf, b"hello world");
        msg.release(&mut queue);
    }
}
