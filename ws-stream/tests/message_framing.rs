//! Multi-message scenarios that don't fit the unit tests beside the code:
//! writing several whole messages through one shared queue, and discarding
//! a message mid-write via `OutboundStream::reset`/`InboundStream::reset`.

use io_queue::{BufferFlags, CompletionCode, IoQueue};
use ws_stream::{InboundStream, OutboundStream};

#[test]
fn sequential_messages_each_get_their_own_boundary() {
    let mut queue = IoQueue::new();

    for msg in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        let mut out = OutboundStream::new(&mut queue);
        out.write(msg);
        out.finish(|code| assert_eq!(code, CompletionCode::Ok(0)));
    }

    assert_eq!(queue.ready_len(), 3);
    for expected in [&b"one"[..], &b"two"[..], &b"three"[..]] {
        let buf = queue.submit_next().unwrap();
        assert!(buf.flags().contains(BufferFlags::MESSAGE_BOUNDARY));
        assert_eq!(buf.payload(), expected);
        queue.complete_front(CompletionCode::Ok(0));
        let done = queue.take_done().unwrap();
        queue.release(done);
    }
}

#[test]
fn reset_discards_a_partially_written_message() {
    let mut queue = IoQueue::new();
    let mut out = OutboundStream::new(&mut queue);
    out.write(b"partial");
    out.reset();

    assert_eq!(queue.ready_len(), 0);
    // The buffer came back through `free`.
    let recycled = queue.acquire(4);
    assert!(recycled.is_empty());
}

#[test]
fn inbound_reset_releases_without_reading() {
    let mut queue = IoQueue::new();
    let mut buf = queue.acquire(16);
    buf.payload_mut().extend_from_slice(b"discard me");
    buf.set_write_offset(10);
    queue.enqueue_ready(buf.with_flags(BufferFlags::MESSAGE_BOUNDARY));

    let msg = InboundStream::assemble(&mut queue).expect("message complete");
    msg.reset(&mut queue);

    let recycled = queue.acquire(4);
    assert!(recycled.is_empty(), "buffer must have been recycled through free");
}
