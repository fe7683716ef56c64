//! Scenario this crate exists for: a connection sends a few messages, the
//! transport drops mid-flight, `rollback` un-submits everything back to
//! `ready` in original order, and after resend and completion every buffer
//! ends up recycled into `free` rather than leaked.

use io_queue::{BufferFlags, CompletionCode, IoQueue};

#[test]
fn dropped_transport_resends_in_order_then_recycles_buffers() {
    let mut q = IoQueue::new();

    for i in 0..3u8 {
        let mut buf = q.acquire(8);
        buf.payload_mut().extend_from_slice(&[i]);
        buf.set_write_offset(1);
        q.enqueue_ready(buf.with_flags(BufferFlags::MESSAGE_BOUNDARY));
    }

    // First message goes out and completes normally.
    assert!(q.submit_next().is_some());
    assert!(q.complete_front(CompletionCode::Ok(1)));
    let done = q.take_done().unwrap();
    q.release(done);

    // The second message is mid-flight when the transport drops.
    assert!(q.submit_next().is_some());
    assert_eq!(q.inprogress_len(), 1);
    assert_eq!(q.ready_len(), 1);

    q.rollback();
    assert_eq!(q.inprogress_len(), 0);
    assert_eq!(q.ready_len(), 2, "rolled-back buffer goes back in front of the queue");

    // Resend: both remaining messages go out over the new transport, in
    // their original order.
    let first_resend = q.submit_next().unwrap();
    assert_eq!(first_resend.payload()[0], 1);
    assert!(q.complete_front(CompletionCode::Ok(1)));
    q.release(q.take_done().unwrap());

    let second_resend = q.submit_next().unwrap();
    assert_eq!(second_resend.payload()[0], 2);
    q.complete_front(CompletionCode::Ok(1));
    q.release(q.take_done().unwrap());

    assert_eq!(q.ready_len(), 0);
    assert_eq!(q.inprogress_len(), 0);

    // Every buffer came back through `free`; a fresh acquire recycles one
    // instead of allocating.
    let recycled = q.acquire(4);
    assert!(recycled.is_empty());
}
