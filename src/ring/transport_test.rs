use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::codec::Message;
use crate::codec::MessageType;
use crate::codec::TransactionId;
use crate::constants::RING_SIZE;
use crate::test_utils::enable_logger;
use crate::Error;

fn write_msg(
    req_id: u32,
    payload: Vec<u8>,
) -> Message {
    Message::new(MessageType::Write, req_id, TransactionId::NIL, payload)
}

#[tokio::test]
async fn test_write_notifies_peer_once_per_frame() {
    let page = Arc::new(RingPage::new());
    let mut channel = MockEventChannel::new();
    channel.expect_notify().times(3).returning(|| Ok(()));
    let transport = RingTransport::new(page.clone(), Arc::new(channel), Side::Guest);

    for i in 0..3 {
        transport.write(&write_msg(i, b"v".to_vec())).await.unwrap();
    }

    let store_side = ByteRing::new(page, Direction::Request);
    for i in 0..3 {
        assert_eq!(store_side.try_pop().unwrap().unwrap().req_id(), i);
    }
}

#[tokio::test]
async fn test_write_surfaces_channel_failure_as_fatal() {
    let mut channel = MockEventChannel::new();
    channel
        .expect_notify()
        .times(1)
        .returning(|| Err(Error::Fatal("channel gone".to_string())));
    let transport = RingTransport::new(Arc::new(RingPage::new()), Arc::new(channel), Side::Guest);

    let result = transport.write(&write_msg(0, Vec::new())).await;

    assert!(matches!(result, Err(Error::Fatal(_))));
}

#[tokio::test]
async fn test_write_rejects_frame_larger_than_ring() {
    let mut channel = MockEventChannel::new();
    channel.expect_notify().never();
    let transport = RingTransport::new(Arc::new(RingPage::new()), Arc::new(channel), Side::Guest);

    let result = transport.write(&write_msg(0, vec![0; RING_SIZE])).await;

    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn test_write_waits_for_space_then_resumes() {
    let page = Arc::new(RingPage::new());
    let mut channel = MockEventChannel::new();
    channel.expect_notify().times(2).returning(|| Ok(()));
    let transport = Arc::new(RingTransport::new(page.clone(), Arc::new(channel), Side::Guest));

    let big = write_msg(0, vec![1; RING_SIZE / 2]);
    transport.write(&big).await.unwrap();

    let blocked = {
        let transport = transport.clone();
        let big = big.clone();
        tokio::spawn(async move { transport.write(&big).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!blocked.is_finished());

    // Store daemon consumes the first frame and signals
    let store_side = ByteRing::new(page, Direction::Request);
    assert_eq!(store_side.try_pop().unwrap(), Some(big.clone()));
    transport.handle_notification();

    blocked.await.unwrap().unwrap();
    assert_eq!(store_side.try_pop().unwrap(), Some(big));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_writers_never_interleave_frames() {
    enable_logger();
    let page: Arc<dyn SharedRing> = Arc::new(RingPage::new());
    let (guest_chan, store_chan) = LoopbackChannel::pair();
    let guest = Arc::new(RingTransport::new(page.clone(), guest_chan, Side::Guest));
    let store = Arc::new(RingTransport::new(page, store_chan, Side::Store));
    guest.bind().unwrap();
    store.bind().unwrap();

    const WRITERS: u32 = 8;
    const PER_WRITER: u32 = 20;

    let mut handles = Vec::new();
    for w in 0..WRITERS {
        let guest = guest.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..PER_WRITER {
                // Big enough that the ring fills up regularly
                let payload = format!("{w}:{i}:{}", "x".repeat(150)).into_bytes();
                guest.write(&write_msg(w, payload)).await.unwrap();
            }
        }));
    }

    let mut seen: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut total = 0;
    while total < WRITERS * PER_WRITER {
        let mut drained = false;
        while let Some(m) = store.read().unwrap() {
            let text = String::from_utf8(m.payload.clone()).unwrap();
            let mut parts = text.split(':');
            let w: u32 = parts.next().unwrap().parse().unwrap();
            let i: u32 = parts.next().unwrap().parse().unwrap();
            assert_eq!(w, m.req_id());
            seen.entry(w).or_default().push(i);
            total += 1;
            drained = true;
        }
        if drained {
            store.notify_peer().unwrap();
        } else {
            store.wait_inbound().await;
        }
    }

    for h in handles {
        h.await.unwrap();
    }
    for w in 0..WRITERS {
        assert_eq!(seen[&w], (0..PER_WRITER).collect::<Vec<_>>());
    }
}

#[test]
fn test_loopback_remembers_notification_sent_before_bind() {
    let (a, b) = LoopbackChannel::pair();
    let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    a.notify().unwrap();
    let counter = hits.clone();
    b.bind(Box::new(move || {
        counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    }))
    .unwrap();
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);

    a.notify().unwrap();
    assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 2);

    b.close();
    assert!(matches!(a.notify(), Err(Error::Fatal(_))));
}
