//! # Dispatch Tests
//!
//! Ordering and concurrency guarantees of synchronous and asynchronous
//! delivery.

mod common;

use common::*;
use parking_lot::Mutex;
use persistent_receiver::{FlowEvent, InboundMessage, MessageId};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_sync_receive_preserves_order() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();
    test.deliver_range(1, 20);

    let ids: Vec<u64> = (0..20)
        .map(|_| {
            test.receiver
                .receive_message(Some(Duration::from_millis(100)))
                .unwrap()
                .unwrap()
                .message_id()
                .0
        })
        .collect();
    assert_eq!(ids, (1..=20).collect::<Vec<_>>());
}

#[test]
fn test_receive_timeout_returns_none() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let started = Instant::now();
    let received = test
        .receiver
        .receive_message(Some(Duration::from_millis(50)))
        .unwrap();
    assert!(received.is_none());
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[test]
fn test_blocked_receive_released_by_passive_flow() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let receiver = test.receiver.clone();
    let waiter = thread::spawn(move || receiver.receive_message(None));

    // Give the waiter time to block before the flow turns passive
    thread::sleep(Duration::from_millis(30));
    test.transport.emit(FlowEvent::Passive);

    assert!(waiter.join().unwrap().unwrap().is_none());
}

#[test]
fn test_blocked_receive_released_by_flow_down() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let receiver = test.receiver.clone();
    let waiter = thread::spawn(move || receiver.receive_message(None));
    thread::sleep(Duration::from_millis(30));
    test.transport.emit(FlowEvent::Down);

    assert!(waiter.join().unwrap().unwrap().is_none());

    // Nothing to drain against a dead transport
    let started = Instant::now();
    test.receiver.terminate(Duration::from_secs(5));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_blocked_receive_released_by_terminate() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let receiver = test.receiver.clone();
    let waiter = thread::spawn(move || receiver.receive_message(None));
    thread::sleep(Duration::from_millis(30));

    test.receiver.terminate(Duration::from_millis(100));
    assert!(waiter.join().unwrap().unwrap().is_none());
}

#[test]
fn test_async_handler_never_runs_concurrently() {
    let test = durable_receiver("Q1", true);
    test.receiver.start().unwrap();

    let in_flight = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));
    let seen = Arc::new(Mutex::new(Vec::new()));

    let handler = {
        let in_flight = in_flight.clone();
        let overlaps = overlaps.clone();
        let seen = seen.clone();
        move |message: InboundMessage| -> anyhow::Result<()> {
            if in_flight.swap(true, Ordering::SeqCst) {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            thread::sleep(Duration::from_micros(200));
            seen.lock().push(message.message_id().0);
            in_flight.store(false, Ordering::SeqCst);
            Ok(())
        }
    };
    test.receiver.receive_async(handler).unwrap();

    // Transport thread pushes while the consumer is already running
    let transport = test.transport.clone();
    let producer = thread::spawn(move || {
        for id in 1..=100 {
            transport.deliver(message(id));
        }
    });
    producer.join().unwrap();

    wait_until(Duration::from_secs(10), || seen.lock().len() == 100);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(*seen.lock(), (1..=100).collect::<Vec<_>>());

    wait_until(Duration::from_secs(5), || test.transport.calls().acks.len() == 100);
    test.receiver.terminate(Duration::from_secs(1));
}

#[test]
fn test_auto_ack_only_after_handler_success() {
    let test = durable_receiver("Q1", true);
    test.receiver.start().unwrap();

    let processed = Arc::new(AtomicUsize::new(0));
    let counter = processed.clone();
    test.receiver
        .receive_async(move |message: InboundMessage| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            if message.message_id().0 % 2 == 0 {
                anyhow::bail!("even messages are rejected");
            }
            Ok(())
        })
        .unwrap();

    test.deliver_range(1, 6);
    wait_until(Duration::from_secs(5), || processed.load(Ordering::SeqCst) == 6);
    wait_until(Duration::from_secs(5), || test.transport.calls().acks.len() == 3);

    assert_eq!(
        test.transport.calls().acks,
        vec![MessageId(1), MessageId(3), MessageId(5)]
    );
    assert_eq!(test.receiver.stats().handler_failures, 3);
    test.receiver.terminate(Duration::from_secs(1));
}

#[test]
fn test_sync_auto_ack_happens_before_return() {
    let test = durable_receiver("Q1", true);
    test.receiver.start().unwrap();
    test.deliver_range(7, 1);

    let message = test.receiver.receive_message(Some(Duration::from_millis(100))).unwrap().unwrap();
    assert_eq!(test.transport.calls().acks, vec![message.message_id()]);
}

#[test]
fn test_pause_holds_async_delivery() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = seen.clone();
    test.receiver.pause().unwrap();
    assert!(test.receiver.is_paused());
    test.receiver
        .receive_async(move |_message: InboundMessage| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();

    test.deliver_range(1, 5);
    thread::sleep(Duration::from_millis(50));
    assert_eq!(seen.load(Ordering::SeqCst), 0);
    assert_eq!(test.receiver.queued_messages(), 5);

    test.receiver.resume().unwrap();
    assert!(test.receiver.is_running());
    wait_until(Duration::from_secs(5), || seen.load(Ordering::SeqCst) == 5);
    test.receiver.terminate(Duration::from_secs(1));
}

#[test]
fn test_receive_async_twice_swaps_handler() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let first = Arc::new(AtomicUsize::new(0));
    let second = Arc::new(AtomicUsize::new(0));

    let counter = first.clone();
    test.receiver
        .receive_async(move |_m: InboundMessage| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    test.deliver_range(1, 1);
    wait_until(Duration::from_secs(5), || first.load(Ordering::SeqCst) == 1);

    let counter = second.clone();
    test.receiver
        .receive_async(move |_m: InboundMessage| -> anyhow::Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .unwrap();
    test.deliver_range(2, 3);
    wait_until(Duration::from_secs(5), || second.load(Ordering::SeqCst) == 3);
    assert_eq!(first.load(Ordering::SeqCst), 1);
    test.receiver.terminate(Duration::from_secs(1));
}

#[test]
fn test_manual_ack_from_handler() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let receiver = test.receiver.clone();
    test.receiver
        .receive_async(move |message: InboundMessage| -> anyhow::Result<()> {
            receiver.ack(&message)?;
            Ok(())
        })
        .unwrap();

    test.deliver_range(1, 3);
    wait_until(Duration::from_secs(5), || test.transport.calls().acks.len() == 3);
    test.receiver.terminate(Duration::from_secs(1));
}
