//! # Subscription Tests
//!
//! Endpoint-level vs flow-level topic subscriptions across the receiver
//! lifecycle, plus the async subscription operations.

mod common;

use common::*;
use persistent_receiver::{ReceiverError, SubCode};
use std::time::Duration;
use tokio_test::assert_ok;

#[test]
fn test_durable_pre_bind_topic_applied_at_endpoint_level() {
    let test = durable_receiver("Q1", false);
    test.receiver.add_subscription("orders/eu/>").unwrap();

    // Nothing reaches the broker until start
    assert!(test.transport.calls().endpoint_subscribes.is_empty());

    test.receiver.start().unwrap();
    let calls = test.transport.calls();
    assert_eq!(calls.endpoint_subscribes, vec!["orders/eu/>".to_string()]);
    assert!(calls.flow_subscribes.is_empty());
}

#[test]
fn test_topic_added_after_start_uses_flow_level() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();
    test.receiver.add_subscription("orders/us/>").unwrap();

    let calls = test.transport.calls();
    assert_eq!(calls.flow_subscribes, vec!["orders/us/>".to_string()]);
    assert!(calls.endpoint_subscribes.is_empty());
    assert_eq!(test.receiver.subscriptions(), vec!["orders/us/>".to_string()]);
}

#[test]
fn test_temporary_endpoint_topics_replayed_after_bind() {
    let test = temporary_receiver();
    test.receiver.add_subscription("a/b").unwrap();
    test.receiver.add_subscription("c/d").unwrap();
    assert!(test.transport.calls().flow_subscribes.is_empty());

    test.receiver.start().unwrap();
    let calls = test.transport.calls();
    assert_eq!(calls.flow_subscribes, vec!["a/b".to_string(), "c/d".to_string()]);
    assert!(calls.endpoint_subscribes.is_empty());
}

#[test]
fn test_duplicate_topic_rejected() {
    let test = durable_receiver("Q1", false);
    test.receiver.add_subscription("dup").unwrap();

    let err = test.receiver.add_subscription("dup").unwrap_err();
    assert_eq!(err.sub_code(), Some(SubCode::SubscriptionAlreadyPresent));
    assert!(err.is_client_error());

    test.receiver.start().unwrap();
    let err = test.receiver.add_subscription("dup").unwrap_err();
    assert_eq!(err.sub_code(), Some(SubCode::SubscriptionAlreadyPresent));
    assert_eq!(test.transport.calls().endpoint_subscribes.len(), 1);
}

#[test]
fn test_remove_unknown_topic_fails() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let err = test.receiver.remove_subscription("missing").unwrap_err();
    match err {
        ReceiverError::Client { identifier, .. } => assert_eq!(identifier, "missing"),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_remove_uses_the_level_the_topic_was_added_at() {
    let test = durable_receiver("Q1", false);
    test.receiver.add_subscription("early").unwrap();
    test.receiver.start().unwrap();
    test.receiver.add_subscription("late").unwrap();

    test.receiver.remove_subscription("early").unwrap();
    test.receiver.remove_subscription("late").unwrap();

    let calls = test.transport.calls();
    assert_eq!(calls.endpoint_unsubscribes, vec!["early".to_string()]);
    assert_eq!(calls.flow_unsubscribes, vec!["late".to_string()]);
    assert!(test.receiver.subscriptions().is_empty());
}

#[test]
fn test_broker_rejection_leaves_sets_unchanged() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();
    test.transport.fail_next("subscribe_topic", SubCode::Other(-42));

    let err = test.receiver.add_subscription("rejected").unwrap_err();
    assert_eq!(err.sub_code(), Some(SubCode::Other(-42)));
    assert!(test.receiver.subscriptions().is_empty());

    // A later retry of the same topic is not reported as a duplicate
    test.receiver.add_subscription("rejected").unwrap();
}

#[test]
fn test_terminate_unsubscribes_everything() {
    let test = durable_receiver("Q1", false);
    test.receiver.add_subscription("early").unwrap();
    test.receiver.start().unwrap();
    test.receiver.add_subscription("late").unwrap();

    test.receiver.terminate(Duration::from_millis(100));
    let calls = test.transport.calls();
    assert_eq!(calls.endpoint_unsubscribes, vec!["early".to_string()]);
    assert_eq!(calls.flow_unsubscribes, vec!["late".to_string()]);
    assert!(test.receiver.subscriptions().is_empty());
}

#[test]
fn test_terminate_while_disconnected_skips_unsubscribe() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();
    test.receiver.add_subscription("late").unwrap();
    test.transport.set_connected(false);

    test.receiver.terminate(Duration::from_millis(100));
    assert!(test.receiver.is_terminated());
    assert!(test.transport.calls().flow_unsubscribes.is_empty());
}

#[test]
fn test_subscription_changes_rejected_after_terminate() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();
    test.receiver.terminate(Duration::from_millis(50));

    assert!(test.receiver.add_subscription("x").unwrap_err().is_illegal_state());
    assert!(test.receiver.remove_subscription("x").unwrap_err().is_illegal_state());
}

#[tokio::test]
async fn test_async_subscription_operations() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    assert_ok!(test.receiver.add_subscription_async("async/topic").await);
    assert_eq!(
        test.transport.calls().flow_subscribes,
        vec!["async/topic".to_string()]
    );

    let err = test
        .receiver
        .add_subscription_async("async/topic")
        .await
        .unwrap_err();
    assert_eq!(err.sub_code(), Some(SubCode::SubscriptionAlreadyPresent));

    assert_ok!(test.receiver.remove_subscription_async("async/topic").await);
    assert_eq!(
        test.transport.calls().flow_unsubscribes,
        vec!["async/topic".to_string()]
    );

    test.receiver.terminate_async(Duration::from_millis(100)).await.unwrap();
    assert!(test.receiver.is_terminated());

    let err = test.receiver.add_subscription_async("late").await.unwrap_err();
    assert!(err.is_illegal_state());
}

#[test]
fn test_async_operation_blocking_wait() {
    let test = temporary_receiver();
    let started = test.receiver.start_async().blocking_wait();
    assert!(started.is_ok());

    let added = test.receiver.add_subscription_async("blocking/wait").blocking_wait();
    assert!(added.is_ok());
    assert_eq!(
        test.transport.calls().flow_subscribes,
        vec!["blocking/wait".to_string()]
    );
}
