//! # Receiver Lifecycle Tests
//!
//! Start/terminate transitions, start rollback and retry, endpoint
//! provisioning and the operations each lifecycle state allows.

mod common;

use common::*;
use persistent_receiver::{
    EndpointConfig, FlowEvent, LifecycleState, MissingResourcesStrategy, ReceiverError, SubCode,
};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

#[test]
fn test_start_is_idempotent() {
    init_test_logging();
    let test = durable_receiver("Q1", false);
    assert_eq!(test.receiver.lifecycle_state(), LifecycleState::NotStarted);

    test.receiver.start().unwrap();
    test.receiver.start().unwrap();

    assert_eq!(test.receiver.lifecycle_state(), LifecycleState::Started);
    assert!(test.receiver.is_running());
    assert_eq!(test.transport.calls().created_flows.len(), 1);
}

#[test]
fn test_start_after_terminate_is_illegal() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();
    test.receiver.terminate(Duration::from_millis(100));

    let err = test.receiver.start().unwrap_err();
    assert!(err.is_illegal_state());
    assert!(test.receiver.is_terminated());
}

#[test]
fn test_failed_start_reverts_and_can_be_retried() {
    let test = durable_receiver("Q1", false);
    test.transport.fail_next("create_flow", SubCode::PermissionNotAllowed);

    let err = test.receiver.start().unwrap_err();
    assert_eq!(err.sub_code(), Some(SubCode::PermissionNotAllowed));
    assert_eq!(test.receiver.lifecycle_state(), LifecycleState::NotStarted);
    assert!(test.transport.calls().created_flows.is_empty());

    test.receiver.start().unwrap();
    assert_eq!(test.receiver.lifecycle_state(), LifecycleState::Started);
}

#[test]
fn test_failed_subscription_replay_releases_flow() {
    let test = temporary_receiver();
    test.receiver.add_subscription("orders/>").unwrap();
    test.transport.fail_next("subscribe_topic", SubCode::Other(-7));

    let err = test.receiver.start().unwrap_err();
    match &err {
        ReceiverError::Client { identifier, .. } => assert_eq!(identifier, "orders/>"),
        other => panic!("unexpected error: {other:?}"),
    }

    let calls = test.transport.calls();
    assert_eq!(calls.created_flows.len(), 1);
    assert_eq!(calls.destroyed_flows.len(), 1);
    assert_eq!(test.receiver.lifecycle_state(), LifecycleState::NotStarted);

    // Retry replays the deferred topic on the new flow
    test.receiver.start().unwrap();
    assert_eq!(test.transport.calls().flow_subscribes, vec!["orders/>".to_string()]);
}

#[test]
fn test_start_requires_connected_transport() {
    let test = durable_receiver("Q1", false);
    test.transport.set_connected(false);

    let err = test.receiver.start().unwrap_err();
    assert_eq!(err.sub_code(), Some(SubCode::NotConnected));
    assert_eq!(test.receiver.lifecycle_state(), LifecycleState::NotStarted);
}

#[test]
fn test_concurrent_start_has_single_winner() {
    let test = durable_receiver("Q1", false);
    let barrier = Arc::new(Barrier::new(4));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let receiver = test.receiver.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                receiver.start().map(|_| ())
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    assert_eq!(test.transport.calls().created_flows.len(), 1);
}

#[test]
fn test_provisioning_on_start() {
    let (transport, builder) = builder();
    let receiver = builder
        .with_endpoint(EndpointConfig::durable_non_exclusive("orders"))
        .with_missing_resources_strategy(MissingResourcesStrategy::CreateOnStart)
        .build()
        .unwrap();

    transport.fail_next("provision_endpoint", SubCode::EndpointAlreadyExists);
    receiver.start().unwrap();
    assert!(transport.calls().provisioned.is_empty());
    assert_eq!(receiver.lifecycle_state(), LifecycleState::Started);
    receiver.terminate(Duration::from_millis(50));

    let (transport, builder) = common::builder();
    let receiver = builder
        .with_endpoint(EndpointConfig::durable_non_exclusive("orders"))
        .with_missing_resources_strategy(MissingResourcesStrategy::CreateOnStart)
        .build()
        .unwrap();
    transport.fail_next("provision_endpoint", SubCode::EndpointPropertyMismatch);
    let err = receiver.start().unwrap_err();
    assert_eq!(err.sub_code(), Some(SubCode::EndpointPropertyMismatch));
}

#[test]
fn test_non_durable_endpoints_are_never_provisioned() {
    let (transport, builder) = builder();
    let receiver = builder
        .with_endpoint(EndpointConfig::non_durable_named("scratch"))
        .with_missing_resources_strategy(MissingResourcesStrategy::CreateOnStart)
        .build()
        .unwrap();
    receiver.start().unwrap();
    assert!(transport.calls().provisioned.is_empty());
}

#[test]
fn test_temporary_endpoint_name_resolved_after_bind() {
    let test = temporary_receiver();
    let info = test.receiver.receiver_info();
    assert!(!info.is_durable);
    assert_eq!(info.endpoint_name, None);

    test.receiver.start().unwrap();
    let info = test.receiver.receiver_info();
    assert_eq!(info.endpoint_name.as_deref(), Some("#P2P/QTMP/mock-temporary"));
    assert_eq!(test.transport.calls().destination_queries, 1);
}

#[test]
fn test_operations_rejected_before_start() {
    let test = durable_receiver("Q1", false);
    let receiver = &test.receiver;

    assert!(receiver.receive_message(Some(Duration::from_millis(1))).unwrap_err().is_illegal_state());
    assert!(receiver.ack(&message(1)).unwrap_err().is_illegal_state());
    assert!(receiver.pause().unwrap_err().is_illegal_state());
    assert!(receiver.resume().unwrap_err().is_illegal_state());
    assert!(receiver
        .receive_async(|_m: persistent_receiver::InboundMessage| -> anyhow::Result<()> { Ok(()) })
        .unwrap_err()
        .is_illegal_state());
}

#[test]
fn test_undelivered_messages_discarded_on_terminate() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();

    let listener_flow = test.transport.active_flow().unwrap();
    test.receiver.pause().unwrap();
    test.deliver_range(1, 2);
    assert_eq!(test.receiver.queued_messages(), 2);

    test.receiver.terminate(Duration::from_millis(10));
    assert!(test.transport.calls().destroyed_flows.contains(&listener_flow));
    assert!(!test.transport.deliver(message(3)));

    let stats = test.receiver.stats();
    assert_eq!(stats.received, 2);
    assert_eq!(stats.discarded_on_shutdown, 2);
}

#[test]
fn test_terminate_before_start() {
    let test = durable_receiver("Q1", false);
    test.receiver.add_subscription("early").unwrap();
    test.receiver.terminate(Duration::from_secs(1));

    assert!(test.receiver.is_terminated());
    let calls = test.transport.calls();
    assert!(calls.created_flows.is_empty());
    assert!(calls.endpoint_subscribes.is_empty());
    assert!(test.receiver.start().unwrap_err().is_illegal_state());
}

#[test]
fn test_flow_down_surfaces_as_client_error_on_ack() {
    let test = durable_receiver("Q1", false);
    test.receiver.start().unwrap();
    test.deliver_range(1, 1);
    let message = test
        .receiver
        .receive_message(Some(Duration::from_millis(100)))
        .unwrap()
        .unwrap();

    test.transport.emit(FlowEvent::Down);
    let err = test.receiver.ack(&message).unwrap_err();
    assert_eq!(err.sub_code(), Some(SubCode::NotConnected));
}
