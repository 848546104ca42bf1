use std::sync::Arc;

use persistent_receiver::test_helpers::MockTransport;
use persistent_receiver::{
    EndpointConfig, InboundMessage, PersistentReceiver, PersistentReceiverBuilder,
};

/// A started-or-not receiver together with the transport driving it
pub struct TestReceiver {
    pub transport: Arc<MockTransport>,
    pub receiver: PersistentReceiver,
}

impl TestReceiver {
    /// Simulate the transport thread delivering `count` messages with ids `first..first+count`
    pub fn deliver_range(&self, first: u64, count: u64) {
        for id in first..first + count {
            assert!(
                self.transport.deliver(message(id)),
                "no flow bound for delivery"
            );
        }
    }
}

pub fn message(id: u64) -> InboundMessage {
    InboundMessage::new(id, format!("m{id}")).with_destination("test/topic")
}

/// Builder pre-wired to a fresh mock transport
pub fn builder() -> (Arc<MockTransport>, PersistentReceiverBuilder) {
    let transport = Arc::new(MockTransport::new());
    let builder = PersistentReceiverBuilder::new(transport.clone());
    (transport, builder)
}

/// Durable exclusive receiver on `endpoint`, not yet started
pub fn durable_receiver(endpoint: &str, auto_ack: bool) -> TestReceiver {
    let (transport, builder) = builder();
    let receiver = builder
        .with_endpoint(EndpointConfig::durable_exclusive(endpoint))
        .with_auto_ack(auto_ack)
        .build()
        .expect("durable receiver should build");
    TestReceiver {
        transport,
        receiver,
    }
}

/// Durable receiver with custom watermarks, already started
pub fn started_receiver_with_watermarks(high: usize, low: usize) -> TestReceiver {
    let (transport, builder) = builder();
    let receiver = builder
        .with_endpoint(EndpointConfig::durable_exclusive("flow-control"))
        .with_flow_control(high, low)
        .build()
        .expect("receiver should build");
    receiver.start().expect("receiver should start");
    TestReceiver {
        transport,
        receiver,
    }
}

/// Temporary-endpoint receiver named by the broker, not yet started
pub fn temporary_receiver() -> TestReceiver {
    let (transport, builder) = builder();
    let receiver = builder
        .with_endpoint(EndpointConfig::non_durable())
        .build()
        .expect("temporary receiver should build");
    TestReceiver {
        transport,
        receiver,
    }
}
