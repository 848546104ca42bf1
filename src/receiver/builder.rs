use std::sync::Arc;

use super::notifier::StateChangeListener;
use super::persistent_receiver::PersistentReceiver;
use super::receiver_core::ReceiverCore;
use crate::config::{EndpointConfig, FlowControlConfig, MissingResourcesStrategy, ReceiverConfig};
use crate::error::ReceiverResult;
use crate::logging::log_receiver_operation;
use crate::messaging::NativeTransport;
use crate::state_machine::LifecycleState;

/// Builder for [`PersistentReceiver`]
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use persistent_receiver::config::EndpointConfig;
/// use persistent_receiver::test_helpers::MockTransport;
/// use persistent_receiver::PersistentReceiverBuilder;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let receiver = PersistentReceiverBuilder::new(Arc::new(MockTransport::new()))
///     .with_endpoint(EndpointConfig::durable_exclusive("orders"))
///     .with_subscriptions(["orders/created"])
///     .with_auto_ack(true)
///     .build()?;
///
/// receiver.start()?;
/// while let Some(message) = receiver.receive_message(Some(Duration::from_secs(1)))? {
///     println!("received {}", message.message_id());
/// }
/// receiver.terminate(Duration::from_secs(5));
/// # Ok(())
/// # }
/// ```
pub struct PersistentReceiverBuilder {
    transport: Arc<dyn NativeTransport>,
    config: ReceiverConfig,
    listener: Option<Arc<dyn StateChangeListener>>,
}

impl PersistentReceiverBuilder {
    pub fn new(transport: Arc<dyn NativeTransport>) -> Self {
        Self {
            transport,
            config: ReceiverConfig::default(),
            listener: None,
        }
    }

    /// Replace the whole configuration
    pub fn with_config(mut self, config: ReceiverConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    pub fn with_message_selector(mut self, selector: impl Into<String>) -> Self {
        self.config.message_selector = Some(selector.into());
        self
    }

    pub fn with_auto_ack(mut self, auto_ack: bool) -> Self {
        self.config.auto_ack = auto_ack;
        self
    }

    pub fn with_missing_resources_strategy(mut self, strategy: MissingResourcesStrategy) -> Self {
        self.config.missing_resource_strategy = strategy;
        self
    }

    /// Topics subscribed before the receiver starts
    pub fn with_subscriptions<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.topics.extend(topics.into_iter().map(Into::into));
        self
    }

    pub fn with_flow_control(mut self, high_watermark: usize, low_watermark: usize) -> Self {
        self.config.flow_control = FlowControlConfig {
            high_watermark,
            low_watermark,
        };
        self
    }

    pub fn with_state_change_listener(mut self, listener: impl StateChangeListener + 'static) -> Self {
        self.listener = Some(Arc::new(listener));
        self
    }

    /// Validate the configuration and create a receiver in `NotStarted`
    pub fn build(self) -> ReceiverResult<PersistentReceiver> {
        self.config.validate()?;

        let topics = self.config.topics.clone();
        let core = ReceiverCore::new(self.config, self.transport);
        for topic in &topics {
            core.subscriptions.add(topic, LifecycleState::NotStarted)?;
        }
        if self.listener.is_some() {
            core.notifier.set_listener(self.listener);
        }

        log_receiver_operation(
            "build",
            &core.id,
            core.config.endpoint.name.as_deref(),
            "built",
            None,
        );
        Ok(PersistentReceiver::from_core(core))
    }
}
