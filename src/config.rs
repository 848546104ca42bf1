//! # Receiver Configuration
//!
//! Build-time configuration consumed by the receiver core. Values come from
//! defaults, an optional file, and `RECEIVER_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::constants::{
    DEFAULT_GRACE_PERIOD_MS, DEFAULT_HIGH_WATERMARK, DEFAULT_LOW_WATERMARK, ENV_PREFIX,
};
use crate::error::{ReceiverError, ReceiverResult};
use crate::messaging::{AccessType, EndpointProperties, FlowProperties};

/// Whether missing broker resources are created when the receiver starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingResourcesStrategy {
    #[default]
    None,
    CreateOnStart,
}

/// The broker-side queue to consume from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Endpoint name; a non-durable endpoint may leave this to the broker
    pub name: Option<String>,
    pub durable: bool,
    pub exclusive: bool,
}

impl EndpointConfig {
    pub fn durable_exclusive(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            durable: true,
            exclusive: true,
        }
    }

    pub fn durable_non_exclusive(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            durable: true,
            exclusive: false,
        }
    }

    /// Temporary endpoint named by the broker when the flow binds
    pub fn non_durable() -> Self {
        Self {
            name: None,
            durable: false,
            exclusive: true,
        }
    }

    pub fn non_durable_named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            durable: false,
            exclusive: true,
        }
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self::non_durable()
    }
}

/// Ingress backpressure watermarks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowControlConfig {
    pub high_watermark: usize,
    pub low_watermark: usize,
}

impl Default for FlowControlConfig {
    fn default() -> Self {
        Self {
            high_watermark: DEFAULT_HIGH_WATERMARK,
            low_watermark: DEFAULT_LOW_WATERMARK,
        }
    }
}

/// Complete receiver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    pub endpoint: EndpointConfig,
    pub message_selector: Option<String>,
    pub auto_ack: bool,
    pub missing_resource_strategy: MissingResourcesStrategy,
    /// Subscriptions added before the receiver starts
    pub topics: Vec<String>,
    pub flow_control: FlowControlConfig,
    pub default_grace_period_ms: u64,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            endpoint: EndpointConfig::default(),
            message_selector: None,
            auto_ack: false,
            missing_resource_strategy: MissingResourcesStrategy::None,
            topics: Vec::new(),
            flow_control: FlowControlConfig::default(),
            default_grace_period_ms: DEFAULT_GRACE_PERIOD_MS,
        }
    }
}

impl ReceiverConfig {
    /// Defaults overridden by `RECEIVER_*` environment variables
    pub fn from_env() -> ReceiverResult<Self> {
        let mut config = Self::default();

        if let Ok(name) = std::env::var("RECEIVER_ENDPOINT_NAME") {
            config.endpoint.name = Some(name);
        }

        if let Ok(durable) = std::env::var("RECEIVER_ENDPOINT_DURABLE") {
            config.endpoint.durable = durable.parse().map_err(|e| {
                ReceiverError::configuration("endpoint", format!("Invalid durable flag: {e}"))
            })?;
        }

        if let Ok(auto_ack) = std::env::var("RECEIVER_AUTO_ACK") {
            config.auto_ack = auto_ack.parse().map_err(|e| {
                ReceiverError::configuration("auto_ack", format!("Invalid auto_ack: {e}"))
            })?;
        }

        if let Ok(high) = std::env::var("RECEIVER_HIGH_WATERMARK") {
            config.flow_control.high_watermark = high.parse().map_err(|e| {
                ReceiverError::configuration("flow_control", format!("Invalid high watermark: {e}"))
            })?;
        }

        if let Ok(low) = std::env::var("RECEIVER_LOW_WATERMARK") {
            config.flow_control.low_watermark = low.parse().map_err(|e| {
                ReceiverError::configuration("flow_control", format!("Invalid low watermark: {e}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file (any format the `config` crate detects)
    /// layered under `RECEIVER__*` environment overrides
    pub fn load(path: impl AsRef<Path>) -> ReceiverResult<Self> {
        let loaded: ReceiverConfig = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> ReceiverResult<()> {
        let flow = &self.flow_control;
        if flow.high_watermark == 0 {
            return Err(ReceiverError::configuration(
                "flow_control",
                "high watermark must be greater than zero",
            ));
        }
        if flow.low_watermark >= flow.high_watermark {
            return Err(ReceiverError::configuration(
                "flow_control",
                format!(
                    "low watermark {} must be below high watermark {}",
                    flow.low_watermark, flow.high_watermark
                ),
            ));
        }
        if self.endpoint.durable && self.endpoint.name.as_deref().unwrap_or("").is_empty() {
            return Err(ReceiverError::configuration(
                "endpoint",
                "durable endpoints require a name",
            ));
        }
        if self.topics.iter().any(|topic| topic.trim().is_empty()) {
            return Err(ReceiverError::configuration(
                "topics",
                "topic subscriptions must not be empty",
            ));
        }
        Ok(())
    }

    pub fn default_grace_period(&self) -> Duration {
        Duration::from_millis(self.default_grace_period_ms)
    }

    /// Endpoint properties for provisioning and endpoint-level subscriptions
    pub(crate) fn endpoint_properties(&self) -> Option<EndpointProperties> {
        self.endpoint.name.as_ref().map(|name| EndpointProperties {
            name: name.clone(),
            durable: self.endpoint.durable,
            access_type: if self.endpoint.exclusive {
                AccessType::Exclusive
            } else {
                AccessType::NonExclusive
            },
        })
    }

    pub(crate) fn flow_properties(&self) -> FlowProperties {
        FlowProperties {
            bind_name: self.endpoint.name.clone(),
            durable: self.endpoint.durable,
            selector: self
                .message_selector
                .as_ref()
                .filter(|selector| !selector.is_empty())
                .cloned(),
            client_ack: true,
        }
    }
}
