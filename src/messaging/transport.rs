//! # Native Transport Interface
//!
//! The narrow seam between the receiver core and the native messaging
//! session. Everything in [`crate::receiver`] is written against
//! [`NativeTransport`]; a production adapter wraps the native client library
//! and tests use [`crate::test_helpers::MockTransport`].
//!
//! ## Threading contract
//!
//! The transport invokes [`FlowListener`] callbacks from its own I/O thread,
//! one at a time. Callbacks must return quickly and never block.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::message::{InboundMessage, MessageId};

/// Native sub codes the receiver reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubCode {
    EndpointAlreadyExists,
    PermissionNotAllowed,
    EndpointPropertyMismatch,
    SubscriptionAlreadyPresent,
    SubscriptionNotFound,
    NotConnected,
    InvalidFlow,
    Other(i32),
}

impl fmt::Display for SubCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EndpointAlreadyExists => write!(f, "endpoint_already_exists"),
            Self::PermissionNotAllowed => write!(f, "permission_not_allowed"),
            Self::EndpointPropertyMismatch => write!(f, "endpoint_property_mismatch"),
            Self::SubscriptionAlreadyPresent => write!(f, "subscription_already_present"),
            Self::SubscriptionNotFound => write!(f, "subscription_not_found"),
            Self::NotConnected => write!(f, "not_connected"),
            Self::InvalidFlow => write!(f, "invalid_flow"),
            Self::Other(code) => write!(f, "other({code})"),
        }
    }
}

/// Failure reported by a native call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (sub code: {sub_code})")]
pub struct TransportError {
    pub sub_code: SubCode,
    pub message: String,
}

impl TransportError {
    pub fn new(sub_code: SubCode, message: impl Into<String>) -> Self {
        Self {
            sub_code,
            message: message.into(),
        }
    }
}

pub type TransportResult<T> = Result<T, TransportError>;

/// Opaque identifier of a live native flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowHandle(u64);

impl FlowHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FlowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "flow#{}", self.0)
    }
}

/// Endpoint access type requested at provisioning time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessType {
    Exclusive,
    NonExclusive,
}

/// Properties identifying a broker-side endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointProperties {
    pub name: String,
    pub durable: bool,
    pub access_type: AccessType,
}

/// Properties used to bind a flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowProperties {
    /// Endpoint to bind; `None` lets the broker name a temporary endpoint
    pub bind_name: Option<String>,
    pub durable: bool,
    pub selector: Option<String>,
    /// Acknowledgment is always driven by the receiver
    pub client_ack: bool,
}

/// Flow-level notifications raised by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowEvent {
    /// Flow became the active consumer of the endpoint
    Active,
    /// Flow became a standby consumer
    Passive,
    /// Flow or session went down
    Down,
}

/// Callbacks invoked on the transport's own thread
pub trait FlowListener: Send + Sync {
    /// A guaranteed message arrived on the flow
    fn on_message(&self, message: InboundMessage);

    /// The flow changed state
    fn on_event(&self, event: FlowEvent);
}

/// Operations consumed from the native session layer
pub trait NativeTransport: Send + Sync {
    fn create_flow(
        &self,
        properties: &FlowProperties,
        listener: Arc<dyn FlowListener>,
    ) -> TransportResult<FlowHandle>;

    fn destroy_flow(&self, flow: FlowHandle);

    fn pause_ingress(&self, flow: FlowHandle) -> TransportResult<()>;

    fn resume_ingress(&self, flow: FlowHandle) -> TransportResult<()>;

    /// Flow-level (dispatch-bound) subscribe
    fn subscribe_topic(&self, flow: FlowHandle, topic: &str) -> TransportResult<()>;

    fn unsubscribe_topic(&self, flow: FlowHandle, topic: &str) -> TransportResult<()>;

    /// Endpoint-level subscribe; does not need a flow
    fn subscribe_endpoint_topic(
        &self,
        endpoint: &EndpointProperties,
        topic: &str,
    ) -> TransportResult<()>;

    fn unsubscribe_endpoint_topic(
        &self,
        endpoint: &EndpointProperties,
        topic: &str,
    ) -> TransportResult<()>;

    fn provision_endpoint(&self, endpoint: &EndpointProperties) -> TransportResult<()>;

    fn acknowledge(&self, flow: FlowHandle, message_id: MessageId) -> TransportResult<()>;

    fn query_bound_destination_name(&self, flow: FlowHandle) -> TransportResult<String>;

    fn is_connected(&self) -> bool;
}

/// Exclusive owner of a native flow; destroys it exactly once on drop
pub struct FlowGuard {
    handle: FlowHandle,
    transport: Arc<dyn NativeTransport>,
}

impl FlowGuard {
    pub fn new(handle: FlowHandle, transport: Arc<dyn NativeTransport>) -> Self {
        Self { handle, transport }
    }

    pub fn handle(&self) -> FlowHandle {
        self.handle
    }
}

impl fmt::Debug for FlowGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowGuard")
            .field("handle", &self.handle)
            .finish()
    }
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        if !self.transport.is_connected() {
            warn!(flow = %self.handle, "Releasing flow while transport is disconnected");
        }
        self.transport.destroy_flow(self.handle);
        debug!(flow = %self.handle, "🧹 Native flow released");
    }
}
