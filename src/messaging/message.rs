//! # Inbound Message
//!
//! A guaranteed message handed up by the native transport. The receiver owns
//! it while it sits in the inbound queue; ownership moves to the application
//! on dequeue.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Broker-assigned identifier used for acknowledgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Redelivery information reported by the broker
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeliveryInfo {
    /// Whether the broker flagged this message as a redelivery
    pub redelivered: bool,
    /// Delivery attempt count, when the broker tracks it
    pub delivery_count: Option<u32>,
}

/// Message received on a guaranteed flow
///
/// Ownership moves to the application when the message is dequeued and the
/// payload is released once, on drop. Messages are not `Clone`:
///
/// ```compile_fail
/// let message = persistent_receiver::InboundMessage::new(1, "m1");
/// let copy = message.clone();
/// ```
#[derive(Debug, PartialEq)]
pub struct InboundMessage {
    message_id: MessageId,
    payload: Vec<u8>,
    destination: Option<String>,
    redelivery: RedeliveryInfo,
    properties: HashMap<String, String>,
    received_at: chrono::DateTime<chrono::Utc>,
}

impl InboundMessage {
    /// Create a new inbound message
    pub fn new(message_id: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            message_id: MessageId(message_id),
            payload: payload.into(),
            destination: None,
            redelivery: RedeliveryInfo::default(),
            properties: HashMap::new(),
            received_at: chrono::Utc::now(),
        }
    }

    /// Set the topic the message was published to
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Mark the message as redelivered
    pub fn with_redelivery(mut self, delivery_count: Option<u32>) -> Self {
        self.redelivery = RedeliveryInfo {
            redelivered: true,
            delivery_count,
        };
        self
    }

    /// Attach a user property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn message_id(&self) -> MessageId {
        self.message_id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload interpreted as UTF-8, if valid
    pub fn payload_as_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }

    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    pub fn redelivery(&self) -> &RedeliveryInfo {
        &self.redelivery
    }

    pub fn is_redelivered(&self) -> bool {
        self.redelivery.redelivered
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn received_at(&self) -> chrono::DateTime<chrono::Utc> {
        self.received_at
    }

    /// Consume the message, returning the payload buffer
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let message = InboundMessage::new(7, "hello")
            .with_destination("orders/created")
            .with_property("region", "eu");

        assert_eq!(message.message_id(), MessageId(7));
        assert_eq!(message.payload_as_str(), Some("hello"));
        assert_eq!(message.destination(), Some("orders/created"));
        assert_eq!(message.property("region"), Some("eu"));
        assert!(!message.is_redelivered());
    }

    #[test]
    fn test_redelivery_metadata() {
        let message = InboundMessage::new(1, vec![0xff, 0xfe]).with_redelivery(Some(3));
        assert!(message.is_redelivered());
        assert_eq!(message.redelivery().delivery_count, Some(3));
        assert_eq!(message.payload_as_str(), None);
        assert_eq!(message.into_payload(), vec![0xff, 0xfe]);
    }
}
