//! # Topic Subscriptions
//!
//! Tracks the two disjoint topic sets of a receiver. A durable endpoint
//! exists before any flow binds to it, so subscriptions requested before the
//! flow is up are attached at the endpoint level ("pre-bind"). A temporary
//! endpoint only exists once its flow does, so early requests are deferred
//! and replayed at the flow level right after binding ("post-bind").
//!
//! A topic's set is decided once, when it is added, and never changes.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{ReceiverError, ReceiverResult};
use crate::messaging::{EndpointProperties, FlowHandle, NativeTransport, SubCode, TransportError};
use crate::state_machine::LifecycleState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BindPhase {
    /// No endpoint work has happened yet
    Unbound,
    /// Durable endpoint is known to exist, flow not created yet
    EndpointReady,
    FlowBound(FlowHandle),
    /// Teardown ran; no further changes accepted
    Closed,
}

/// Topic to "already applied on the broker" flag
type TopicSet = BTreeMap<String, bool>;

#[derive(Debug)]
struct TopicSets {
    pre_bind: TopicSet,
    post_bind: TopicSet,
    phase: BindPhase,
}

pub(crate) struct SubscriptionManager {
    receiver_id: String,
    durable: bool,
    endpoint: Option<EndpointProperties>,
    transport: Arc<dyn NativeTransport>,
    sets: Mutex<TopicSets>,
}

impl SubscriptionManager {
    pub fn new(
        receiver_id: String,
        durable: bool,
        endpoint: Option<EndpointProperties>,
        transport: Arc<dyn NativeTransport>,
    ) -> Self {
        Self {
            receiver_id,
            durable,
            endpoint,
            transport,
            sets: Mutex::new(TopicSets {
                pre_bind: TopicSet::new(),
                post_bind: TopicSet::new(),
                phase: BindPhase::Unbound,
            }),
        }
    }

    pub fn add(&self, topic: &str, state: LifecycleState) -> ReceiverResult<()> {
        if state.is_shutting_down() {
            return Err(ReceiverError::illegal_state("add subscription", state));
        }
        if topic.trim().is_empty() {
            return Err(ReceiverError::configuration(
                "subscription",
                "topic must not be empty",
            ));
        }

        let mut sets = self.sets.lock();
        if sets.phase == BindPhase::Closed {
            return Err(ReceiverError::illegal_state("add subscription", state));
        }
        if sets.pre_bind.contains_key(topic) || sets.post_bind.contains_key(topic) {
            return Err(ReceiverError::client(
                "add subscription",
                topic,
                TransportError::new(
                    SubCode::SubscriptionAlreadyPresent,
                    "topic is already subscribed on this receiver",
                ),
            ));
        }

        match sets.phase {
            BindPhase::Unbound => {
                // Deferred: durable topics go out at endpoint level on start,
                // temporary-endpoint topics are replayed once the flow exists
                if self.durable {
                    sets.pre_bind.insert(topic.to_string(), false);
                } else {
                    sets.post_bind.insert(topic.to_string(), false);
                }
            }
            BindPhase::EndpointReady if self.durable => {
                self.endpoint_subscribe(topic)?;
                sets.pre_bind.insert(topic.to_string(), true);
            }
            BindPhase::EndpointReady => {
                sets.post_bind.insert(topic.to_string(), false);
            }
            BindPhase::FlowBound(flow) => {
                self.transport
                    .subscribe_topic(flow, topic)
                    .map_err(|e| ReceiverError::client("add subscription", topic, e))?;
                sets.post_bind.insert(topic.to_string(), true);
            }
            BindPhase::Closed => {
                return Err(ReceiverError::illegal_state("add subscription", state));
            }
        }

        debug!(receiver_id = %self.receiver_id, topic = %topic, "📝 Subscription recorded");
        Ok(())
    }

    pub fn remove(&self, topic: &str, state: LifecycleState) -> ReceiverResult<()> {
        if state.is_shutting_down() {
            return Err(ReceiverError::illegal_state("remove subscription", state));
        }

        let mut sets = self.sets.lock();
        if sets.phase == BindPhase::Closed {
            return Err(ReceiverError::illegal_state("remove subscription", state));
        }

        if let Some(&applied) = sets.post_bind.get(topic) {
            if applied {
                let BindPhase::FlowBound(flow) = sets.phase else {
                    return Err(ReceiverError::illegal_state("remove subscription", state));
                };
                self.transport
                    .unsubscribe_topic(flow, topic)
                    .map_err(|e| ReceiverError::client("remove subscription", topic, e))?;
            }
            sets.post_bind.remove(topic);
        } else if let Some(&applied) = sets.pre_bind.get(topic) {
            if applied {
                self.endpoint_unsubscribe(topic)?;
            }
            sets.pre_bind.remove(topic);
        } else {
            return Err(ReceiverError::client(
                "remove subscription",
                topic,
                TransportError::new(
                    SubCode::SubscriptionNotFound,
                    "topic is not subscribed on this receiver",
                ),
            ));
        }

        debug!(receiver_id = %self.receiver_id, topic = %topic, "🗑️ Subscription removed");
        Ok(())
    }

    /// Apply pending pre-bind topics at endpoint level; runs during start before the flow exists
    pub fn prepare_endpoint(&self) -> ReceiverResult<()> {
        let mut sets = self.sets.lock();
        if !self.durable {
            return Ok(());
        }

        let pending: Vec<String> = sets
            .pre_bind
            .iter()
            .filter(|(_, applied)| !**applied)
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in pending {
            self.endpoint_subscribe(&topic)?;
            sets.pre_bind.insert(topic, true);
        }
        sets.phase = BindPhase::EndpointReady;
        Ok(())
    }

    /// Flow is up: replay deferred post-bind topics at flow level
    pub fn bind_flow(&self, flow: FlowHandle) -> ReceiverResult<()> {
        let mut sets = self.sets.lock();
        let pending: Vec<String> = sets
            .post_bind
            .iter()
            .filter(|(_, applied)| !**applied)
            .map(|(topic, _)| topic.clone())
            .collect();
        for topic in pending {
            self.transport
                .subscribe_topic(flow, &topic)
                .map_err(|e| ReceiverError::client("add subscription", topic.as_str(), e))?;
            sets.post_bind.insert(topic, true);
        }
        sets.phase = BindPhase::FlowBound(flow);
        Ok(())
    }

    /// Failed start: the flow is gone, so flow-level topics must be replayed on retry.
    /// Endpoint-level topics survive on the durable endpoint.
    pub fn unbind(&self) {
        let mut sets = self.sets.lock();
        for applied in sets.post_bind.values_mut() {
            *applied = false;
        }
        if sets.phase != BindPhase::Closed {
            sets.phase = if self.durable && sets.pre_bind.values().all(|applied| *applied) {
                BindPhase::EndpointReady
            } else {
                BindPhase::Unbound
            };
        }
    }

    /// Best-effort teardown of every applied topic in both sets
    pub fn unsubscribe_all(&self) {
        let mut sets = self.sets.lock();
        if self.transport.is_connected() {
            if let BindPhase::FlowBound(flow) = sets.phase {
                for (topic, _) in sets.post_bind.iter().filter(|(_, applied)| **applied) {
                    if let Err(e) = self.transport.unsubscribe_topic(flow, topic) {
                        warn!(
                            receiver_id = %self.receiver_id,
                            topic = %topic,
                            error = %e,
                            "Failed to unsubscribe topic during shutdown; continuing"
                        );
                    }
                }
            }

            if let Some(endpoint) = &self.endpoint {
                for (topic, _) in sets.pre_bind.iter().filter(|(_, applied)| **applied) {
                    if let Err(e) = self.transport.unsubscribe_endpoint_topic(endpoint, topic) {
                        warn!(
                            receiver_id = %self.receiver_id,
                            topic = %topic,
                            error = %e,
                            "Failed to remove endpoint subscription during shutdown; continuing"
                        );
                    }
                }
            }
        } else {
            warn!(
                receiver_id = %self.receiver_id,
                "Transport disconnected; skipping subscription teardown"
            );
        }

        let removed = sets.pre_bind.len() + sets.post_bind.len();
        sets.pre_bind.clear();
        sets.post_bind.clear();
        sets.phase = BindPhase::Closed;
        info!(
            receiver_id = %self.receiver_id,
            topics = removed,
            "🧹 Subscriptions released"
        );
    }

    pub fn pre_bind_topics(&self) -> Vec<String> {
        self.sets.lock().pre_bind.keys().cloned().collect()
    }

    pub fn post_bind_topics(&self) -> Vec<String> {
        self.sets.lock().post_bind.keys().cloned().collect()
    }

    fn endpoint_subscribe(&self, topic: &str) -> ReceiverResult<()> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            ReceiverError::configuration("endpoint", "durable endpoint has no name")
        })?;
        self.transport
            .subscribe_endpoint_topic(endpoint, topic)
            .map_err(|e| ReceiverError::client("add subscription", topic, e))
    }

    fn endpoint_unsubscribe(&self, topic: &str) -> ReceiverResult<()> {
        let endpoint = self.endpoint.as_ref().ok_or_else(|| {
            ReceiverError::configuration("endpoint", "durable endpoint has no name")
        })?;
        self.transport
            .unsubscribe_endpoint_topic(endpoint, topic)
            .map_err(|e| ReceiverError::client("remove subscription", topic, e))
    }
}
