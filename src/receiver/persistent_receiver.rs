//! # Persistent Receiver
//!
//! Application-facing handle for a guaranteed-delivery receiver. Handles are
//! cheap to clone and share one underlying receiver.
//!
//! ## Consumption modes
//!
//! Messages are consumed either by pulling with
//! [`PersistentReceiver::receive_message`] or by registering a handler with
//! [`PersistentReceiver::receive_async`]. The two are meant to be used one at
//! a time per receiver; mixing them is not rejected, but each message still
//! goes to exactly one of the two paths.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::dispatch::{AutoAck, MessageHandler};
use super::executor::ReceiverFuture;
use super::notifier::StateChangeListener;
use super::receiver_core::ReceiverCore;
use super::stats::{ReceiverCounters, ReceiverStats};
use crate::config::ReceiverConfig;
use crate::error::{ReceiverError, ReceiverResult};
use crate::messaging::{InboundMessage, MessageId};
use crate::state_machine::LifecycleState;

/// Binding details of a receiver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverInfo {
    pub is_durable: bool,
    /// Bound endpoint name; broker-assigned for temporary endpoints once started
    pub endpoint_name: Option<String>,
}

/// Guaranteed-delivery message receiver bound to one broker endpoint
#[derive(Clone)]
pub struct PersistentReceiver {
    core: Arc<ReceiverCore>,
}

impl PersistentReceiver {
    pub(crate) fn from_core(core: Arc<ReceiverCore>) -> Self {
        Self { core }
    }

    /// Bind to the endpoint and begin accepting messages
    pub fn start(&self) -> ReceiverResult<&Self> {
        self.core.start()?;
        Ok(self)
    }

    /// [`Self::start`] on the background executor
    pub fn start_async(&self) -> ReceiverFuture<()> {
        let core = Arc::clone(&self.core);
        self.submit("start", move || core.start())
    }

    /// Drain in-flight messages for up to `grace_period`, then release the flow
    ///
    /// Blocks the calling thread for at most roughly `grace_period`. Calling it
    /// again, or concurrently, returns once the single teardown has finished.
    pub fn terminate(&self, grace_period: Duration) {
        self.core.terminate(grace_period);
    }

    /// [`Self::terminate`] with the configured default grace period
    pub fn terminate_with_default_grace(&self) {
        self.core.terminate(self.core.config.default_grace_period());
    }

    /// [`Self::terminate`] on the background executor
    pub fn terminate_async(&self, grace_period: Duration) -> ReceiverFuture<()> {
        if self.core.lifecycle.current().is_terminal() {
            return ReceiverFuture::ready(Ok(()));
        }
        let core = Arc::clone(&self.core);
        let submitted = self.core.executor.submit(move || {
            core.terminate(grace_period);
            Ok(())
        });
        // A refused submission means teardown already began elsewhere
        submitted.unwrap_or_else(|| ReceiverFuture::ready(Ok(())))
    }

    pub fn add_subscription(&self, topic: &str) -> ReceiverResult<()> {
        self.core.add_subscription(topic)
    }

    pub fn add_subscription_async(&self, topic: impl Into<String>) -> ReceiverFuture<()> {
        let core = Arc::clone(&self.core);
        let topic = topic.into();
        self.submit("add subscription", move || core.add_subscription(&topic))
    }

    pub fn remove_subscription(&self, topic: &str) -> ReceiverResult<()> {
        self.core.remove_subscription(topic)
    }

    pub fn remove_subscription_async(&self, topic: impl Into<String>) -> ReceiverFuture<()> {
        let core = Arc::clone(&self.core);
        let topic = topic.into();
        self.submit("remove subscription", move || core.remove_subscription(&topic))
    }

    /// Pull the next message, waiting up to `timeout` (forever when `None`)
    ///
    /// Returns `Ok(None)` on timeout, when a passive or down flow releases the
    /// wait, or once the receiver has drained during shutdown. With auto-ack
    /// enabled the message is acknowledged before it is returned.
    pub fn receive_message(
        &self,
        timeout: Option<Duration>,
    ) -> ReceiverResult<Option<InboundMessage>> {
        let state = self.core.lifecycle.current();
        if !matches!(state, LifecycleState::Started | LifecycleState::Terminating) {
            return Err(ReceiverError::illegal_state("receive message", state));
        }

        let Some(message) = self.core.queue.pop(timeout) else {
            return Ok(None);
        };
        ReceiverCounters::increment(&self.core.counters.delivered);

        if self.core.config.auto_ack {
            self.core.acknowledge(message.message_id())?;
        }
        Ok(Some(message))
    }

    /// Deliver messages to `handler` on the receiver's dispatch thread
    ///
    /// Calling this again only replaces the handler. With auto-ack enabled a
    /// message is acknowledged after the handler returns `Ok`.
    pub fn receive_async(&self, handler: impl MessageHandler + 'static) -> ReceiverResult<()> {
        let state = self.core.lifecycle.current();
        if state != LifecycleState::Started {
            return Err(ReceiverError::illegal_state("receive asynchronously", state));
        }

        let auto_ack: Option<AutoAck> = if self.core.config.auto_ack {
            let core = Arc::downgrade(&self.core);
            Some(Arc::new(move |message_id: MessageId| match core.upgrade() {
                Some(core) => core.acknowledge(message_id),
                None => Err(ReceiverError::internal("receiver was dropped")),
            }))
        } else {
            None
        };

        self.core
            .dispatch
            .install(Arc::new(handler), Arc::clone(&self.core.queue), auto_ack)?;
        Ok(())
    }

    /// Settle a delivered message with the broker
    pub fn ack(&self, message: &InboundMessage) -> ReceiverResult<()> {
        self.core.acknowledge(message.message_id())
    }

    /// Stop handing messages to the async handler; ingress is unaffected
    pub fn pause(&self) -> ReceiverResult<()> {
        self.set_dispatch_enabled(false, "pause")
    }

    pub fn resume(&self) -> ReceiverResult<()> {
        self.set_dispatch_enabled(true, "resume")
    }

    /// Register or replace the listener for flow active/passive changes
    pub fn set_state_change_listener(
        &self,
        listener: impl StateChangeListener + 'static,
    ) -> ReceiverResult<()> {
        let state = self.core.lifecycle.current();
        if state.is_shutting_down() {
            return Err(ReceiverError::illegal_state("set state change listener", state));
        }

        self.core.notifier.set_listener(Some(Arc::new(listener)));
        if state == LifecycleState::Started {
            self.core.notifier.start()?;
        }
        Ok(())
    }

    pub fn receiver_info(&self) -> ReceiverInfo {
        ReceiverInfo {
            is_durable: self.core.config.endpoint.durable,
            endpoint_name: self
                .core
                .bound_name
                .read()
                .clone()
                .or_else(|| self.core.config.endpoint.name.clone()),
        }
    }

    pub fn lifecycle_state(&self) -> LifecycleState {
        self.core.lifecycle.current()
    }

    /// Started with dispatch enabled
    pub fn is_running(&self) -> bool {
        self.lifecycle_state() == LifecycleState::Started && self.core.queue.can_consume()
    }

    pub fn is_paused(&self) -> bool {
        self.lifecycle_state() == LifecycleState::Started && !self.core.queue.can_consume()
    }

    pub fn is_terminating(&self) -> bool {
        self.lifecycle_state() == LifecycleState::Terminating
    }

    pub fn is_terminated(&self) -> bool {
        self.lifecycle_state().is_terminal()
    }

    /// Whether ingress is currently paused by backpressure
    pub fn is_ingress_paused(&self) -> bool {
        self.core.queue.is_ingress_paused()
    }

    /// Messages waiting in the inbound queue
    pub fn queued_messages(&self) -> usize {
        self.core.queue.len()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        let mut topics = self.core.subscriptions.pre_bind_topics();
        topics.extend(self.core.subscriptions.post_bind_topics());
        topics
    }

    pub fn stats(&self) -> ReceiverStats {
        self.core.counters.snapshot()
    }

    pub fn id(&self) -> &str {
        &self.core.id
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.core.config
    }

    fn set_dispatch_enabled(&self, enabled: bool, operation: &str) -> ReceiverResult<()> {
        let state = self.core.lifecycle.current();
        if state != LifecycleState::Started {
            return Err(ReceiverError::illegal_state(operation, state));
        }
        self.core.queue.set_can_consume(enabled);
        Ok(())
    }

    fn submit<F>(&self, operation: &str, job: F) -> ReceiverFuture<()>
    where
        F: FnOnce() -> ReceiverResult<()> + Send + 'static,
    {
        self.core.executor.submit(job).unwrap_or_else(|| {
            ReceiverFuture::ready(Err(ReceiverError::illegal_state(
                operation,
                self.core.lifecycle.current(),
            )))
        })
    }
}

impl std::fmt::Debug for PersistentReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentReceiver")
            .field("id", &self.core.id)
            .field("endpoint", &self.core.endpoint_label())
            .field("state", &self.core.lifecycle.current())
            .field("queued", &self.core.queue.len())
            .field("dispatching", &self.core.dispatch.is_running())
            .field("notifying", &self.core.notifier.is_running())
            .finish()
    }
}
