//! # Receiver Core
//!
//! Shared state behind every [`crate::PersistentReceiver`] handle: the
//! lifecycle, the single native flow, and the components that operate on
//! them. Public handles are thin `Arc` wrappers around this struct.
//!
//! ## Locking
//!
//! The lifecycle transition lock is taken only by `start` and `terminate`
//! and is always acquired before any component lock, never the reverse.
//! Everything else reads the lifecycle state from an atomic.

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use super::ack::AckCoordinator;
use super::dispatch::DispatchEngine;
use super::executor::BackgroundExecutor;
use super::flow_control::FlowController;
use super::inbound_queue::InboundQueue;
use super::notifier::StateChangeNotifier;
use super::stats::ReceiverCounters;
use super::subscriptions::SubscriptionManager;
use crate::config::ReceiverConfig;
use crate::error::{ReceiverError, ReceiverResult};
use crate::messaging::{
    FlowEvent, FlowGuard, FlowHandle, FlowListener, InboundMessage, MessageId, NativeTransport,
};
use crate::state_machine::{determine_target_state, LifecycleEvent, LifecycleState, StateChangeEvent};

/// Lifecycle state plus the lock that serializes transitions
pub(crate) struct Lifecycle {
    state: AtomicU8,
    transition_lock: Mutex<()>,
}

impl Lifecycle {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(LifecycleState::NotStarted as u8),
            transition_lock: Mutex::new(()),
        }
    }

    pub fn current(&self) -> LifecycleState {
        LifecycleState::from(self.state.load(Ordering::Acquire))
    }

    pub fn lock(&self) -> MutexGuard<'_, ()> {
        self.transition_lock.lock()
    }

    /// Apply `event`; the caller must hold the transition lock
    pub fn apply(
        &self,
        _guard: &MutexGuard<'_, ()>,
        event: LifecycleEvent,
    ) -> ReceiverResult<LifecycleState> {
        let current = self.current();
        let target = determine_target_state(current, event)
            .ok_or_else(|| ReceiverError::illegal_state(event.event_type(), current))?;
        self.state.store(target as u8, Ordering::Release);
        debug!(
            from_state = %current,
            to_state = %target,
            event = event.event_type(),
            "Receiver lifecycle transition"
        );
        Ok(target)
    }
}

pub(crate) struct ReceiverCore {
    pub id: String,
    pub config: ReceiverConfig,
    pub transport: Arc<dyn NativeTransport>,
    pub lifecycle: Lifecycle,
    pub queue: Arc<InboundQueue>,
    /// Owned native flow; `Some` only between a successful bind and release
    pub flow: Mutex<Option<FlowGuard>>,
    pub acks: AckCoordinator,
    pub subscriptions: SubscriptionManager,
    pub dispatch: DispatchEngine,
    pub notifier: StateChangeNotifier,
    pub executor: BackgroundExecutor,
    pub counters: Arc<ReceiverCounters>,
    /// Destination the flow is bound to, resolved at start
    pub bound_name: RwLock<Option<String>>,
    self_ref: Weak<ReceiverCore>,
}

impl ReceiverCore {
    pub fn new(config: ReceiverConfig, transport: Arc<dyn NativeTransport>) -> Arc<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        let counters = Arc::new(ReceiverCounters::default());
        let flow_controller = FlowController::new(
            id.clone(),
            config.flow_control,
            Arc::clone(&transport),
            Arc::clone(&counters),
        );

        Arc::new_cyclic(|self_ref| Self {
            queue: Arc::new(InboundQueue::new(flow_controller, Arc::clone(&counters))),
            flow: Mutex::new(None),
            acks: AckCoordinator::new(Arc::clone(&transport), Arc::clone(&counters)),
            subscriptions: SubscriptionManager::new(
                id.clone(),
                config.endpoint.durable,
                config.endpoint_properties(),
                Arc::clone(&transport),
            ),
            dispatch: DispatchEngine::new(id.clone(), Arc::clone(&counters)),
            notifier: StateChangeNotifier::new(id.clone()),
            executor: BackgroundExecutor::new(id.clone()),
            lifecycle: Lifecycle::new(),
            bound_name: RwLock::new(None),
            self_ref: self_ref.clone(),
            counters,
            transport,
            config,
            id,
        })
    }

    pub fn flow_handle(&self) -> Option<FlowHandle> {
        self.flow.lock().as_ref().map(FlowGuard::handle)
    }

    pub(super) fn listener(&self) -> Arc<dyn FlowListener> {
        Arc::new(FlowCallbacks {
            core: self.self_ref.clone(),
        })
    }

    /// Label used in logs and client errors for the endpoint
    pub fn endpoint_label(&self) -> String {
        self.bound_name
            .read()
            .clone()
            .or_else(|| self.config.endpoint.name.clone())
            .unwrap_or_else(|| "<temporary>".to_string())
    }

    pub fn acknowledge(&self, message_id: MessageId) -> ReceiverResult<()> {
        self.acks
            .acknowledge(self.lifecycle.current(), self.flow_handle(), message_id)
    }

    pub fn add_subscription(&self, topic: &str) -> ReceiverResult<()> {
        self.subscriptions.add(topic, self.lifecycle.current())
    }

    pub fn remove_subscription(&self, topic: &str) -> ReceiverResult<()> {
        self.subscriptions.remove(topic, self.lifecycle.current())
    }

    /// Transport thread entry point for new messages
    fn enqueue(&self, message: InboundMessage) {
        let state = self.lifecycle.current();
        if !state.accepts_messages() {
            ReceiverCounters::increment(&self.counters.dropped);
            debug!(
                receiver_id = %self.id,
                message_id = %message.message_id(),
                state = %state,
                "Dropping message received outside an active receiver"
            );
            return;
        }
        self.queue.push(message);
    }

    /// Transport thread entry point for flow events
    fn handle_flow_event(&self, event: FlowEvent) {
        match event {
            FlowEvent::Active => {
                info!(receiver_id = %self.id, endpoint = %self.endpoint_label(), "🟢 Flow is active");
            }
            FlowEvent::Passive => {
                warn!(
                    receiver_id = %self.id,
                    endpoint = %self.endpoint_label(),
                    "Flow became passive; releasing a blocked receive"
                );
                self.queue.wake_blocked_receiver();
            }
            FlowEvent::Down => {
                warn!(
                    receiver_id = %self.id,
                    endpoint = %self.endpoint_label(),
                    queued = self.queue.len(),
                    "Flow went down; queued messages can no longer be acknowledged"
                );
                self.queue.mark_transport_down();
            }
        }

        if let Some(change) = StateChangeEvent::from_flow_event(event) {
            self.notifier.publish(change);
        }
    }
}

impl Drop for ReceiverCore {
    fn drop(&mut self) {
        if !self.lifecycle.current().is_terminal() {
            warn!(
                receiver_id = %self.id,
                state = %self.lifecycle.current(),
                "Receiver dropped without terminate; releasing resources"
            );
        }
        self.queue.close();
        self.notifier.stop();
        self.executor.shutdown();
    }
}

/// Listener handed to the transport; holds the core weakly so the flow never keeps it alive
struct FlowCallbacks {
    core: Weak<ReceiverCore>,
}

impl FlowListener for FlowCallbacks {
    fn on_message(&self, message: InboundMessage) {
        match self.core.upgrade() {
            Some(core) => core.enqueue(message),
            None => debug!(message_id = %message.message_id(), "Receiver gone; message not queued"),
        }
    }

    fn on_event(&self, event: FlowEvent) {
        if let Some(core) = self.core.upgrade() {
            core.handle_flow_event(event);
        }
    }
}
