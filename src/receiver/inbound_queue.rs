//! # Inbound Queue
//!
//! Thread-safe FIFO between the transport callback thread and whoever
//! consumes messages: a blocking `receive_message` caller or the single
//! dispatch consumer. The queue also owns the "can consume" gate used by
//! pause/resume, the flow control state and the shutdown signals.
//!
//! `push` never waits on a consumer and never fails; backpressure is
//! signalled to the transport through the [`FlowController`] instead of by
//! refusing messages. The state lock is never held across a transport call.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use super::flow_control::{FlowAction, FlowControlState, FlowController};
use super::stats::ReceiverCounters;
use crate::messaging::{FlowHandle, InboundMessage};

enum Entry {
    Message(InboundMessage),
    /// Releases exactly one blocked synchronous receiver
    Wakeup,
}

/// Result of waiting for the queue to drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DrainOutcome {
    Drained,
    TimedOut,
    TransportDown,
}

#[derive(Default)]
struct QueueState {
    entries: VecDeque<Entry>,
    depth: usize,
    flow: FlowControlState,
    can_consume: bool,
    draining: bool,
    closed: bool,
    transport_down: bool,
    consumer_stop: bool,
    consumer_active: bool,
    blocked_receivers: usize,
}

pub(crate) struct InboundQueue {
    state: Mutex<QueueState>,
    /// Signalled when entries arrive or any consumer-visible flag changes
    available: Condvar,
    /// Signalled when depth reaches zero, the transport goes down or the consumer exits
    idle: Condvar,
    flow_controller: FlowController,
    counters: Arc<ReceiverCounters>,
}

impl InboundQueue {
    pub fn new(flow_controller: FlowController, counters: Arc<ReceiverCounters>) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
            flow_controller,
            counters,
        }
    }

    /// Called only from the transport callback thread
    pub fn push(&self, message: InboundMessage) {
        let mut state = self.state.lock();
        if state.closed {
            ReceiverCounters::increment(&self.counters.dropped);
            debug!(message_id = %message.message_id(), "Dropping message pushed after close");
            return;
        }
        state.entries.push_back(Entry::Message(message));
        state.depth += 1;
        ReceiverCounters::increment(&self.counters.received);

        let (depth, draining) = (state.depth, state.draining);
        let action = self.flow_controller.evaluate(&mut state.flow, depth, draining);
        drop(state);
        self.available.notify_all();
        self.run_flow_actions(action);
    }

    /// Blocking pop for synchronous receivers; `None` on timeout, wakeup or shutdown
    pub fn pop(&self, timeout: Option<Duration>) -> Option<InboundMessage> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let mut state = self.state.lock();
        loop {
            match state.entries.pop_front() {
                Some(Entry::Message(message)) => {
                    let action = self.after_dequeue(&mut state);
                    drop(state);
                    self.run_flow_actions(action);
                    return Some(message);
                }
                Some(Entry::Wakeup) => return None,
                None => {}
            }

            // Ingress is closed once draining starts, nothing more will arrive
            if state.closed || state.draining {
                return None;
            }

            state.blocked_receivers += 1;
            let timed_out = match deadline {
                Some(deadline) => self.available.wait_until(&mut state, deadline).timed_out(),
                None => {
                    self.available.wait(&mut state);
                    false
                }
            };
            state.blocked_receivers -= 1;

            if timed_out {
                return match state.entries.pop_front() {
                    Some(Entry::Message(message)) => {
                        let action = self.after_dequeue(&mut state);
                        drop(state);
                        self.run_flow_actions(action);
                        Some(message)
                    }
                    _ => None,
                };
            }
        }
    }

    /// Next message for the dispatch consumer; `None` tells the consumer to exit
    pub fn next_for_dispatch(&self) -> Option<InboundMessage> {
        let mut state = self.state.lock();
        loop {
            if state.consumer_stop || state.closed {
                return None;
            }
            if state.depth == 0 && (state.draining || state.transport_down) {
                return None;
            }

            // Draining ignores the pause gate so queued work is flushed
            if state.can_consume || state.draining {
                loop {
                    match state.entries.pop_front() {
                        Some(Entry::Message(message)) => {
                            let action = self.after_dequeue(&mut state);
                            drop(state);
                            self.run_flow_actions(action);
                            return Some(message);
                        }
                        Some(Entry::Wakeup) => continue,
                        None => break,
                    }
                }
                if state.draining {
                    return None;
                }
            }

            self.available.wait(&mut state);
        }
    }

    fn after_dequeue(&self, state: &mut QueueState) -> Option<FlowAction> {
        state.depth -= 1;
        let depth = state.depth;
        if depth == 0 {
            self.idle.notify_all();
        }
        self.flow_controller.evaluate(&mut state.flow, depth, state.draining)
    }

    /// Issue decided flow control calls; never called with the state lock held
    fn run_flow_actions(&self, mut next: Option<FlowAction>) {
        while let Some(action) = next {
            let succeeded = self.flow_controller.execute(&action);
            let mut state = self.state.lock();
            let (depth, draining) = (state.depth, state.draining);
            next = self
                .flow_controller
                .complete(&mut state.flow, &action, succeeded, depth, draining);
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().depth
    }

    /// Install the bound flow; messages delivered while binding may already be over the high watermark
    pub fn attach_flow(&self, flow: FlowHandle) {
        let mut state = self.state.lock();
        state.flow = FlowControlState::attached(flow);
        state.transport_down = false;
        let (depth, draining) = (state.depth, state.draining);
        let action = self.flow_controller.evaluate(&mut state.flow, depth, draining);
        drop(state);
        self.run_flow_actions(action);
    }

    pub fn detach_flow(&self) {
        self.state.lock().flow = FlowControlState::default();
    }

    pub fn is_ingress_paused(&self) -> bool {
        self.state.lock().flow.ingress_paused
    }

    /// Dispatch gate toggled by pause/resume
    pub fn set_can_consume(&self, can_consume: bool) {
        self.state.lock().can_consume = can_consume;
        self.available.notify_all();
    }

    pub fn can_consume(&self) -> bool {
        self.state.lock().can_consume
    }

    /// Enter shutdown: stop resuming ingress and pause it unconditionally
    pub fn begin_drain(&self) {
        let mut state = self.state.lock();
        state.draining = true;
        let action = self.flow_controller.shutdown(&state.flow, state.depth);
        drop(state);
        self.available.notify_all();
        self.run_flow_actions(action);
    }

    /// Wait until the queue is empty, the transport goes down, or the deadline passes
    pub fn wait_drained(&self, deadline: Instant) -> DrainOutcome {
        let mut state = self.state.lock();
        loop {
            if state.depth == 0 {
                return DrainOutcome::Drained;
            }
            if state.transport_down {
                return DrainOutcome::TransportDown;
            }
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return if state.depth == 0 {
                    DrainOutcome::Drained
                } else {
                    DrainOutcome::TimedOut
                };
            }
        }
    }

    /// Release one blocked synchronous receiver, if any
    pub fn wake_blocked_receiver(&self) -> bool {
        let mut state = self.state.lock();
        if state.blocked_receivers == 0 {
            return false;
        }
        state.entries.push_back(Entry::Wakeup);
        drop(state);
        self.available.notify_all();
        true
    }

    pub fn mark_transport_down(&self) {
        let mut state = self.state.lock();
        state.transport_down = true;
        if state.blocked_receivers > 0 {
            state.entries.push_back(Entry::Wakeup);
        }
        drop(state);
        self.available.notify_all();
        self.idle.notify_all();
    }

    pub fn consumer_started(&self) {
        let mut state = self.state.lock();
        state.consumer_active = true;
        state.consumer_stop = false;
    }

    pub fn consumer_exited(&self) {
        self.state.lock().consumer_active = false;
        self.idle.notify_all();
    }

    pub fn request_consumer_stop(&self) {
        self.state.lock().consumer_stop = true;
        self.available.notify_all();
    }

    /// Wait for the dispatch consumer to leave its loop; `false` if still running at the deadline
    pub fn wait_consumer_exit(&self, deadline: Instant) -> bool {
        let mut state = self.state.lock();
        while state.consumer_active {
            if self.idle.wait_until(&mut state, deadline).timed_out() {
                return !state.consumer_active;
            }
        }
        true
    }

    /// Remove every queued message; their payloads are released on drop
    pub fn discard_all(&self) -> usize {
        let mut state = self.state.lock();
        let discarded = state
            .entries
            .drain(..)
            .filter(|entry| matches!(entry, Entry::Message(_)))
            .count();
        state.depth = 0;
        drop(state);
        self.idle.notify_all();
        discarded
    }

    /// Final close: every blocked or future receiver gets `None`
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.consumer_stop = true;
        drop(state);
        self.available.notify_all();
        self.idle.notify_all();
    }

    /// Back to a fresh state after a failed start
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.depth = 0;
        state.flow = FlowControlState::default();
        state.transport_down = false;
        state.can_consume = false;
    }
}
