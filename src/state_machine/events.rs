use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::states::{LifecycleState, ReceiverState};
use crate::messaging::FlowEvent;

/// Events that drive lifecycle transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    /// `start()` was called
    Start,
    /// Flow created and post-bind subscriptions replayed
    Bound,
    /// Start failed; the receiver may be started again
    StartFailed,
    /// `terminate()` was called
    Terminate,
    /// Drain finished (or grace period elapsed) and the flow was released
    Released,
}

impl LifecycleEvent {
    /// Get a string representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Bound => "bound",
            Self::StartFailed => "start_failed",
            Self::Terminate => "terminate",
            Self::Released => "released",
        }
    }
}

/// Determine the state an event leads to, or `None` if the transition is illegal
pub fn determine_target_state(
    current: LifecycleState,
    event: LifecycleEvent,
) -> Option<LifecycleState> {
    let target = match (current, event) {
        (LifecycleState::NotStarted, LifecycleEvent::Start) => LifecycleState::Starting,
        (LifecycleState::Starting, LifecycleEvent::Bound) => LifecycleState::Started,
        (LifecycleState::Starting, LifecycleEvent::StartFailed) => LifecycleState::NotStarted,

        // A receiver that never bound has nothing to drain
        (LifecycleState::NotStarted, LifecycleEvent::Terminate) => LifecycleState::Terminated,
        (LifecycleState::Started, LifecycleEvent::Terminate) => LifecycleState::Terminating,
        (LifecycleState::Terminating, LifecycleEvent::Released) => LifecycleState::Terminated,

        _ => return None,
    };
    Some(target)
}

/// Flow activity change delivered to a state change listener
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateChangeEvent {
    pub old_state: ReceiverState,
    pub new_state: ReceiverState,
    pub timestamp: Instant,
}

impl StateChangeEvent {
    pub fn new(old_state: ReceiverState, new_state: ReceiverState) -> Self {
        Self {
            old_state,
            new_state,
            timestamp: Instant::now(),
        }
    }

    /// Translate a transport flow event; `Down` carries no activity change
    pub fn from_flow_event(event: FlowEvent) -> Option<Self> {
        match event {
            FlowEvent::Active => Some(Self::new(ReceiverState::Passive, ReceiverState::Active)),
            FlowEvent::Passive => Some(Self::new(ReceiverState::Active, ReceiverState::Passive)),
            FlowEvent::Down => None,
        }
    }
}
