//! # Ingress Flow Control
//!
//! Watches inbound queue depth against high/low watermarks and pauses or
//! resumes delivery from the transport.
//!
//! Crossings are decided inside the queue's critical section and marked in
//! flight there, so each crossing produces exactly one native call. The call
//! itself runs after the queue lock is released: native clients take their
//! own context lock for flow start/stop and hold it while delivering
//! messages, so calling out under the queue lock would invert that order.
//! Native failures are logged and never propagate: the queue keeps working
//! and only the backpressure signal degrades.

use std::sync::Arc;
use tracing::warn;

use super::stats::ReceiverCounters;
use crate::config::FlowControlConfig;
use crate::logging::log_flow_control;
use crate::messaging::{FlowHandle, NativeTransport};

/// Flow control state, guarded by the inbound queue's lock
#[derive(Debug, Default)]
pub(crate) struct FlowControlState {
    pub flow: Option<FlowHandle>,
    pub ingress_paused: bool,
    /// A watermark crossing has been decided and its native call is running
    pub crossing_in_flight: bool,
}

impl FlowControlState {
    pub fn attached(flow: FlowHandle) -> Self {
        Self {
            flow: Some(flow),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlowCommand {
    Pause,
    Resume,
    PauseForShutdown,
}

impl FlowCommand {
    fn label(&self) -> &'static str {
        match self {
            FlowCommand::Pause => "pause_ingress",
            FlowCommand::Resume => "resume_ingress",
            FlowCommand::PauseForShutdown => "pause_ingress_for_shutdown",
        }
    }
}

/// A native call decided under the queue lock, to be issued after releasing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlowAction {
    pub command: FlowCommand,
    pub flow: FlowHandle,
    pub depth: usize,
}

pub(crate) struct FlowController {
    receiver_id: String,
    watermarks: FlowControlConfig,
    transport: Arc<dyn NativeTransport>,
    counters: Arc<ReceiverCounters>,
}

impl FlowController {
    pub fn new(
        receiver_id: String,
        watermarks: FlowControlConfig,
        transport: Arc<dyn NativeTransport>,
        counters: Arc<ReceiverCounters>,
    ) -> Self {
        Self {
            receiver_id,
            watermarks,
            transport,
            counters,
        }
    }

    /// Decide whether the current depth crosses a watermark
    ///
    /// Pauses at the high watermark, resumes at the low one. Nothing is
    /// resumed while draining, and nothing new is decided while another
    /// crossing is still in flight; its completion re-evaluates.
    pub fn evaluate(
        &self,
        state: &mut FlowControlState,
        depth: usize,
        draining: bool,
    ) -> Option<FlowAction> {
        if state.crossing_in_flight || draining {
            return None;
        }
        let flow = state.flow?;
        let command = if !state.ingress_paused && depth >= self.watermarks.high_watermark {
            FlowCommand::Pause
        } else if state.ingress_paused && depth <= self.watermarks.low_watermark {
            FlowCommand::Resume
        } else {
            return None;
        };
        state.crossing_in_flight = true;
        Some(FlowAction {
            command,
            flow,
            depth,
        })
    }

    /// Unconditional pause issued when shutdown begins
    ///
    /// Does not wait for an in-flight crossing; a resume that completes
    /// during the drain is followed by another pause in [`Self::complete`].
    pub fn shutdown(&self, state: &FlowControlState, depth: usize) -> Option<FlowAction> {
        state.flow.map(|flow| FlowAction {
            command: FlowCommand::PauseForShutdown,
            flow,
            depth,
        })
    }

    /// Issue the native call; must run without the queue lock held
    pub fn execute(&self, action: &FlowAction) -> bool {
        let result = match action.command {
            FlowCommand::Pause | FlowCommand::PauseForShutdown => {
                self.transport.pause_ingress(action.flow)
            }
            FlowCommand::Resume => self.transport.resume_ingress(action.flow),
        };

        match result {
            Ok(()) => {
                match action.command {
                    FlowCommand::Pause => ReceiverCounters::increment(&self.counters.ingress_pauses),
                    FlowCommand::Resume => {
                        ReceiverCounters::increment(&self.counters.ingress_resumes)
                    }
                    FlowCommand::PauseForShutdown => {}
                }
                log_flow_control(&self.receiver_id, action.command.label(), action.depth, true);
                true
            }
            Err(e) if action.command == FlowCommand::PauseForShutdown => {
                warn!(
                    receiver_id = %self.receiver_id,
                    error = %e,
                    "Failed to pause ingress for shutdown; continuing"
                );
                false
            }
            Err(e) => {
                warn!(
                    receiver_id = %self.receiver_id,
                    error = %e,
                    action = action.command.label(),
                    "Ingress flow control call failed"
                );
                log_flow_control(&self.receiver_id, action.command.label(), action.depth, false);
                false
            }
        }
    }

    /// Record the outcome back under the queue lock and decide any follow-up
    ///
    /// Depth may have moved while the call ran, so a successful crossing is
    /// re-evaluated against the current depth. A failed one is retried by
    /// the next push or pop.
    pub fn complete(
        &self,
        state: &mut FlowControlState,
        action: &FlowAction,
        succeeded: bool,
        depth: usize,
        draining: bool,
    ) -> Option<FlowAction> {
        if action.command != FlowCommand::PauseForShutdown {
            state.crossing_in_flight = false;
        }
        // The flow was released or replaced while the call ran
        if state.flow != Some(action.flow) || !succeeded {
            return None;
        }

        match action.command {
            FlowCommand::Pause | FlowCommand::PauseForShutdown => state.ingress_paused = true,
            FlowCommand::Resume => {
                state.ingress_paused = false;
                if draining {
                    return self.shutdown(state, depth);
                }
            }
        }
        self.evaluate(state, depth, draining)
    }
}
