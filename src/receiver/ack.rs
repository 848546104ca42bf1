use std::sync::Arc;
use tracing::debug;

use super::stats::ReceiverCounters;
use crate::error::{ReceiverError, ReceiverResult};
use crate::messaging::{FlowHandle, MessageId, NativeTransport};
use crate::state_machine::LifecycleState;

/// Settles messages with the broker on the bound flow
pub(crate) struct AckCoordinator {
    transport: Arc<dyn NativeTransport>,
    counters: Arc<ReceiverCounters>,
}

impl AckCoordinator {
    pub fn new(transport: Arc<dyn NativeTransport>, counters: Arc<ReceiverCounters>) -> Self {
        Self {
            transport,
            counters,
        }
    }

    /// Acknowledge allowed while started, and while terminating so the drain can settle
    pub fn acknowledge(
        &self,
        state: LifecycleState,
        flow: Option<FlowHandle>,
        message_id: MessageId,
    ) -> ReceiverResult<()> {
        if !state.allows_ack() {
            return Err(ReceiverError::illegal_state("acknowledge", state));
        }
        let Some(flow) = flow else {
            return Err(ReceiverError::illegal_state("acknowledge", state));
        };

        self.transport
            .acknowledge(flow, message_id)
            .map_err(|e| ReceiverError::client("acknowledge", message_id.to_string(), e))?;

        ReceiverCounters::increment(&self.counters.acknowledged);
        debug!(message_id = %message_id, flow = %flow, "✅ Message acknowledged");
        Ok(())
    }
}
