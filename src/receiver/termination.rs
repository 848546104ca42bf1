//! # Termination
//!
//! Graceful drain-then-stop bounded by a caller-supplied grace period.
//!
//! The wait is on queue emptiness, not on handler completion: the message a
//! handler is processing when the queue empties may still be in flight when
//! `terminate` moves on to stopping the consumer. A consumer that does not
//! return before the deadline is detached rather than joined.

use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::inbound_queue::DrainOutcome;
use super::receiver_core::ReceiverCore;
use super::stats::ReceiverCounters;
use crate::logging::log_receiver_operation;
use crate::state_machine::{LifecycleEvent, LifecycleState};

impl ReceiverCore {
    /// Shut the receiver down; never fails, shutdown races degrade to warnings
    pub fn terminate(&self, grace_period: Duration) {
        if self.lifecycle.current().is_terminal() {
            return;
        }

        let guard = self.lifecycle.lock();
        match self.lifecycle.current() {
            LifecycleState::Started => {}
            LifecycleState::NotStarted => {
                if let Err(e) = self.lifecycle.apply(&guard, LifecycleEvent::Terminate) {
                    warn!(receiver_id = %self.id, error = %e, "Terminate raced with another transition");
                    return;
                }
                self.subscriptions.unsubscribe_all();
                self.notifier.stop();
                self.queue.close();
                self.executor.shutdown();
                log_receiver_operation("terminate", &self.id, None, "terminated", Some("never started"));
                return;
            }
            // Another caller already completed teardown while we waited for the lock
            state => {
                debug!(receiver_id = %self.id, state = %state, "Terminate already handled");
                return;
            }
        }

        if let Err(e) = self.lifecycle.apply(&guard, LifecycleEvent::Terminate) {
            warn!(receiver_id = %self.id, error = %e, "Terminate raced with another transition");
            return;
        }
        let deadline = Instant::now() + grace_period;
        let endpoint = self.endpoint_label();
        let details = format!("grace_period_ms={}", grace_period.as_millis());
        log_receiver_operation("terminate", &self.id, Some(&endpoint), "terminating", Some(&details));

        self.subscriptions.unsubscribe_all();
        self.queue.begin_drain();
        self.drain_queue(deadline);

        if !self.dispatch.stop(&self.queue, deadline) {
            warn!(
                receiver_id = %self.id,
                "Dispatch consumer did not finish within the grace period"
            );
        }
        self.notifier.stop();

        let discarded = self.queue.discard_all();
        if discarded > 0 {
            ReceiverCounters::add(&self.counters.discarded_on_shutdown, discarded as u64);
            warn!(
                receiver_id = %self.id,
                endpoint = %endpoint,
                discarded = discarded,
                "Receiver terminated with undelivered messages; the broker will redeliver them"
            );
        }

        // Release the flow exactly once, then wake anything still blocked
        self.queue.detach_flow();
        let flow = self.flow.lock().take();
        drop(flow);
        self.queue.close();
        self.executor.shutdown();

        if let Err(e) = self.lifecycle.apply(&guard, LifecycleEvent::Released) {
            warn!(receiver_id = %self.id, error = %e, "Unexpected lifecycle state after teardown");
        }

        let stats = self.counters.snapshot();
        info!(
            receiver_id = %self.id,
            endpoint = %endpoint,
            received = stats.received,
            delivered = stats.delivered,
            acknowledged = stats.acknowledged,
            discarded = stats.discarded_on_shutdown,
            "🛑 Receiver terminated"
        );
        log_receiver_operation("terminate", &self.id, Some(&endpoint), "terminated", None);
    }

    fn drain_queue(&self, deadline: Instant) {
        let queued = self.queue.len();
        if queued == 0 {
            return;
        }

        if !self.transport.is_connected() {
            self.queue.mark_transport_down();
            warn!(
                receiver_id = %self.id,
                queued = queued,
                "Transport disconnected with messages still queued; skipping drain"
            );
            return;
        }

        if self.dispatch.is_consumer_thread() {
            // The consumer cannot drain while it is blocked in this call
            debug!(receiver_id = %self.id, "Terminate called from the message handler; not waiting for drain");
            return;
        }

        match self.queue.wait_drained(deadline) {
            DrainOutcome::Drained => debug!(receiver_id = %self.id, "Inbound queue drained"),
            DrainOutcome::TimedOut => warn!(
                receiver_id = %self.id,
                remaining = self.queue.len(),
                "Grace period elapsed before the inbound queue drained"
            ),
            DrainOutcome::TransportDown => warn!(
                receiver_id = %self.id,
                remaining = self.queue.len(),
                "Transport went down while draining; abandoning drain"
            ),
        }
    }
}
