//! # Dispatch Engine
//!
//! The single asynchronous consumer of a receiver. One dedicated thread pulls
//! from the inbound queue and invokes the registered [`MessageHandler`], so
//! exactly one message is in flight to the handler at a time and handler
//! calls observe queue order.
//!
//! Handler failures (an `Err` or a panic) are logged and counted. They never
//! stop the consumer and never reach the transport thread.

use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::inbound_queue::InboundQueue;
use super::stats::ReceiverCounters;
use crate::constants::threads;
use crate::error::{ReceiverError, ReceiverResult};
use crate::messaging::{InboundMessage, MessageId};

/// Application callback for asynchronously delivered messages
///
/// Returning `Ok` lets the receiver auto-acknowledge the message when
/// auto-ack is enabled; returning `Err` leaves it unacknowledged.
pub trait MessageHandler: Send + Sync {
    fn on_message(&self, message: InboundMessage) -> anyhow::Result<()>;
}

impl<F> MessageHandler for F
where
    F: Fn(InboundMessage) -> anyhow::Result<()> + Send + Sync,
{
    fn on_message(&self, message: InboundMessage) -> anyhow::Result<()> {
        self(message)
    }
}

/// Acknowledges a message by id after the handler succeeded
pub(crate) type AutoAck = Arc<dyn Fn(MessageId) -> ReceiverResult<()> + Send + Sync>;

type SharedHandler = Arc<RwLock<Option<Arc<dyn MessageHandler>>>>;

pub(crate) struct DispatchEngine {
    receiver_id: String,
    handler: SharedHandler,
    consumer: Mutex<Option<JoinHandle<()>>>,
    counters: Arc<ReceiverCounters>,
}

impl DispatchEngine {
    pub fn new(receiver_id: String, counters: Arc<ReceiverCounters>) -> Self {
        Self {
            receiver_id,
            handler: Arc::new(RwLock::new(None)),
            consumer: Mutex::new(None),
            counters,
        }
    }

    /// Register `handler`, spawning the consumer if none is running.
    /// Returns `true` when a consumer was started by this call.
    pub fn install(
        &self,
        handler: Arc<dyn MessageHandler>,
        queue: Arc<InboundQueue>,
        auto_ack: Option<AutoAck>,
    ) -> ReceiverResult<bool> {
        *self.handler.write() = Some(handler);

        let mut consumer = self.consumer.lock();
        if consumer.as_ref().is_some_and(|handle| !handle.is_finished()) {
            debug!(receiver_id = %self.receiver_id, "Message handler replaced");
            return Ok(false);
        }

        queue.consumer_started();
        let handler = Arc::clone(&self.handler);
        let counters = Arc::clone(&self.counters);
        let receiver_id = self.receiver_id.clone();
        let worker_queue = Arc::clone(&queue);

        let spawned = thread::Builder::new()
            .name(threads::DISPATCH.to_string())
            .spawn(move || {
                consume(&receiver_id, &worker_queue, &handler, &counters, auto_ack);
                worker_queue.consumer_exited();
            });

        match spawned {
            Ok(handle) => {
                *consumer = Some(handle);
                info!(receiver_id = %self.receiver_id, "📨 Dispatch consumer started");
                Ok(true)
            }
            Err(e) => {
                queue.consumer_exited();
                Err(ReceiverError::internal(format!(
                    "Failed to spawn dispatch consumer: {e}"
                )))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.consumer
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn is_consumer_thread(&self) -> bool {
        self.consumer
            .lock()
            .as_ref()
            .is_some_and(|handle| handle.thread().id() == thread::current().id())
    }

    /// Ask the consumer to exit and join it if it does so before `deadline`.
    /// A consumer stuck in the handler past the deadline is detached.
    pub fn stop(&self, queue: &InboundQueue, deadline: Instant) -> bool {
        queue.request_consumer_stop();
        let Some(handle) = self.consumer.lock().take() else {
            return true;
        };

        if handle.thread().id() == thread::current().id() {
            debug!(
                receiver_id = %self.receiver_id,
                "Stop requested from inside the message handler; consumer exits after it returns"
            );
            return true;
        }

        if queue.wait_consumer_exit(deadline) {
            if handle.join().is_err() {
                warn!(receiver_id = %self.receiver_id, "Dispatch consumer thread panicked");
            }
            // Handlers often capture a receiver handle; release it with the consumer
            self.handler.write().take();
            debug!(receiver_id = %self.receiver_id, "Dispatch consumer joined");
            true
        } else {
            warn!(
                receiver_id = %self.receiver_id,
                "Message handler still running after grace period; detaching dispatch consumer"
            );
            false
        }
    }
}

fn consume(
    receiver_id: &str,
    queue: &InboundQueue,
    handler: &SharedHandler,
    counters: &ReceiverCounters,
    auto_ack: Option<AutoAck>,
) {
    while let Some(message) = queue.next_for_dispatch() {
        ReceiverCounters::increment(&counters.delivered);
        let message_id = message.message_id();

        let current = handler.read().clone();
        let Some(current) = current else {
            error!(receiver_id = %receiver_id, message_id = %message_id, "No message handler registered");
            continue;
        };

        let outcome =
            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| current.on_message(message)));

        match outcome {
            Ok(Ok(())) => {
                if let Some(ack) = &auto_ack {
                    if let Err(e) = ack(message_id) {
                        warn!(
                            receiver_id = %receiver_id,
                            message_id = %message_id,
                            error = %e,
                            "Auto-acknowledge failed"
                        );
                    }
                }
            }
            Ok(Err(e)) => {
                ReceiverCounters::increment(&counters.handler_failures);
                warn!(
                    receiver_id = %receiver_id,
                    message_id = %message_id,
                    error = %e,
                    "Message handler failed; message left unacknowledged"
                );
            }
            Err(payload) => {
                ReceiverCounters::increment(&counters.handler_failures);
                error!(
                    receiver_id = %receiver_id,
                    message_id = %message_id,
                    error = %panic_message(payload.as_ref()),
                    "Message handler panicked; message left unacknowledged"
                );
            }
        }
    }
    debug!(receiver_id = %receiver_id, "Dispatch consumer exiting");
}

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
