//! # State Change Notifier
//!
//! Delivers [`StateChangeEvent`]s to the application's listener on a thread
//! of its own, so a slow listener never delays the transport callback thread
//! or message delivery. The channel is unbounded: publishing never blocks
//! and never drops an event.

use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, warn};

use super::dispatch::panic_message;
use crate::constants::threads;
use crate::error::{ReceiverError, ReceiverResult};
use crate::state_machine::{ReceiverState, StateChangeEvent};

/// Callback for active/passive transitions of the receiver's flow
pub trait StateChangeListener: Send + Sync {
    fn on_change(&self, old_state: ReceiverState, new_state: ReceiverState, timestamp: Instant);
}

impl<F> StateChangeListener for F
where
    F: Fn(ReceiverState, ReceiverState, Instant) + Send + Sync,
{
    fn on_change(&self, old_state: ReceiverState, new_state: ReceiverState, timestamp: Instant) {
        self(old_state, new_state, timestamp)
    }
}

type SharedListener = Arc<RwLock<Option<Arc<dyn StateChangeListener>>>>;

struct Worker {
    sender: Sender<StateChangeEvent>,
    handle: JoinHandle<()>,
}

pub(crate) struct StateChangeNotifier {
    receiver_id: String,
    listener: SharedListener,
    worker: Mutex<Option<Worker>>,
}

impl StateChangeNotifier {
    pub fn new(receiver_id: String) -> Self {
        Self {
            receiver_id,
            listener: Arc::new(RwLock::new(None)),
            worker: Mutex::new(None),
        }
    }

    pub fn set_listener(&self, listener: Option<Arc<dyn StateChangeListener>>) {
        *self.listener.write() = listener;
    }

    pub fn has_listener(&self) -> bool {
        self.listener.read().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Spawn the delivery thread; no-op when already running
    pub fn start(&self) -> ReceiverResult<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }

        let (sender, events) = unbounded::<StateChangeEvent>();
        let listener = Arc::clone(&self.listener);
        let receiver_id = self.receiver_id.clone();

        let handle = thread::Builder::new()
            .name(threads::STATE_CHANGE.to_string())
            .spawn(move || {
                // Ends once every sender is dropped and the backlog is delivered
                for event in events.iter() {
                    let current = listener.read().clone();
                    let Some(current) = current else {
                        continue;
                    };
                    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        current.on_change(event.old_state, event.new_state, event.timestamp)
                    }));
                    if let Err(payload) = outcome {
                        error!(
                            receiver_id = %receiver_id,
                            error = %panic_message(payload.as_ref()),
                            "State change listener panicked; continuing"
                        );
                    }
                }
                debug!(receiver_id = %receiver_id, "State change notifier exited");
            })
            .map_err(|e| {
                ReceiverError::internal(format!("Failed to spawn state change notifier: {e}"))
            })?;

        *worker = Some(Worker { sender, handle });
        debug!(receiver_id = %self.receiver_id, "🔔 State change notifier started");
        Ok(())
    }

    /// Queue an event without blocking; dropped only when no notifier is running
    pub fn publish(&self, event: StateChangeEvent) {
        let worker = self.worker.lock();
        match worker.as_ref() {
            Some(worker) => {
                if worker.sender.send(event).is_err() {
                    warn!(receiver_id = %self.receiver_id, "State change notifier has exited");
                }
            }
            None => debug!(
                receiver_id = %self.receiver_id,
                old_state = %event.old_state,
                new_state = %event.new_state,
                "No state change listener running; event not delivered"
            ),
        }
    }

    /// Close the channel and join the thread once queued events are delivered
    pub fn stop(&self) {
        let Some(Worker { sender, handle }) = self.worker.lock().take() else {
            return;
        };
        drop(sender);

        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!(receiver_id = %self.receiver_id, "State change notifier thread panicked");
        }
    }
}
