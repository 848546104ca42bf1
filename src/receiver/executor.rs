//! # Background Executor
//!
//! Runs the `*_async` variants of receiver operations on one lazily spawned
//! worker thread and hands the caller a [`ReceiverFuture`]. Jobs run in
//! submission order. Shutdown closes the job channel without waiting: jobs
//! already queued still complete, later submissions are refused.

use crossbeam::channel::{unbounded, Sender};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, error};

use super::dispatch::panic_message;
use crate::constants::threads;
use crate::error::{ReceiverError, ReceiverResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Default)]
struct ExecutorState {
    sender: Option<Sender<Job>>,
    shut_down: bool,
}

pub(crate) struct BackgroundExecutor {
    receiver_id: String,
    state: Mutex<ExecutorState>,
}

impl BackgroundExecutor {
    pub fn new(receiver_id: String) -> Self {
        Self {
            receiver_id,
            state: Mutex::new(ExecutorState::default()),
        }
    }

    /// Queue `operation`; `None` once the executor has been shut down
    pub fn submit<T, F>(&self, operation: F) -> Option<ReceiverFuture<T>>
    where
        T: Send + 'static,
        F: FnOnce() -> ReceiverResult<T> + Send + 'static,
    {
        let mut state = self.state.lock();
        if state.shut_down {
            return None;
        }

        if state.sender.is_none() {
            match self.spawn_worker() {
                Ok(sender) => state.sender = Some(sender),
                Err(e) => return Some(ReceiverFuture::ready(Err(e))),
            }
        }

        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // The caller may have dropped the future; that is not an error
            let _ = tx.send(operation());
        });

        let sender = state.sender.as_ref()?;
        if sender.send(job).is_err() {
            return Some(ReceiverFuture::ready(Err(ReceiverError::internal(
                "background executor is no longer running",
            ))));
        }
        Some(ReceiverFuture::pending(rx))
    }

    /// Refuse further jobs; queued jobs still run. Does not wait.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        state.shut_down = true;
        state.sender = None;
    }

    fn spawn_worker(&self) -> ReceiverResult<Sender<Job>> {
        let (sender, jobs) = unbounded::<Job>();
        let receiver_id = self.receiver_id.clone();

        thread::Builder::new()
            .name(threads::EXECUTOR.to_string())
            .spawn(move || {
                for job in jobs.iter() {
                    if let Err(payload) =
                        std::panic::catch_unwind(std::panic::AssertUnwindSafe(job))
                    {
                        error!(
                            receiver_id = %receiver_id,
                            error = %panic_message(payload.as_ref()),
                            "Background receiver operation panicked"
                        );
                    }
                }
                debug!(receiver_id = %receiver_id, "Background executor exited");
            })
            .map_err(|e| {
                ReceiverError::internal(format!("Failed to spawn background executor: {e}"))
            })?;

        Ok(sender)
    }
}

enum FutureState<T> {
    Pending(oneshot::Receiver<ReceiverResult<T>>),
    Ready(Option<ReceiverResult<T>>),
}

/// Completion handle for an operation submitted with an `*_async` method
///
/// Can be `.await`ed from any async runtime, or waited on synchronously with
/// [`ReceiverFuture::blocking_wait`].
#[must_use = "futures do nothing unless awaited or waited on"]
pub struct ReceiverFuture<T> {
    state: FutureState<T>,
}

impl<T> ReceiverFuture<T> {
    pub(crate) fn pending(rx: oneshot::Receiver<ReceiverResult<T>>) -> Self {
        Self {
            state: FutureState::Pending(rx),
        }
    }

    pub(crate) fn ready(result: ReceiverResult<T>) -> Self {
        Self {
            state: FutureState::Ready(Some(result)),
        }
    }

    /// Block the current thread until the operation completes
    ///
    /// Must not be called from inside an async runtime worker.
    pub fn blocking_wait(self) -> ReceiverResult<T> {
        futures::executor::block_on(self)
    }
}

impl<T> Unpin for ReceiverFuture<T> {}

impl<T> Future for ReceiverFuture<T> {
    type Output = ReceiverResult<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.state {
            FutureState::Pending(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(result)) => Poll::Ready(result),
                Poll::Ready(Err(_)) => Poll::Ready(Err(ReceiverError::internal(
                    "background operation was dropped before completing",
                ))),
                Poll::Pending => Poll::Pending,
            },
            FutureState::Ready(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => Poll::Ready(Err(ReceiverError::internal(
                    "receiver future polled after completion",
                ))),
            },
        }
    }
}

impl<T> std::fmt::Debug for ReceiverFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.state {
            FutureState::Pending(_) => "pending",
            FutureState::Ready(_) => "ready",
        };
        f.debug_struct("ReceiverFuture").field("state", &state).finish()
    }
}
