use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters shared by the queue, the dispatch consumer and the public API
#[derive(Debug, Default)]
pub(crate) struct ReceiverCounters {
    pub received: AtomicU64,
    pub dropped: AtomicU64,
    pub delivered: AtomicU64,
    pub acknowledged: AtomicU64,
    pub handler_failures: AtomicU64,
    pub ingress_pauses: AtomicU64,
    pub ingress_resumes: AtomicU64,
    pub discarded_on_shutdown: AtomicU64,
}

impl ReceiverCounters {
    pub fn increment(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, value: u64) {
        counter.fetch_add(value, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReceiverStats {
        ReceiverStats {
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            ingress_pauses: self.ingress_pauses.load(Ordering::Relaxed),
            ingress_resumes: self.ingress_resumes.load(Ordering::Relaxed),
            discarded_on_shutdown: self.discarded_on_shutdown.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time statistics about a receiver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiverStats {
    /// Messages accepted from the transport into the inbound queue
    pub received: u64,
    /// Messages handed back to the transport because the receiver was not live
    pub dropped: u64,
    /// Messages handed to the application (sync or async)
    pub delivered: u64,
    pub acknowledged: u64,
    pub handler_failures: u64,
    pub ingress_pauses: u64,
    pub ingress_resumes: u64,
    /// Messages still queued when the receiver terminated
    pub discarded_on_shutdown: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let counters = ReceiverCounters::default();
        ReceiverCounters::increment(&counters.received);
        ReceiverCounters::increment(&counters.received);
        ReceiverCounters::add(&counters.discarded_on_shutdown, 3);

        let stats = counters.snapshot();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.discarded_on_shutdown, 3);
        assert_eq!(stats.acknowledged, 0);
    }
}
