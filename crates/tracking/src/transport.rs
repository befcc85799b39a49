//! Delivery seam for tracking events. The engine never touches the network
//! directly; the host injects a `TrackingTransport` (fetch/XHR bridge, test
//! double, …) and every send returns a typed outcome instead of vanishing
//! into a fire-and-forget call.

use crate::events::{TrackingBatch, TrackingEvent};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// The endpoint acknowledged the payload. Batch sends report how many
    /// events the backend actually processed.
    Accepted { processed: usize, total: usize },
    /// The endpoint answered but refused the payload.
    Rejected(String),
    /// The endpoint could not be reached.
    Unreachable(String),
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SendOutcome::Accepted { .. })
    }
}

pub trait TrackingTransport: Send + Sync {
    fn send_event(&self, event: &TrackingEvent) -> SendOutcome;

    fn send_batch(&self, batch: &TrackingBatch) -> SendOutcome;

    /// Best-effort unload-time send. Must not block; no outcome is observed
    /// (the page is tearing down).
    fn send_beacon(&self, batch: &TrackingBatch);
}

/// Transport that accepts and discards everything. Default when the host
/// does not wire a real backend.
pub struct NoOpTransport;

impl TrackingTransport for NoOpTransport {
    fn send_event(&self, _event: &TrackingEvent) -> SendOutcome {
        SendOutcome::Accepted {
            processed: 1,
            total: 1,
        }
    }

    fn send_batch(&self, batch: &TrackingBatch) -> SendOutcome {
        SendOutcome::Accepted {
            processed: batch.events.len(),
            total: batch.events.len(),
        }
    }

    fn send_beacon(&self, _batch: &TrackingBatch) {}
}

/// In-memory transport that records everything it is handed, for tests.
#[derive(Default)]
pub struct CaptureTransport {
    events: Mutex<Vec<TrackingEvent>>,
    batches: Mutex<Vec<TrackingBatch>>,
    beacons: Mutex<Vec<TrackingBatch>>,
}

impl CaptureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TrackingEvent> {
        self.events.lock().expect("transport mutex poisoned").clone()
    }

    pub fn batches(&self) -> Vec<TrackingBatch> {
        self.batches.lock().expect("transport mutex poisoned").clone()
    }

    pub fn beacons(&self) -> Vec<TrackingBatch> {
        self.beacons.lock().expect("transport mutex poisoned").clone()
    }

    /// All events delivered through any path, in send order.
    pub fn delivered_count(&self) -> usize {
        self.events.lock().expect("transport mutex poisoned").len()
            + self
                .batches
                .lock()
                .expect("transport mutex poisoned")
                .iter()
                .map(|b| b.events.len())
                .sum::<usize>()
    }
}

impl TrackingTransport for CaptureTransport {
    fn send_event(&self, event: &TrackingEvent) -> SendOutcome {
        self.events
            .lock()
            .expect("transport mutex poisoned")
            .push(event.clone());
        SendOutcome::Accepted {
            processed: 1,
            total: 1,
        }
    }

    fn send_batch(&self, batch: &TrackingBatch) -> SendOutcome {
        self.batches
            .lock()
            .expect("transport mutex poisoned")
            .push(batch.clone());
        SendOutcome::Accepted {
            processed: batch.events.len(),
            total: batch.events.len(),
        }
    }

    fn send_beacon(&self, batch: &TrackingBatch) {
        self.beacons
            .lock()
            .expect("transport mutex poisoned")
            .push(batch.clone());
    }
}

/// Transport where every send fails, for retry-path tests.
pub struct FailingTransport;

impl TrackingTransport for FailingTransport {
    fn send_event(&self, _event: &TrackingEvent) -> SendOutcome {
        SendOutcome::Unreachable("connection refused".to_string())
    }

    fn send_batch(&self, _batch: &TrackingBatch) -> SendOutcome {
        SendOutcome::Unreachable("connection refused".to_string())
    }

    fn send_beacon(&self, _batch: &TrackingBatch) {}
}

/// Transport that fails a configured number of batch sends, then recovers.
pub struct FlakyTransport {
    failures_remaining: Mutex<u32>,
    inner: CaptureTransport,
}

impl FlakyTransport {
    pub fn failing_first(failures: u32) -> Self {
        Self {
            failures_remaining: Mutex::new(failures),
            inner: CaptureTransport::new(),
        }
    }

    pub fn delivered_batches(&self) -> Vec<TrackingBatch> {
        self.inner.batches()
    }
}

impl TrackingTransport for FlakyTransport {
    fn send_event(&self, event: &TrackingEvent) -> SendOutcome {
        self.inner.send_event(event)
    }

    fn send_batch(&self, batch: &TrackingBatch) -> SendOutcome {
        let mut remaining = self
            .failures_remaining
            .lock()
            .expect("transport mutex poisoned");
        if *remaining > 0 {
            *remaining -= 1;
            return SendOutcome::Unreachable("transient failure".to_string());
        }
        self.inner.send_batch(batch)
    }

    fn send_beacon(&self, batch: &TrackingBatch) {
        self.inner.send_beacon(batch)
    }
}

/// Convenience: shared no-op transport.
pub fn noop_transport() -> Arc<dyn TrackingTransport> {
    Arc::new(NoOpTransport)
}

/// Convenience: shared capture transport for tests.
pub fn capture_transport() -> Arc<CaptureTransport> {
    Arc::new(CaptureTransport::new())
}
