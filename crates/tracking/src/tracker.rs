//! Event tracker — captures engagement events, batches them, and flushes to
//! the ingestion endpoints. At-least-once: failed batches return to the head
//! of the queue, and critical events get an extra immediate send whose
//! duplicate delivery is accepted.

use crate::events::{TrackingBatch, TrackingEvent, TrackingEventType};
use crate::transport::{SendOutcome, TrackingTransport};
use chrono::{DateTime, Duration, Utc};
use popup_core::types::PageContext;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct EventTracker {
    tenant_id: u64,
    transport: Arc<dyn TrackingTransport>,
    queue: VecDeque<TrackingEvent>,
    flush_interval: Duration,
    next_flush_at: DateTime<Utc>,
}

impl EventTracker {
    pub fn new(
        tenant_id: u64,
        transport: Arc<dyn TrackingTransport>,
        flush_interval_ms: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let flush_interval = Duration::milliseconds(flush_interval_ms as i64);
        Self {
            tenant_id,
            transport,
            queue: VecDeque::new(),
            flush_interval,
            next_flush_at: now + flush_interval,
        }
    }

    /// Record an event. Enriches metadata with the current URL, referrer,
    /// and client timestamp, then enqueues for the next batch flush. Click
    /// and conversion events also get one immediate best-effort send; its
    /// failure is logged, never retried inline.
    pub fn track(
        &mut self,
        event_type: TrackingEventType,
        campaign_id: u64,
        mut metadata: HashMap<String, serde_json::Value>,
        conversion_data: Option<HashMap<String, serde_json::Value>>,
        ctx: &PageContext,
        now: DateTime<Utc>,
    ) {
        let variation_id = metadata
            .get("variationId")
            .and_then(|v| v.as_str())
            .map(str::to_string);
        metadata.insert("url".to_string(), serde_json::json!(ctx.url));
        metadata.insert("referrer".to_string(), serde_json::json!(ctx.referrer));
        metadata.insert(
            "timestamp".to_string(),
            serde_json::json!(now.timestamp_millis()),
        );

        let event = TrackingEvent {
            id: Uuid::new_v4(),
            tenant_id: self.tenant_id,
            campaign_id,
            variation_id,
            event_type,
            metadata,
            conversion_data,
            timestamp: now.timestamp_millis(),
        };

        debug!(campaign_id, event_type = ?event_type, "tracking event captured");

        if event_type.is_critical() {
            let outcome = self.transport.send_event(&event);
            if !outcome.is_accepted() {
                warn!(campaign_id, ?outcome, "immediate send failed, batch flush will retry");
            }
        }

        self.queue.push_back(event);
    }

    /// Run the flush cycle if its period has elapsed. Swaps the queue for an
    /// empty one, sends the batch, and splices it back to the front on
    /// failure so nothing is dropped on a transient error.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<SendOutcome> {
        if now < self.next_flush_at {
            return None;
        }
        self.next_flush_at = now + self.flush_interval;

        if self.queue.is_empty() {
            return None;
        }

        let events: Vec<TrackingEvent> = std::mem::take(&mut self.queue).into();
        let count = events.len();
        let batch = TrackingBatch {
            tenant_id: self.tenant_id,
            events,
        };

        let outcome = self.transport.send_batch(&batch);
        match &outcome {
            SendOutcome::Accepted { processed, total } => {
                info!(count, processed, total, "tracking batch flushed");
            }
            _ => {
                warn!(count, ?outcome, "batch flush failed, requeueing");
                for event in batch.events.into_iter().rev() {
                    self.queue.push_front(event);
                }
            }
        }
        Some(outcome)
    }

    /// Hand any remaining events to the beacon path on page unload.
    /// Non-blocking, unacknowledged; delivery is not guaranteed.
    pub fn flush_on_unload(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let events: Vec<TrackingEvent> = std::mem::take(&mut self.queue).into();
        debug!(count = events.len(), "unload flush via beacon");
        self.transport.send_beacon(&TrackingBatch {
            tenant_id: self.tenant_id,
            events,
        });
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }
}
