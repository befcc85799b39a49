//! Tracking event wire types for the `/api/tracking/*` ingestion endpoints.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TrackingEventType {
    Impression,
    Click,
    Conversion,
    Close,
}

impl TrackingEventType {
    /// Click and conversion events also get an immediate best-effort send
    /// ahead of the batch cycle.
    pub fn is_critical(&self) -> bool {
        matches!(self, TrackingEventType::Click | TrackingEventType::Conversion)
    }
}

/// One recorded user interaction. Timestamps are epoch milliseconds to match
/// the ingestion contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingEvent {
    pub id: Uuid,
    pub tenant_id: u64,
    pub campaign_id: u64,
    #[serde(default)]
    pub variation_id: Option<String>,
    pub event_type: TrackingEventType,
    /// Free-form map; always carries `url`, `referrer`, and `timestamp`.
    pub metadata: HashMap<String, serde_json::Value>,
    /// Present only for conversion events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversion_data: Option<HashMap<String, serde_json::Value>>,
    pub timestamp: i64,
}

/// Body of `POST /api/tracking/batch`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingBatch {
    pub tenant_id: u64,
    pub events: Vec<TrackingEvent>,
}

/// Acknowledgement of a single-event send.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventAck {
    pub success: bool,
}

/// Acknowledgement of a batch send; partial processing is reported, not an
/// error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchAck {
    pub success: bool,
    pub processed: usize,
    pub total: usize,
}
