//! Engagement tracking — event capture, batching, and best-effort delivery
//! to the ingestion endpoints with at-least-once semantics.

pub mod events;
pub mod tracker;
pub mod transport;

pub use events::{BatchAck, EventAck, TrackingBatch, TrackingEvent, TrackingEventType};
pub use tracker::EventTracker;
pub use transport::{SendOutcome, TrackingTransport};
