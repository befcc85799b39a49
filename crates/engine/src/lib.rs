//! Client-side popup delivery engine — trigger scheduling, frequency
//! capping, single-slot display arbitration, and engagement tracking for a
//! tenant's published campaigns.
//!
//! The engine is deterministic and free of IO: the embedding host feeds
//! page events and the current time into an [`EngineSession`] and executes
//! the [`EngineCommand`]s it returns. Storage and the tracking backend are
//! reached only through injected interfaces.
//!
//! # Modules
//!
//! - [`loader`] — campaign feed parsing, base-URL resolution, bootstrap
//! - [`session`] — the per-page-view session driving all components

pub mod loader;
pub mod session;

pub use loader::{parse_campaign_feed, resolve_base_url, Bootstrap};
pub use session::{EngineCommand, EngineSession};
