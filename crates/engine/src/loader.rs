//! Bootstrap — campaign feed parsing, API base-URL resolution, and session
//! assembly with injectable storage and transport.

use crate::session::EngineSession;
use chrono::{DateTime, Utc};
use popup_core::types::{Campaign, CampaignFeed, PageContext};
use popup_core::{EngineConfig, KeyValueStore, MemoryStore, PopupResult, RetryPolicy};
use popup_delivery::arbiter::DisplayArbiter;
use popup_delivery::frequency::FrequencyLedger;
use popup_delivery::scheduler::TriggerScheduler;
use popup_delivery::targeting::is_eligible;
use popup_tracking::tracker::EventTracker;
use popup_tracking::transport::{noop_transport, TrackingTransport};
use std::sync::Arc;
use tracing::{info, warn};
use url::Url;

/// Parse the tenant campaign feed. Individual campaigns that fail to decode
/// are dropped with a warning; the feed itself must be valid JSON.
pub fn parse_campaign_feed(json: &str) -> PopupResult<(u64, Vec<Campaign>)> {
    let feed: CampaignFeed = serde_json::from_str(json)?;
    let mut campaigns = Vec::with_capacity(feed.campaigns.len());
    for entry in feed.campaigns {
        match serde_json::from_value::<Campaign>(entry) {
            Ok(campaign) => campaigns.push(campaign),
            Err(e) => warn!(error = %e, "dropping malformed campaign entry"),
        }
    }
    info!(
        tenant_id = feed.tenant_id,
        count = campaigns.len(),
        "campaign feed parsed"
    );
    Ok((feed.tenant_id, campaigns))
}

/// Resolve the API base URL: an explicit `data-api-url` attribute on the
/// loading script tag wins, then the origin the script was loaded from,
/// then the page's own origin.
pub fn resolve_base_url(
    data_api_url: Option<&str>,
    script_src: Option<&str>,
    page_origin: &str,
) -> String {
    if let Some(attr) = data_api_url {
        let attr = attr.trim();
        if !attr.is_empty() {
            return attr.trim_end_matches('/').to_string();
        }
    }
    if let Some(src) = script_src {
        if let Ok(parsed) = Url::parse(src) {
            let origin = parsed.origin();
            if let url::Origin::Tuple(..) = origin {
                return origin.ascii_serialization();
            }
        }
    }
    page_origin.trim_end_matches('/').to_string()
}

/// Assembles an [`EngineSession`] from the campaign feed, with defaults for
/// every injectable piece.
pub struct Bootstrap {
    tenant_id: u64,
    campaigns: Vec<Campaign>,
    ctx: PageContext,
    config: EngineConfig,
    session_store: Box<dyn KeyValueStore>,
    persistent_store: Box<dyn KeyValueStore>,
    transport: Arc<dyn TrackingTransport>,
}

impl Bootstrap {
    pub fn new(tenant_id: u64, campaigns: Vec<Campaign>, ctx: PageContext) -> Self {
        Self {
            tenant_id,
            campaigns,
            ctx,
            config: EngineConfig::default(),
            session_store: Box::new(MemoryStore::new()),
            persistent_store: Box::new(MemoryStore::new()),
            transport: noop_transport(),
        }
    }

    /// Build directly from the feed JSON returned by the tenant-script
    /// endpoint.
    pub fn from_feed_json(json: &str, ctx: PageContext) -> PopupResult<Self> {
        let (tenant_id, campaigns) = parse_campaign_feed(json)?;
        Ok(Self::new(tenant_id, campaigns, ctx))
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_session_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.session_store = store;
        self
    }

    pub fn with_persistent_store(mut self, store: Box<dyn KeyValueStore>) -> Self {
        self.persistent_store = store;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn TrackingTransport>) -> Self {
        self.transport = transport;
        self
    }

    /// Resolved `(event, batch)` ingestion URLs. The host's transport bridge
    /// posts to these; the engine itself never touches the network.
    pub fn tracking_endpoints(&self) -> (String, String) {
        (self.config.event_endpoint(), self.config.batch_endpoint())
    }

    /// Evaluate setup-time eligibility, arm triggers, and start the session.
    /// Eligibility is re-checked at fire time; this pass only avoids arming
    /// listeners for campaigns that can never show on this page.
    pub fn start(self, now: DateTime<Utc>) -> EngineSession {
        let ledger = FrequencyLedger::new(self.session_store, self.persistent_store);

        let armed: Vec<Campaign> = self
            .campaigns
            .iter()
            .filter(|c| is_eligible(c, &self.ctx, &ledger, now))
            .cloned()
            .collect();
        info!(
            tenant_id = self.tenant_id,
            total = self.campaigns.len(),
            armed = armed.len(),
            "engine session starting"
        );

        let scheduler = TriggerScheduler::new(&armed, &self.config, now);
        let retry = RetryPolicy {
            base_backoff_ms: self.config.arbiter_retry_ms,
            max_attempts: self.config.arbiter_max_attempts,
        };
        let arbiter = DisplayArbiter::new(retry);
        let tracker = EventTracker::new(
            self.tenant_id,
            self.transport,
            self.config.batch_interval_ms,
            now,
        );
        let campaigns = self.campaigns.into_iter().map(|c| (c.id, c)).collect();

        EngineSession::new(self.ctx, campaigns, scheduler, arbiter, ledger, tracker)
    }
}
