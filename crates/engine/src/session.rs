//! Per-page-view engine session — the explicit, injected replacement for a
//! global manager object. Owns the campaign list, scheduler, arbiter,
//! frequency ledger, and tracker, and turns page events and time into
//! display commands for the host.

use chrono::{DateTime, Utc};
use popup_core::types::{Campaign, PageContext};
use popup_delivery::arbiter::{DisplayArbiter, DisplayOutcome};
use popup_delivery::frequency::FrequencyLedger;
use popup_delivery::scheduler::{PageEvent, TriggerScheduler};
use popup_tracking::tracker::EventTracker;
use popup_tracking::TrackingEventType;
use std::collections::HashMap;
use tracing::debug;

/// Instruction for the host's DOM layer.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    /// Mount the rendered popup markup (overlay, close button, and event
    /// listeners are the host's concern).
    Mount { campaign_id: u64, markup: String },
    /// Remove the popup from the page.
    Unmount { campaign_id: u64 },
}

pub struct EngineSession {
    ctx: PageContext,
    campaigns: HashMap<u64, Campaign>,
    scheduler: TriggerScheduler,
    arbiter: DisplayArbiter,
    ledger: FrequencyLedger,
    tracker: EventTracker,
}

impl EngineSession {
    /// Assembled by [`crate::loader::Bootstrap`]; not meant to be built by
    /// hand outside of tests.
    pub fn new(
        ctx: PageContext,
        campaigns: HashMap<u64, Campaign>,
        scheduler: TriggerScheduler,
        arbiter: DisplayArbiter,
        ledger: FrequencyLedger,
        tracker: EventTracker,
    ) -> Self {
        Self {
            ctx,
            campaigns,
            scheduler,
            arbiter,
            ledger,
            tracker,
        }
    }

    /// Feed a page signal into the engine.
    pub fn handle_event(&mut self, event: &PageEvent, now: DateTime<Utc>) -> Vec<EngineCommand> {
        let fired = self.scheduler.handle_event(event, now);
        self.dispatch_fired(fired, now)
    }

    /// Advance time: due trigger deadlines, arbiter retries, and the batch
    /// flush cycle. The host calls this on its timer heartbeat.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<EngineCommand> {
        let fired = self.scheduler.tick(now);
        let mut commands = self.dispatch_fired(fired, now);

        let retried = self
            .arbiter
            .tick(&self.campaigns, &self.ctx, &mut self.ledger, now);
        for outcome in retried {
            if let Some(command) = self.finish_outcome(outcome, now) {
                commands.push(command);
            }
        }

        self.tracker.tick(now);
        commands
    }

    /// The user dismissed the popup (close button or backdrop).
    pub fn close_popup(&mut self, campaign_id: u64, now: DateTime<Utc>) -> Vec<EngineCommand> {
        if !self.arbiter.close(campaign_id) {
            debug!(campaign_id, "close for a popup that is not visible");
            return Vec::new();
        }
        self.tracker.track(
            TrackingEventType::Close,
            campaign_id,
            HashMap::from([("userInitiated".to_string(), serde_json::json!(true))]),
            None,
            &self.ctx,
            now,
        );
        vec![EngineCommand::Unmount { campaign_id }]
    }

    /// A CTA inside the visible popup was clicked.
    pub fn popup_clicked(
        &mut self,
        campaign_id: u64,
        metadata: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        self.tracker
            .track(TrackingEventType::Click, campaign_id, metadata, None, &self.ctx, now);
    }

    /// A form inside the visible popup was submitted.
    pub fn popup_converted(
        &mut self,
        campaign_id: u64,
        metadata: HashMap<String, serde_json::Value>,
        form_data: HashMap<String, serde_json::Value>,
        now: DateTime<Utc>,
    ) {
        self.tracker.track(
            TrackingEventType::Conversion,
            campaign_id,
            metadata,
            Some(form_data),
            &self.ctx,
            now,
        );
    }

    /// Final best-effort flush when the page unloads.
    pub fn handle_unload(&mut self) {
        self.tracker.flush_on_unload();
    }

    /// Selectors the host must match click targets against before reporting
    /// [`PageEvent::Click`].
    pub fn click_selectors(&self) -> Vec<String> {
        self.scheduler.click_selectors()
    }

    /// Campaign currently holding the display slot.
    pub fn visible_popup(&self) -> Option<u64> {
        self.arbiter.visible()
    }

    /// Display requests waiting for the slot.
    pub fn queued_displays(&self) -> usize {
        self.arbiter.queued_len()
    }

    /// Tracking events awaiting the next batch flush.
    pub fn queued_events(&self) -> usize {
        self.tracker.queued_len()
    }

    fn dispatch_fired(&mut self, fired: Vec<u64>, now: DateTime<Utc>) -> Vec<EngineCommand> {
        let mut commands = Vec::new();
        for campaign_id in fired {
            let Some(campaign) = self.campaigns.get(&campaign_id) else {
                continue;
            };
            let outcome =
                self.arbiter
                    .request_display(campaign, &self.ctx, &mut self.ledger, now);
            if let Some(command) = self.finish_outcome(outcome, now) {
                commands.push(command);
            }
        }
        commands
    }

    fn finish_outcome(
        &mut self,
        outcome: DisplayOutcome,
        now: DateTime<Utc>,
    ) -> Option<EngineCommand> {
        match outcome {
            DisplayOutcome::Shown { campaign_id, markup } => {
                let mut metadata = HashMap::new();
                if let Some(campaign) = self.campaigns.get(&campaign_id) {
                    metadata.insert(
                        "popupName".to_string(),
                        serde_json::json!(campaign.name),
                    );
                    metadata.insert(
                        "trigger".to_string(),
                        serde_json::json!(campaign.trigger),
                    );
                }
                self.tracker.track(
                    TrackingEventType::Impression,
                    campaign_id,
                    metadata,
                    None,
                    &self.ctx,
                    now,
                );
                Some(EngineCommand::Mount { campaign_id, markup })
            }
            DisplayOutcome::Queued { campaign_id } => {
                debug!(campaign_id, "display request queued behind visible popup");
                None
            }
            DisplayOutcome::Discarded { campaign_id } => {
                debug!(campaign_id, "display request discarded");
                None
            }
        }
    }
}
