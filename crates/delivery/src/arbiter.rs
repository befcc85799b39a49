//! Display arbiter — serializes popup presentation so at most one is
//! visible at a time. Requests arriving while the slot is occupied queue up
//! and retry on a backoff; eligibility is re-checked at every attempt, and
//! the display record is written before any markup is produced.

use crate::frequency::FrequencyLedger;
use crate::targeting::is_eligible;
use chrono::{DateTime, Utc};
use popup_core::types::{Campaign, PageContext};
use popup_core::RetryPolicy;
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub enum DisplayOutcome {
    /// Accepted: the record is written and the popup should be mounted.
    Shown { campaign_id: u64, markup: String },
    /// Another popup holds the slot; the request will retry.
    Queued { campaign_id: u64 },
    /// Dropped: failed the fire-time eligibility re-check or ran out of
    /// retry attempts.
    Discarded { campaign_id: u64 },
}

#[derive(Debug)]
struct PendingDisplay {
    campaign_id: u64,
    next_attempt_at: DateTime<Utc>,
    attempts: u32,
}

pub struct DisplayArbiter {
    visible: Option<u64>,
    queue: VecDeque<PendingDisplay>,
    retry: RetryPolicy,
}

impl DisplayArbiter {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            visible: None,
            queue: VecDeque::new(),
            retry,
        }
    }

    /// Campaign currently holding the display slot.
    pub fn visible(&self) -> Option<u64> {
        self.visible
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_queued(&self, campaign_id: u64) -> bool {
        self.queue.iter().any(|p| p.campaign_id == campaign_id)
    }

    /// Ask to display a fired campaign now.
    pub fn request_display(
        &mut self,
        campaign: &Campaign,
        ctx: &PageContext,
        ledger: &mut FrequencyLedger,
        now: DateTime<Utc>,
    ) -> DisplayOutcome {
        if self.visible.is_some() {
            // Already on screen or already waiting: nothing new to queue.
            if self.visible == Some(campaign.id) || self.is_queued(campaign.id) {
                debug!(campaign_id = campaign.id, "duplicate display request dropped");
                return DisplayOutcome::Discarded {
                    campaign_id: campaign.id,
                };
            }
            let delay = self
                .retry
                .delay_for(1)
                .unwrap_or_else(chrono::Duration::zero);
            debug!(campaign_id = campaign.id, "slot occupied, queuing display request");
            self.queue.push_back(PendingDisplay {
                campaign_id: campaign.id,
                next_attempt_at: now + delay,
                attempts: 1,
            });
            return DisplayOutcome::Queued {
                campaign_id: campaign.id,
            };
        }
        self.show(campaign, ctx, ledger, now)
    }

    /// Retry queued requests whose backoff has elapsed, in arrival order.
    pub fn tick(
        &mut self,
        campaigns: &HashMap<u64, Campaign>,
        ctx: &PageContext,
        ledger: &mut FrequencyLedger,
        now: DateTime<Utc>,
    ) -> Vec<DisplayOutcome> {
        let mut outcomes = Vec::new();
        let mut requeue = VecDeque::new();

        while let Some(mut pending) = self.queue.pop_front() {
            if pending.next_attempt_at > now {
                requeue.push_back(pending);
                continue;
            }
            if self.visible.is_some() {
                pending.attempts += 1;
                match self.retry.delay_for(pending.attempts) {
                    Some(delay) => {
                        pending.next_attempt_at = now + delay;
                        requeue.push_back(pending);
                    }
                    None => {
                        info!(
                            campaign_id = pending.campaign_id,
                            attempts = pending.attempts,
                            "display retries exhausted"
                        );
                        outcomes.push(DisplayOutcome::Discarded {
                            campaign_id: pending.campaign_id,
                        });
                    }
                }
                continue;
            }
            match campaigns.get(&pending.campaign_id) {
                Some(campaign) => outcomes.push(self.show(campaign, ctx, ledger, now)),
                None => outcomes.push(DisplayOutcome::Discarded {
                    campaign_id: pending.campaign_id,
                }),
            }
        }

        self.queue = requeue;
        outcomes
    }

    /// Release the slot after the popup is dismissed. Returns false when the
    /// campaign was not the visible one.
    pub fn close(&mut self, campaign_id: u64) -> bool {
        if self.visible == Some(campaign_id) {
            self.visible = None;
            debug!(campaign_id, "display slot released");
            true
        } else {
            false
        }
    }

    fn show(
        &mut self,
        campaign: &Campaign,
        ctx: &PageContext,
        ledger: &mut FrequencyLedger,
        now: DateTime<Utc>,
    ) -> DisplayOutcome {
        // Fire-time re-check: the cap may have been consumed since arming.
        if !is_eligible(campaign, ctx, ledger, now) {
            debug!(campaign_id = campaign.id, "ineligible at display time, discarding");
            return DisplayOutcome::Discarded {
                campaign_id: campaign.id,
            };
        }

        // Record before render: a crash mid-render must not cause a repeat.
        ledger.record_display(campaign.id, now);
        let markup = popup_render::render_content(&campaign.content);
        self.visible = Some(campaign.id);
        info!(campaign_id = campaign.id, name = %campaign.name, "popup displayed");

        DisplayOutcome::Shown {
            campaign_id: campaign.id,
            markup,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use popup_core::types::{CampaignKind, DeviceClass, FrequencyPolicy, TriggerKind};
    use popup_core::MemoryStore;
    use serde_json::json;

    fn campaign(id: u64, frequency: FrequencyPolicy) -> Campaign {
        Campaign {
            id,
            name: format!("c{id}"),
            kind: CampaignKind::Message,
            content: json!([{"type": "text", "text": format!("popup {id}")}]),
            trigger: TriggerKind::OnPageLoad,
            delay_ms: None,
            scroll_percentage: None,
            click_selector: None,
            frequency,
            show_on_mobile: true,
            show_on_desktop: true,
            targeting_rules: None,
        }
    }

    fn ctx() -> PageContext {
        PageContext {
            url: "https://x.test/".to_string(),
            referrer: String::new(),
            device: DeviceClass::Desktop,
        }
    }

    fn ledger() -> FrequencyLedger {
        FrequencyLedger::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    fn campaign_map(campaigns: &[Campaign]) -> HashMap<u64, Campaign> {
        campaigns.iter().map(|c| (c.id, c.clone())).collect()
    }

    #[test]
    fn test_first_request_shows_immediately() {
        let mut arbiter = DisplayArbiter::new(RetryPolicy::unbounded(2000));
        let mut ledger = ledger();
        let c = campaign(1, FrequencyPolicy::EveryVisit);
        let now = Utc::now();

        match arbiter.request_display(&c, &ctx(), &mut ledger, now) {
            DisplayOutcome::Shown { campaign_id, markup } => {
                assert_eq!(campaign_id, 1);
                assert!(markup.contains("popup 1"));
            }
            other => panic!("expected Shown, got {other:?}"),
        }
        assert_eq!(arbiter.visible(), Some(1));
    }

    #[test]
    fn test_second_request_queues_until_close() {
        let mut arbiter = DisplayArbiter::new(RetryPolicy::unbounded(2000));
        let mut ledger = ledger();
        let ctx = ctx();
        let a = campaign(1, FrequencyPolicy::EveryVisit);
        let b = campaign(2, FrequencyPolicy::EveryVisit);
        let map = campaign_map(&[a.clone(), b.clone()]);
        let now = Utc::now();

        assert!(matches!(
            arbiter.request_display(&a, &ctx, &mut ledger, now),
            DisplayOutcome::Shown { .. }
        ));
        assert!(matches!(
            arbiter.request_display(&b, &ctx, &mut ledger, now),
            DisplayOutcome::Queued { campaign_id: 2 }
        ));
        assert_eq!(arbiter.queued_len(), 1);

        // Backoff elapsed but slot still occupied: stays queued.
        let later = now + Duration::milliseconds(2000);
        assert!(arbiter
            .tick(&map, &ctx, &mut ledger, later)
            .is_empty());
        assert_eq!(arbiter.queued_len(), 1);

        assert!(arbiter.close(1));
        let outcomes = arbiter.tick(&map, &ctx, &mut ledger, later + Duration::milliseconds(2000));
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            outcomes[0],
            DisplayOutcome::Shown { campaign_id: 2, .. }
        ));
        assert_eq!(arbiter.visible(), Some(2));
        assert_eq!(arbiter.queued_len(), 0);
    }

    #[test]
    fn test_record_written_even_if_render_output_unused() {
        let mut arbiter = DisplayArbiter::new(RetryPolicy::unbounded(2000));
        let mut ledger = ledger();
        let c = campaign(1, FrequencyPolicy::OnceEver);
        let now = Utc::now();

        arbiter.request_display(&c, &ctx(), &mut ledger, now);
        assert!(ledger.shown_ever(1));
        assert!(ledger.shown_this_session(1).unwrap());
    }

    #[test]
    fn test_queued_request_discarded_when_cap_consumed_meanwhile() {
        let mut arbiter = DisplayArbiter::new(RetryPolicy::unbounded(2000));
        let mut ledger = ledger();
        let ctx = ctx();
        let a = campaign(1, FrequencyPolicy::EveryVisit);
        let b = campaign(2, FrequencyPolicy::OncePerSession);
        let map = campaign_map(&[a.clone(), b.clone()]);
        let now = Utc::now();

        arbiter.request_display(&a, &ctx, &mut ledger, now);
        arbiter.request_display(&b, &ctx, &mut ledger, now);

        // The cap for campaign 2 gets consumed while it waits.
        ledger.record_display(2, now);
        arbiter.close(1);

        let outcomes = arbiter.tick(&map, &ctx, &mut ledger, now + Duration::milliseconds(2000));
        assert_eq!(
            outcomes,
            vec![DisplayOutcome::Discarded { campaign_id: 2 }]
        );
        assert_eq!(arbiter.visible(), None);
    }

    #[test]
    fn test_bounded_retries_exhaust() {
        let mut arbiter = DisplayArbiter::new(RetryPolicy::bounded(1000, 2));
        let mut ledger = ledger();
        let ctx = ctx();
        let a = campaign(1, FrequencyPolicy::EveryVisit);
        let b = campaign(2, FrequencyPolicy::EveryVisit);
        let map = campaign_map(&[a.clone(), b.clone()]);
        let now = Utc::now();

        arbiter.request_display(&a, &ctx, &mut ledger, now);
        arbiter.request_display(&b, &ctx, &mut ledger, now);

        // Attempt 2 while the slot is still held.
        let t1 = now + Duration::milliseconds(1000);
        assert!(arbiter.tick(&map, &ctx, &mut ledger, t1).is_empty());
        // Attempt 3 exceeds max_attempts = 2.
        let t2 = t1 + Duration::milliseconds(1000);
        let outcomes = arbiter.tick(&map, &ctx, &mut ledger, t2);
        assert_eq!(
            outcomes,
            vec![DisplayOutcome::Discarded { campaign_id: 2 }]
        );
        assert_eq!(arbiter.queued_len(), 0);
    }

    #[test]
    fn test_duplicate_request_while_queued_is_dropped() {
        let mut arbiter = DisplayArbiter::new(RetryPolicy::unbounded(2000));
        let mut ledger = ledger();
        let ctx = ctx();
        let a = campaign(1, FrequencyPolicy::EveryVisit);
        let b = campaign(2, FrequencyPolicy::EveryVisit);
        let now = Utc::now();

        arbiter.request_display(&a, &ctx, &mut ledger, now);
        arbiter.request_display(&b, &ctx, &mut ledger, now);
        assert!(matches!(
            arbiter.request_display(&b, &ctx, &mut ledger, now),
            DisplayOutcome::Discarded { campaign_id: 2 }
        ));
        assert_eq!(arbiter.queued_len(), 1);
    }

    #[test]
    fn test_close_of_non_visible_campaign_is_ignored() {
        let mut arbiter = DisplayArbiter::new(RetryPolicy::unbounded(2000));
        let mut ledger = ledger();
        let c = campaign(1, FrequencyPolicy::EveryVisit);
        arbiter.request_display(&c, &ctx(), &mut ledger, Utc::now());
        assert!(!arbiter.close(99));
        assert_eq!(arbiter.visible(), Some(1));
    }
}
