//! Trigger scheduler — arms one trigger per registered campaign and turns
//! page signals and elapsed time into display-candidate fires.
//!
//! Deadline triggers (page-load, time-delay, idle) fire from `tick(now)`;
//! signal triggers (exit-intent, scroll, click) fire from `handle_event`.
//! Exit-intent, scroll, and idle are single-shot per page load; click
//! re-fires on every matching click. Firing only nominates a campaign — the
//! arbiter re-checks eligibility before anything renders.

use chrono::{DateTime, Duration, Utc};
use popup_core::types::{Campaign, TriggerKind};
use popup_core::EngineConfig;
use tracing::{debug, warn};

/// Page signal delivered by the host environment.
///
/// Click selector matching happens in the DOM layer: the host reports which
/// registered selectors the clicked element matched.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    /// Pointer left through the top edge of the viewport.
    PointerLeftTop,
    /// Cumulative scroll depth, as a percentage of the scrollable height.
    Scrolled { depth_percent: u8 },
    /// A click bubbled up; `matched` holds the registered selectors the
    /// target element satisfies.
    Click { matched: Vec<String> },
    /// Any qualifying user activity (mouse, key, touch). Resets idle timers.
    Activity,
}

#[derive(Debug)]
enum ArmedTrigger {
    Timer { deadline: DateTime<Utc> },
    ExitIntent,
    Scroll { threshold_percent: u8 },
    Click { selector: String },
    Idle { quiet_period: Duration, deadline: DateTime<Utc> },
}

#[derive(Debug)]
struct TriggerSlot {
    campaign_id: u64,
    trigger: ArmedTrigger,
    /// Single-shot triggers flip this on first fire and never fire again.
    spent: bool,
}

pub struct TriggerScheduler {
    slots: Vec<TriggerSlot>,
}

/// Feed delays are u64 milliseconds; clamp instead of wrapping so an absurd
/// value parks the deadline in the far future rather than firing at once.
fn clamped_millis(ms: u64) -> Duration {
    Duration::milliseconds(i64::try_from(ms).unwrap_or(i64::MAX))
}

fn deadline_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(delay)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

impl TriggerScheduler {
    /// Arm one trigger per campaign. Campaigns with an unknown trigger kind
    /// are skipped with a warning.
    pub fn new(campaigns: &[Campaign], config: &EngineConfig, now: DateTime<Utc>) -> Self {
        let mut slots = Vec::with_capacity(campaigns.len());
        for campaign in campaigns {
            let trigger = match campaign.trigger {
                TriggerKind::OnPageLoad => ArmedTrigger::Timer {
                    deadline: deadline_after(
                        now,
                        clamped_millis(campaign.delay_ms.unwrap_or(0)),
                    ),
                },
                TriggerKind::OnTimeDelay => ArmedTrigger::Timer {
                    deadline: deadline_after(
                        now,
                        clamped_millis(
                            campaign.delay_ms.unwrap_or(config.default_time_delay_ms),
                        ),
                    ),
                },
                TriggerKind::OnExitIntent => ArmedTrigger::ExitIntent,
                TriggerKind::OnScroll => ArmedTrigger::Scroll {
                    threshold_percent: campaign
                        .scroll_percentage
                        .unwrap_or(config.default_scroll_percent),
                },
                TriggerKind::OnClick => ArmedTrigger::Click {
                    selector: campaign
                        .click_selector
                        .clone()
                        .unwrap_or_else(|| config.default_click_selector.clone()),
                },
                TriggerKind::OnIdle => {
                    let quiet =
                        clamped_millis(campaign.delay_ms.unwrap_or(config.default_idle_ms));
                    ArmedTrigger::Idle {
                        quiet_period: quiet,
                        deadline: deadline_after(now, quiet),
                    }
                }
                TriggerKind::Unknown => {
                    warn!(campaign_id = campaign.id, "unknown trigger kind, not arming");
                    continue;
                }
            };
            debug!(campaign_id = campaign.id, trigger = ?campaign.trigger, "trigger armed");
            slots.push(TriggerSlot {
                campaign_id: campaign.id,
                trigger,
                spent: false,
            });
        }
        Self { slots }
    }

    /// Selectors the host must match clicks against.
    pub fn click_selectors(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter_map(|s| match &s.trigger {
                ArmedTrigger::Click { selector } => Some(selector.clone()),
                _ => None,
            })
            .collect()
    }

    /// Campaigns whose deadline triggers are due. Due timers and idle
    /// periods fire once and are spent.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<u64> {
        let mut fired = Vec::new();
        for slot in self.slots.iter_mut().filter(|s| !s.spent) {
            let due = match &slot.trigger {
                ArmedTrigger::Timer { deadline } => *deadline <= now,
                ArmedTrigger::Idle { deadline, .. } => *deadline <= now,
                _ => false,
            };
            if due {
                slot.spent = true;
                debug!(campaign_id = slot.campaign_id, "deadline trigger fired");
                fired.push(slot.campaign_id);
            }
        }
        fired
    }

    /// Campaigns fired by a page signal. Activity (including scrolls and
    /// clicks) pushes pending idle deadlines forward.
    pub fn handle_event(&mut self, event: &PageEvent, now: DateTime<Utc>) -> Vec<u64> {
        let mut fired = Vec::new();
        match event {
            PageEvent::PointerLeftTop => {
                for slot in self.slots.iter_mut().filter(|s| !s.spent) {
                    if matches!(slot.trigger, ArmedTrigger::ExitIntent) {
                        slot.spent = true;
                        debug!(campaign_id = slot.campaign_id, "exit-intent fired");
                        fired.push(slot.campaign_id);
                    }
                }
            }
            PageEvent::Scrolled { depth_percent } => {
                for slot in self.slots.iter_mut().filter(|s| !s.spent) {
                    if let ArmedTrigger::Scroll { threshold_percent } = slot.trigger {
                        if *depth_percent >= threshold_percent {
                            slot.spent = true;
                            debug!(
                                campaign_id = slot.campaign_id,
                                depth_percent, "scroll threshold fired"
                            );
                            fired.push(slot.campaign_id);
                        }
                    }
                }
                self.reset_idle(now);
            }
            PageEvent::Click { matched } => {
                for slot in self.slots.iter_mut() {
                    if let ArmedTrigger::Click { selector } = &slot.trigger {
                        if matched.iter().any(|m| m == selector) {
                            debug!(campaign_id = slot.campaign_id, "click trigger fired");
                            fired.push(slot.campaign_id);
                        }
                    }
                }
                self.reset_idle(now);
            }
            PageEvent::Activity => self.reset_idle(now),
        }
        fired
    }

    fn reset_idle(&mut self, now: DateTime<Utc>) {
        for slot in self.slots.iter_mut().filter(|s| !s.spent) {
            if let ArmedTrigger::Idle {
                quiet_period,
                deadline,
            } = &mut slot.trigger
            {
                *deadline = deadline_after(now, *quiet_period);
            }
        }
    }
}
