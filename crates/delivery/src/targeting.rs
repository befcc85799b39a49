//! Targeting evaluator — pure eligibility decision for one campaign against
//! the current page, device, and frequency records.

use crate::frequency::FrequencyLedger;
use chrono::{DateTime, Utc};
use popup_core::types::{Campaign, FrequencyPolicy, PageContext};
use tracing::debug;

/// Decide whether `campaign` may be displayed right now. Safe to call
/// repeatedly; checks short-circuit in order: device, URL targeting,
/// frequency. Malformed targeting rules pass; storage read failures on
/// frequency checks fail closed.
pub fn is_eligible(
    campaign: &Campaign,
    ctx: &PageContext,
    ledger: &FrequencyLedger,
    now: DateTime<Utc>,
) -> bool {
    if ctx.is_mobile() {
        if !campaign.show_on_mobile {
            debug!(campaign_id = campaign.id, "blocked: mobile not allowed");
            return false;
        }
    } else if !campaign.show_on_desktop {
        debug!(campaign_id = campaign.id, "blocked: desktop not allowed");
        return false;
    }

    if !url_targeting_passes(campaign, &ctx.url) {
        return false;
    }

    frequency_allows(campaign, ledger, now)
}

fn url_targeting_passes(campaign: &Campaign, current_url: &str) -> bool {
    let Some(raw_rules) = campaign.targeting_rules.as_deref() else {
        return true;
    };
    let rules: serde_json::Value = match serde_json::from_str(raw_rules) {
        Ok(v) => v,
        Err(e) => {
            debug!(campaign_id = campaign.id, error = %e, "unparseable targeting rules, passing");
            return true;
        }
    };
    let Some(url_targeting) = rules.get("urlTargeting").and_then(|v| v.as_str()) else {
        return true;
    };

    let tokens: Vec<&str> = url_targeting
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect();

    let mut has_inclusion = false;
    let mut included = false;
    for token in &tokens {
        if let Some(excluded) = token.strip_prefix('!') {
            // An exclusion match vetoes the campaign outright.
            if current_url.contains(excluded) {
                debug!(campaign_id = campaign.id, token, "blocked: URL excluded");
                return false;
            }
        } else {
            has_inclusion = true;
            if current_url.contains(token) {
                included = true;
            }
        }
    }

    if has_inclusion && !included {
        debug!(campaign_id = campaign.id, "blocked: URL matches no inclusion token");
        return false;
    }
    true
}

fn frequency_allows(campaign: &Campaign, ledger: &FrequencyLedger, now: DateTime<Utc>) -> bool {
    match campaign.frequency {
        FrequencyPolicy::EveryVisit => true,
        FrequencyPolicy::OncePerSession => match ledger.shown_this_session(campaign.id) {
            Ok(shown) => !shown,
            Err(e) => {
                debug!(campaign_id = campaign.id, error = %e, "session store unreadable, blocking");
                false
            }
        },
        FrequencyPolicy::OncePerDay
        | FrequencyPolicy::OncePerWeek
        | FrequencyPolicy::OncePerMonth => match ledger.last_shown(campaign.id) {
            Ok(None) => true,
            Ok(Some(last)) => {
                // window_ms is Some for every windowed policy.
                let window = campaign.frequency.window_ms().unwrap_or(i64::MAX);
                (now - last).num_milliseconds() > window
            }
            Err(e) => {
                debug!(campaign_id = campaign.id, error = %e, "persistent store unreadable, blocking");
                false
            }
        },
        FrequencyPolicy::OnceEver => !ledger.shown_ever(campaign.id),
        FrequencyPolicy::Other => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use popup_core::types::{CampaignKind, DeviceClass, TriggerKind};
    use popup_core::{DeniedStore, MemoryStore};

    fn campaign(frequency: FrequencyPolicy) -> Campaign {
        Campaign {
            id: 42,
            name: "test".to_string(),
            kind: CampaignKind::Message,
            content: serde_json::Value::Null,
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

    fn desktop_ctx(url: &str) -> PageContext {
        PageContext {
            url: url.to_string(),
            referrer: String::new(),
            device: DeviceClass::Desktop,
        }
    }

    fn ledger() -> FrequencyLedger {
        FrequencyLedger::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    #[test]
    fn test_device_targeting() {
        let ledger = ledger();
        let now = Utc::now();
        let mut c = campaign(FrequencyPolicy::EveryVisit);
        c.show_on_desktop = false;
        assert!(!is_eligible(&c, &desktop_ctx("https://x.test/"), &ledger, now));

        let mobile_ctx = PageContext {
            device: DeviceClass::Mobile,
            ..desktop_ctx("https://x.test/")
        };
        assert!(is_eligible(&c, &mobile_ctx, &ledger, now));

        c.show_on_mobile = false;
        assert!(!is_eligible(&c, &mobile_ctx, &ledger, now));
    }

    #[test]
    fn test_exclusion_token_vetoes() {
        let ledger = ledger();
        let mut c = campaign(FrequencyPolicy::EveryVisit);
        c.targeting_rules = Some(r#"{"urlTargeting": "!/checkout"}"#.to_string());
        assert!(!is_eligible(
            &c,
            &desktop_ctx("https://shop.test/checkout/step1"),
            &ledger,
            Utc::now()
        ));
        assert!(is_eligible(
            &c,
            &desktop_ctx("https://shop.test/products"),
            &ledger,
            Utc::now()
        ));
    }

    #[test]
    fn test_exclusion_beats_inclusion() {
        let ledger = ledger();
        let mut c = campaign(FrequencyPolicy::EveryVisit);
        c.targeting_rules =
            Some(r#"{"urlTargeting": "/shop, !/checkout"}"#.to_string());
        assert!(!is_eligible(
            &c,
            &desktop_ctx("https://x.test/shop/checkout"),
            &ledger,
            Utc::now()
        ));
    }

    #[test]
    fn test_inclusion_tokens_require_a_match() {
        let ledger = ledger();
        let mut c = campaign(FrequencyPolicy::EveryVisit);
        c.targeting_rules = Some(r#"{"urlTargeting": "/blog"}"#.to_string());
        assert!(is_eligible(
            &c,
            &desktop_ctx("https://x.test/blog/post-1"),
            &ledger,
            Utc::now()
        ));
        assert!(!is_eligible(
            &c,
            &desktop_ctx("https://x.test/pricing"),
            &ledger,
            Utc::now()
        ));
    }

    #[test]
    fn test_only_exclusions_pass_vacuously() {
        let ledger = ledger();
        let mut c = campaign(FrequencyPolicy::EveryVisit);
        c.targeting_rules = Some(r#"{"urlTargeting": "!/admin, !/login"}"#.to_string());
        assert!(is_eligible(
            &c,
            &desktop_ctx("https://x.test/home"),
            &ledger,
            Utc::now()
        ));
    }

    #[test]
    fn test_malformed_rules_pass() {
        let ledger = ledger();
        let mut c = campaign(FrequencyPolicy::EveryVisit);
        c.targeting_rules = Some("{broken".to_string());
        assert!(is_eligible(&c, &desktop_ctx("https://x.test/"), &ledger, Utc::now()));
    }

    #[test]
    fn test_once_per_session() {
        let mut ledger = ledger();
        let c = campaign(FrequencyPolicy::OncePerSession);
        let ctx = desktop_ctx("https://x.test/");
        let now = Utc::now();
        assert!(is_eligible(&c, &ctx, &ledger, now));
        ledger.record_display(42, now);
        assert!(!is_eligible(&c, &ctx, &ledger, now));
    }

    #[test]
    fn test_once_per_day_recovers_after_exactly_one_day() {
        let mut ledger = ledger();
        let c = campaign(FrequencyPolicy::OncePerDay);
        let ctx = desktop_ctx("https://x.test/");
        let shown_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        ledger.record_display(42, shown_at);

        let at_boundary = shown_at + Duration::milliseconds(86_400_000);
        assert!(!is_eligible(&c, &ctx, &ledger, at_boundary));
        assert!(is_eligible(
            &c,
            &ctx,
            &ledger,
            at_boundary + Duration::milliseconds(1)
        ));
    }

    #[test]
    fn test_once_per_week_and_month_windows() {
        let mut ledger = ledger();
        let ctx = desktop_ctx("https://x.test/");
        let shown_at = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        ledger.record_display(42, shown_at);

        let weekly = campaign(FrequencyPolicy::OncePerWeek);
        assert!(!is_eligible(&weekly, &ctx, &ledger, shown_at + Duration::days(7)));
        assert!(is_eligible(
            &weekly,
            &ctx,
            &ledger,
            shown_at + Duration::days(7) + Duration::milliseconds(1)
        ));

        let monthly = campaign(FrequencyPolicy::OncePerMonth);
        assert!(!is_eligible(&monthly, &ctx, &ledger, shown_at + Duration::days(30)));
        assert!(is_eligible(
            &monthly,
            &ctx,
            &ledger,
            shown_at + Duration::days(30) + Duration::milliseconds(1)
        ));
    }

    #[test]
    fn test_once_ever_latches() {
        let mut ledger = ledger();
        let c = campaign(FrequencyPolicy::OnceEver);
        let ctx = desktop_ctx("https://x.test/");
        let now = Utc::now();
        assert!(is_eligible(&c, &ctx, &ledger, now));
        ledger.record_display(42, now);
        assert!(!is_eligible(&c, &ctx, &ledger, now));
        assert!(!is_eligible(&c, &ctx, &ledger, now + Duration::days(365)));
    }

    #[test]
    fn test_unknown_frequency_fails_open() {
        let ledger = ledger();
        let c = campaign(FrequencyPolicy::Other);
        assert!(is_eligible(&c, &desktop_ctx("https://x.test/"), &ledger, Utc::now()));
    }

    #[test]
    fn test_denied_storage_fails_closed_for_frequency_reads() {
        let ledger =
            FrequencyLedger::new(Box::new(DeniedStore), Box::new(DeniedStore));
        let ctx = desktop_ctx("https://x.test/");
        let now = Utc::now();
        assert!(!is_eligible(&campaign(FrequencyPolicy::OncePerSession), &ctx, &ledger, now));
        assert!(!is_eligible(&campaign(FrequencyPolicy::OncePerDay), &ctx, &ledger, now));
        // Policies that need no storage read stay available.
        assert!(is_eligible(&campaign(FrequencyPolicy::EveryVisit), &ctx, &ledger, now));
    }
}
