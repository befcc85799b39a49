//! Campaign definitions and page context as delivered by the backend feed.

use serde::{Deserialize, Serialize};

/// What kind of popup a campaign renders. Informational for the engine;
/// rendering is driven entirely by the content document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum CampaignKind {
    Message,
    EmailCollector,
    Advertising,
    Lightbox,
    Inline,
    SpinWheel,
    Video,
    Coupon,
    #[serde(other)]
    Other,
}

/// Page condition that makes a campaign a display candidate.
///
/// The backend serializes these as PascalCase enum names.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum TriggerKind {
    OnPageLoad,
    OnExitIntent,
    OnScroll,
    OnTimeDelay,
    OnClick,
    OnIdle,
    #[serde(other)]
    Unknown,
}

/// How often a campaign may be shown to the same browser.
///
/// An unrecognized value fails open: the campaign stays eligible.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum FrequencyPolicy {
    EveryVisit,
    OncePerSession,
    OncePerDay,
    OncePerWeek,
    OncePerMonth,
    OnceEver,
    #[serde(other)]
    Other,
}

impl FrequencyPolicy {
    /// Fixed calendar-naive window in milliseconds, for the windowed policies.
    pub fn window_ms(&self) -> Option<i64> {
        match self {
            FrequencyPolicy::OncePerDay => Some(24 * 60 * 60 * 1000),
            FrequencyPolicy::OncePerWeek => Some(7 * 24 * 60 * 60 * 1000),
            FrequencyPolicy::OncePerMonth => Some(30 * 24 * 60 * 60 * 1000),
            _ => None,
        }
    }
}

/// A published popup campaign, immutable for the lifetime of a page view.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Campaign {
    pub id: u64,
    pub name: String,
    #[serde(rename = "type", default = "default_campaign_kind")]
    pub kind: CampaignKind,
    /// Declarative block document or legacy `{html}` object; may arrive as a
    /// JSON-encoded string. Opaque here, interpreted by the renderer.
    #[serde(default)]
    pub content: serde_json::Value,
    pub trigger: TriggerKind,
    /// Trigger-specific delay. Page-load: wait before firing (0 allowed).
    /// Time-delay: same, nonzero default applied. Idle: required quiet period.
    #[serde(default, alias = "delay")]
    pub delay_ms: Option<u64>,
    /// Scroll-depth threshold percentage for `OnScroll`.
    #[serde(default)]
    pub scroll_percentage: Option<u8>,
    /// CSS selector for `OnClick` candidates.
    #[serde(default)]
    pub click_selector: Option<String>,
    pub frequency: FrequencyPolicy,
    #[serde(default)]
    pub show_on_mobile: bool,
    #[serde(default)]
    pub show_on_desktop: bool,
    /// Raw JSON blob; `urlTargeting` is the only key the engine reads.
    #[serde(default)]
    pub targeting_rules: Option<String>,
}

fn default_campaign_kind() -> CampaignKind {
    CampaignKind::Message
}

/// Wire shape of the tenant-script campaign feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignFeed {
    pub tenant_id: u64,
    pub campaigns: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
}

/// Snapshot of the page the engine is running on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageContext {
    pub url: String,
    pub referrer: String,
    pub device: DeviceClass,
}

impl PageContext {
    pub fn is_mobile(&self) -> bool {
        self.device == DeviceClass::Mobile
    }
}
