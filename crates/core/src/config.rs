use serde::Deserialize;

/// Engine configuration. Deserialized from the JSON attribute blob the
/// embedding page hands to the bootstrap; every field has a default so an
/// empty object (or a missing blob) yields a working engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Origin for API calls, e.g. `https://popups.example.com`. Resolved by
    /// the loader when absent (script-tag attribute, then script origin,
    /// then page origin).
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_event_path")]
    pub event_path: String,
    #[serde(default = "default_batch_path")]
    pub batch_path: String,
    /// Period of the batch flush cycle.
    #[serde(default = "default_batch_interval_ms")]
    pub batch_interval_ms: u64,
    /// Backoff between display retries while another popup is visible.
    #[serde(default = "default_arbiter_retry_ms")]
    pub arbiter_retry_ms: u64,
    /// Retry attempts before a queued display request is dropped.
    /// `None` retries until the slot frees up.
    #[serde(default)]
    pub arbiter_max_attempts: Option<u32>,
    #[serde(default = "default_time_delay_ms")]
    pub default_time_delay_ms: u64,
    #[serde(default = "default_idle_ms")]
    pub default_idle_ms: u64,
    #[serde(default = "default_scroll_percent")]
    pub default_scroll_percent: u8,
    #[serde(default = "default_click_selector")]
    pub default_click_selector: String,
}

fn default_event_path() -> String {
    "/api/tracking/event".to_string()
}
fn default_batch_path() -> String {
    "/api/tracking/batch".to_string()
}
fn default_batch_interval_ms() -> u64 {
    5000
}
fn default_arbiter_retry_ms() -> u64 {
    2000
}
fn default_time_delay_ms() -> u64 {
    5000
}
fn default_idle_ms() -> u64 {
    30_000
}
fn default_scroll_percent() -> u8 {
    50
}
fn default_click_selector() -> String {
    "a".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            event_path: default_event_path(),
            batch_path: default_batch_path(),
            batch_interval_ms: default_batch_interval_ms(),
            arbiter_retry_ms: default_arbiter_retry_ms(),
            arbiter_max_attempts: None,
            default_time_delay_ms: default_time_delay_ms(),
            default_idle_ms: default_idle_ms(),
            default_scroll_percent: default_scroll_percent(),
            default_click_selector: default_click_selector(),
        }
    }
}

impl EngineConfig {
    /// Full URL of the single-event ingestion endpoint.
    pub fn event_endpoint(&self) -> String {
        join_url(&self.base_url, &self.event_path)
    }

    /// Full URL of the batch ingestion endpoint.
    pub fn batch_endpoint(&self) -> String {
        join_url(&self.base_url, &self.batch_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}
