//! Frequency ledger — records "has this campaign been shown, and when"
//! across the two browser storage tiers plus a persisted ever-shown set.
//!
//! Keys match what earlier script versions wrote, so upgraded embeds keep
//! honoring caps recorded before the upgrade: `popup_{id}` in both tiers
//! (epoch-ms value) and a JSON id array under `notificationapp_shown_popups`.

use chrono::{DateTime, TimeZone, Utc};
use popup_core::{KeyValueStore, PopupResult};
use std::collections::HashSet;
use tracing::warn;

const EVER_SHOWN_KEY: &str = "notificationapp_shown_popups";

fn campaign_key(campaign_id: u64) -> String {
    format!("popup_{campaign_id}")
}

pub struct FrequencyLedger {
    session: Box<dyn KeyValueStore>,
    persistent: Box<dyn KeyValueStore>,
    ever_shown: HashSet<u64>,
}

impl FrequencyLedger {
    /// Build the ledger, loading the ever-shown set from persistent storage.
    /// A missing, unreadable, or corrupt set loads as empty.
    pub fn new(
        session: Box<dyn KeyValueStore>,
        persistent: Box<dyn KeyValueStore>,
    ) -> Self {
        let ever_shown = match persistent.get(EVER_SHOWN_KEY) {
            Ok(Some(raw)) => serde_json::from_str::<Vec<u64>>(&raw)
                .unwrap_or_else(|e| {
                    warn!(error = %e, "corrupt ever-shown set, starting empty");
                    Vec::new()
                })
                .into_iter()
                .collect(),
            Ok(None) => HashSet::new(),
            Err(e) => {
                warn!(error = %e, "persistent storage unavailable, ever-shown set empty");
                HashSet::new()
            }
        };
        Self {
            session,
            persistent,
            ever_shown,
        }
    }

    /// Timestamp of the last recorded display, from persistent storage.
    pub fn last_shown(&self, campaign_id: u64) -> PopupResult<Option<DateTime<Utc>>> {
        let raw = self.persistent.get(&campaign_key(campaign_id))?;
        Ok(raw.and_then(|v| parse_epoch_ms(&v)))
    }

    /// Whether a display was recorded during this browser session.
    pub fn shown_this_session(&self, campaign_id: u64) -> PopupResult<bool> {
        Ok(self.session.get(&campaign_key(campaign_id))?.is_some())
    }

    /// Whether the campaign is in the persisted ever-shown set.
    pub fn shown_ever(&self, campaign_id: u64) -> bool {
        self.ever_shown.contains(&campaign_id)
    }

    /// Record a display in every tier. Called before rendering so a crash
    /// mid-render cannot produce a repeat within the same evaluation pass.
    /// Storage failures degrade frequency capping but never block display.
    pub fn record_display(&mut self, campaign_id: u64, now: DateTime<Utc>) {
        let key = campaign_key(campaign_id);
        let stamp = now.timestamp_millis().to_string();

        if let Err(e) = self.session.set(&key, &stamp) {
            warn!(campaign_id, error = %e, "failed to write session display record");
        }
        if let Err(e) = self.persistent.set(&key, &stamp) {
            warn!(campaign_id, error = %e, "failed to write persistent display record");
        }

        self.ever_shown.insert(campaign_id);
        match serde_json::to_string(&{
            let mut ids: Vec<u64> = self.ever_shown.iter().copied().collect();
            ids.sort_unstable();
            ids
        }) {
            Ok(serialized) => {
                if let Err(e) = self.persistent.set(EVER_SHOWN_KEY, &serialized) {
                    warn!(campaign_id, error = %e, "failed to persist ever-shown set");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize ever-shown set"),
        }
    }
}

fn parse_epoch_ms(raw: &str) -> Option<DateTime<Utc>> {
    raw.trim()
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
}

#[cfg(test)]
mod tests {
    use super::*;
    use popup_core::{DeniedStore, MemoryStore};

    fn ledger() -> FrequencyLedger {
        FrequencyLedger::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    #[test]
    fn test_record_display_writes_all_tiers() {
        let mut ledger = ledger();
        let now = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();

        assert!(!ledger.shown_this_session(7).unwrap());
        assert!(ledger.last_shown(7).unwrap().is_none());
        assert!(!ledger.shown_ever(7));

        ledger.record_display(7, now);

        assert!(ledger.shown_this_session(7).unwrap());
        assert_eq!(ledger.last_shown(7).unwrap(), Some(now));
        assert!(ledger.shown_ever(7));
    }

    #[test]
    fn test_ever_shown_set_survives_reload() {
        let mut persistent = MemoryStore::new();
        persistent
            .set(EVER_SHOWN_KEY, "[3, 9]")
            .unwrap();
        let ledger =
            FrequencyLedger::new(Box::new(MemoryStore::new()), Box::new(persistent));
        assert!(ledger.shown_ever(3));
        assert!(ledger.shown_ever(9));
        assert!(!ledger.shown_ever(4));
    }

    #[test]
    fn test_corrupt_ever_shown_set_loads_empty() {
        let mut persistent = MemoryStore::new();
        persistent.set(EVER_SHOWN_KEY, "{not json").unwrap();
        let ledger =
            FrequencyLedger::new(Box::new(MemoryStore::new()), Box::new(persistent));
        assert!(!ledger.shown_ever(1));
    }

    #[test]
    fn test_denied_storage_does_not_panic() {
        let mut ledger =
            FrequencyLedger::new(Box::new(DeniedStore), Box::new(DeniedStore));
        ledger.record_display(1, Utc::now());
        assert!(ledger.shown_this_session(1).is_err());
        assert!(ledger.last_shown(1).is_err());
        // In-memory set still tracks within this page load.
        assert!(ledger.shown_ever(1));
    }

    #[test]
    fn test_garbage_timestamp_reads_as_never_shown() {
        let mut persistent = MemoryStore::new();
        persistent.set("popup_5", "yesterday").unwrap();
        let ledger =
            FrequencyLedger::new(Box::new(MemoryStore::new()), Box::new(persistent));
        assert!(ledger.last_shown(5).unwrap().is_none());
    }
}
