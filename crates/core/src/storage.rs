//! Durable per-browser key/value storage behind an explicit interface.
//!
//! The engine sees two tiers: a session-scoped store and a persistent store
//! (the browser bridge maps them to sessionStorage/localStorage). Storage may
//! be unavailable or throwing (privacy modes); every operation is fallible
//! and callers decide whether a failure fails open or closed.

use crate::error::{PopupError, PopupResult};
use std::collections::HashMap;

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> PopupResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> PopupResult<()>;
    fn remove(&mut self, key: &str) -> PopupResult<()>;
}

/// In-memory store. Default for tests and for hosts without real storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> PopupResult<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> PopupResult<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> PopupResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Store whose every operation fails, for exercising privacy-mode paths.
#[derive(Debug, Default)]
pub struct DeniedStore;

impl KeyValueStore for DeniedStore {
    fn get(&self, _key: &str) -> PopupResult<Option<String>> {
        Err(PopupError::Storage("storage access denied".to_string()))
    }

    fn set(&mut self, _key: &str, _value: &str) -> PopupResult<()> {
        Err(PopupError::Storage("storage access denied".to_string()))
    }

    fn remove(&mut self, _key: &str) -> PopupResult<()> {
        Err(PopupError::Storage("storage access denied".to_string()))
    }
}
