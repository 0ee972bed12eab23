//! In-memory key-value store

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::debug;

use super::{KeyValueStore, StoredValue};
use crate::error::{EntitlementError, EntitlementResult};

/// Thread-safe map-backed store. Contents live as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, StoredValue>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> EntitlementResult<Option<StoredValue>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| EntitlementError::LockPoisoned(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: StoredValue) -> EntitlementResult<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| EntitlementError::LockPoisoned(e.to_string()))?;
        debug!("MemoryStore SET {} ({})", key, value.kind());
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> EntitlementResult<bool> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| EntitlementError::LockPoisoned(e.to_string()))?;
        let removed = entries.remove(key).is_some();
        debug!("MemoryStore DELETE {} (removed: {})", key, removed);
        Ok(removed)
    }
}
