//! JSON-file key-value store
//!
//! The whole store is one JSON object on disk. Every mutation rewrites it via a
//! sibling temp file and a rename, so a crash never leaves a half-written file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{debug, info};

use super::{KeyValueStore, StoredValue};
use crate::error::{EntitlementError, EntitlementResult};

pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, StoredValue>>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> EntitlementResult<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(raw) => serde_json::from_slice(&raw).map_err(|e| {
                EntitlementError::Storage(format!("Corrupt store {}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        info!("Opened entitlement store at {} ({} keys)", path.display(), entries.len());

        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, StoredValue>) -> EntitlementResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let raw = serde_json::to_vec_pretty(entries)
            .map_err(|e| EntitlementError::Storage(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, raw)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Apply `change` to a copy of the map and swap it in only once it is on disk
    fn mutate<F, T>(&self, change: F) -> EntitlementResult<T>
    where
        F: FnOnce(&mut BTreeMap<String, StoredValue>) -> T,
    {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| EntitlementError::LockPoisoned(e.to_string()))?;
        let mut next = entries.clone();
        let out = change(&mut next);
        self.persist(&next)?;
        *entries = next;
        Ok(out)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> EntitlementResult<Option<StoredValue>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| EntitlementError::LockPoisoned(e.to_string()))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: StoredValue) -> EntitlementResult<()> {
        debug!("FileStore SET {} ({})", key, value.kind());
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn delete(&self, key: &str) -> EntitlementResult<bool> {
        let present = self
            .entries
            .read()
            .map_err(|e| EntitlementError::LockPoisoned(e.to_string()))?
            .contains_key(key);
        if !present {
            return Ok(false);
        }
        debug!("FileStore DELETE {}", key);
        self.mutate(|entries| entries.remove(key).is_some())
    }
}
