//! Key-value persistence collaborator
//!
//! The entitlement core only ever talks to [`KeyValueStore`]. Two adapters ship
//! with the crate:
//! - [`MemoryStore`]: process-local map, used by tests and embedders
//! - [`FileStore`]: a single JSON document on disk, rewritten atomically

pub mod file;
pub mod memory;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EntitlementError, EntitlementResult};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Persisted key layout
pub mod keys {
    /// Serialized `SubscriptionRecord`
    pub const SUBSCRIPTION_INFO: &str = "subscription_info";
    /// Timestamp of the last confirmation against the verification source
    pub const LAST_VERIFICATION: &str = "subscription_last_verification";
    /// Installation-scoped trial flag
    pub const FREE_TRIAL_USED: &str = "free_trial_used";
    /// Day-key → view count ledger
    pub const FREE_VIEW_LEDGER: &str = "free_content_view_count";
}

/// A value held by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StoredValue {
    /// Opaque serialized blob
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    /// Small string → count mapping
    Counts(BTreeMap<String, u32>),
}

impl StoredValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::Bool(_) => "bool",
            Self::Timestamp(_) => "timestamp",
            Self::Counts(_) => "counts",
        }
    }
}

fn mismatch(key: &str, expected: &'static str, found: &StoredValue) -> EntitlementError {
    EntitlementError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.kind(),
    }
}

/// Durable, process-local storage keyed by string.
///
/// Implementations must be synchronous and cheap; callers hold their own
/// critical sections around read-modify-write sequences.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> EntitlementResult<Option<StoredValue>>;

    fn set(&self, key: &str, value: StoredValue) -> EntitlementResult<()>;

    /// Remove `key`, returning whether it existed
    fn delete(&self, key: &str) -> EntitlementResult<bool>;

    fn get_bytes(&self, key: &str) -> EntitlementResult<Option<Vec<u8>>> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Bytes(bytes)) => Ok(Some(bytes)),
            Some(other) => Err(mismatch(key, "bytes", &other)),
        }
    }

    fn set_bytes(&self, key: &str, bytes: Vec<u8>) -> EntitlementResult<()> {
        self.set(key, StoredValue::Bytes(bytes))
    }

    fn get_bool(&self, key: &str) -> EntitlementResult<Option<bool>> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Bool(flag)) => Ok(Some(flag)),
            Some(other) => Err(mismatch(key, "bool", &other)),
        }
    }

    fn set_bool(&self, key: &str, flag: bool) -> EntitlementResult<()> {
        self.set(key, StoredValue::Bool(flag))
    }

    fn get_timestamp(&self, key: &str) -> EntitlementResult<Option<DateTime<Utc>>> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Timestamp(ts)) => Ok(Some(ts)),
            Some(other) => Err(mismatch(key, "timestamp", &other)),
        }
    }

    fn set_timestamp(&self, key: &str, ts: DateTime<Utc>) -> EntitlementResult<()> {
        self.set(key, StoredValue::Timestamp(ts))
    }

    fn get_counts(&self, key: &str) -> EntitlementResult<Option<BTreeMap<String, u32>>> {
        match self.get(key)? {
            None => Ok(None),
            Some(StoredValue::Counts(counts)) => Ok(Some(counts)),
            Some(other) => Err(mismatch(key, "counts", &other)),
        }
    }

    fn set_counts(&self, key: &str, counts: BTreeMap<String, u32>) -> EntitlementResult<()> {
        self.set(key, StoredValue::Counts(counts))
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
