//! Application-facing entitlement service
//!
//! Built once at startup and shared by handle. Wires the entitlement store, the
//! free-view quota and the access policy over one key-value store and one clock.

use std::sync::Arc;

use tracing::{debug, info};

use crate::access::{AccessDecision, AccessPolicy};
use crate::clock::{Clock, SystemClock};
use crate::config::EntitlementConfig;
use crate::entitlement::EntitlementStore;
use crate::error::EntitlementResult;
use crate::quota::{FreeViewLedger, FreeViewQuotaTracker};
use crate::storage::{FileStore, KeyValueStore, MemoryStore};
use crate::subscription::{SubscriptionRecord, SubscriptionStatus};

#[derive(Clone)]
pub struct Entitlements {
    store: Arc<EntitlementStore>,
    quota: Arc<FreeViewQuotaTracker>,
    policy: AccessPolicy,
}

impl Entitlements {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &EntitlementConfig,
    ) -> Self {
        let store = Arc::new(EntitlementStore::new(
            kv.clone(),
            clock.clone(),
            &config.verification,
        ));
        let quota = Arc::new(FreeViewQuotaTracker::new(kv, clock, &config.quota));
        let policy = AccessPolicy::new(store.clone(), quota.clone());
        Self {
            store,
            quota,
            policy,
        }
    }

    /// Build from configuration: file-backed if `storage.path` is set, otherwise
    /// in-memory, on the system clock
    pub fn from_config(config: &EntitlementConfig) -> EntitlementResult<Self> {
        config.validate()?;
        let kv: Arc<dyn KeyValueStore> = match &config.storage.path {
            Some(path) => {
                let file = FileStore::open(path)?;
                debug!("Entitlement state backed by {}", file.path().display());
                Arc::new(file)
            }
            None => Arc::new(MemoryStore::new()),
        };
        info!(
            "Entitlements ready (free views/day: {}, verification every {}h)",
            config.quota.max_free_views_per_day, config.verification.interval_hours
        );
        Ok(Self::new(kv, Arc::new(SystemClock), config))
    }

    pub fn store(&self) -> &EntitlementStore {
        &self.store
    }

    pub fn quota(&self) -> &FreeViewQuotaTracker {
        &self.quota
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }

    /// Accept a record from the purchase-verification subsystem
    pub fn save(&self, record: &SubscriptionRecord) {
        self.store.save(record)
    }

    pub fn load(&self) -> SubscriptionRecord {
        self.store.load()
    }

    pub fn is_premium(&self) -> bool {
        self.store.is_premium()
    }

    pub fn current_status(&self) -> SubscriptionStatus {
        self.store.current_status()
    }

    pub fn needs_verification(&self) -> bool {
        self.store.needs_verification()
    }

    pub fn can_access_content(&self, content_id: u32) -> bool {
        self.policy.can_access_content(content_id)
    }

    pub fn open_content(&self, content_id: u32) -> AccessDecision {
        self.policy.open_content(content_id)
    }

    pub fn record_view(&self) -> u32 {
        self.quota.record_view()
    }

    pub fn remaining_views(&self) -> u32 {
        self.quota.remaining_views()
    }

    pub fn free_view_ledger(&self) -> FreeViewLedger {
        self.quota.ledger()
    }

    pub fn has_free_trial_been_used(&self) -> bool {
        self.store.has_free_trial_been_used()
    }

    pub fn mark_free_trial_used(&self) {
        self.store.mark_free_trial_used()
    }

    /// Sign-out: drops the account's entitlement, keeps installation-scoped state
    pub fn clear(&self) {
        self.store.clear()
    }
}
