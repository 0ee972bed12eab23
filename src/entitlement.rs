//! Entitlement Store
//!
//! Owns the persisted `SubscriptionRecord`, ages it on read and tracks when the
//! entitlement was last confirmed against the verification source.
//!
//! Every public query is infallible and fails closed: a storage or decode error
//! reads as "no entitlement". The `try_*` variants expose the underlying outcome.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::VerificationConfig;
use crate::error::{EntitlementError, EntitlementResult};
use crate::storage::{keys, KeyValueStore};
use crate::subscription::{SubscriptionRecord, SubscriptionStatus};

pub struct EntitlementStore {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    verification_interval_hours: i64,
    /// Serializes read-normalize-write against concurrent saves
    guard: Mutex<()>,
}

impl EntitlementStore {
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        config: &VerificationConfig,
    ) -> Self {
        Self {
            kv,
            clock,
            verification_interval_hours: config.interval_hours,
            guard: Mutex::new(()),
        }
    }

    fn lock(&self) -> EntitlementResult<MutexGuard<'_, ()>> {
        self.guard
            .lock()
            .map_err(|e| EntitlementError::LockPoisoned(e.to_string()))
    }

    /// Persist `record` and stamp the verification clock
    pub fn save(&self, record: &SubscriptionRecord) {
        if let Err(e) = self.try_save(record) {
            warn!("Failed to save subscription record, keeping previous state: {}", e);
        }
    }

    pub fn try_save(&self, record: &SubscriptionRecord) -> EntitlementResult<()> {
        let _guard = self.lock()?;
        self.save_locked(record)
    }

    fn save_locked(&self, record: &SubscriptionRecord) -> EntitlementResult<()> {
        let encoded = serde_json::to_vec(record)
            .map_err(|e| EntitlementError::serialization(keys::SUBSCRIPTION_INFO, e))?;
        self.kv.set_bytes(keys::SUBSCRIPTION_INFO, encoded)?;

        let now = self.clock.now();
        self.kv.set_timestamp(keys::LAST_VERIFICATION, now)?;

        debug!(
            "Saved subscription record: status={}, product={:?}, verified_at={}",
            record.status, record.product_id, now
        );
        Ok(())
    }

    /// Current entitlement, aged to now. Falls back to the free record.
    pub fn load(&self) -> SubscriptionRecord {
        match self.try_load() {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to load subscription record, treating as free: {}", e);
                SubscriptionRecord::free()
            }
        }
    }

    pub fn try_load(&self) -> EntitlementResult<SubscriptionRecord> {
        let _guard = self.lock()?;

        let encoded = match self.kv.get_bytes(keys::SUBSCRIPTION_INFO)? {
            Some(encoded) => encoded,
            None => return Ok(SubscriptionRecord::free()),
        };
        let record: SubscriptionRecord = serde_json::from_slice(&encoded)
            .map_err(|e| EntitlementError::serialization(keys::SUBSCRIPTION_INFO, e))?;

        let now = self.clock.now();
        match record.normalized(now) {
            Some(expired) => {
                info!(
                    "Subscription {:?} lapsed at {:?}, marking expired",
                    expired.product_id, expired.expiration_date
                );
                if let Err(e) = self.save_locked(&expired) {
                    warn!("Failed to persist expired subscription record: {}", e);
                }
                Ok(expired)
            }
            None => Ok(record),
        }
    }

    /// Forget the account's entitlement (sign-out). Trial flag and ledger survive.
    pub fn clear(&self) {
        if let Err(e) = self.try_clear() {
            warn!("Failed to clear subscription state: {}", e);
        }
    }

    pub fn try_clear(&self) -> EntitlementResult<()> {
        let _guard = self.lock()?;
        self.kv.delete(keys::SUBSCRIPTION_INFO)?;
        self.kv.delete(keys::LAST_VERIFICATION)?;
        info!("Cleared subscription state");
        Ok(())
    }

    pub fn is_premium(&self) -> bool {
        self.load().is_active()
    }

    pub fn current_status(&self) -> SubscriptionStatus {
        self.load().status
    }

    pub fn last_verification_time(&self) -> Option<DateTime<Utc>> {
        match self.kv.get_timestamp(keys::LAST_VERIFICATION) {
            Ok(ts) => ts,
            Err(e) => {
                warn!("Unreadable verification timestamp, treating as never verified: {}", e);
                None
            }
        }
    }

    /// True once the configured number of whole hours has passed since the last
    /// verification, or if there never was one
    pub fn needs_verification(&self) -> bool {
        match self.last_verification_time() {
            None => true,
            Some(last) => {
                let elapsed_hours = (self.clock.now() - last).num_hours();
                elapsed_hours >= self.verification_interval_hours
            }
        }
    }

    /// Whether this installation already consumed its free trial
    pub fn has_free_trial_been_used(&self) -> bool {
        match self.kv.get_bool(keys::FREE_TRIAL_USED) {
            Ok(flag) => flag.unwrap_or(false),
            Err(e) => {
                warn!("Unreadable free-trial flag, treating trial as used: {}", e);
                true
            }
        }
    }

    pub fn mark_free_trial_used(&self) {
        match self.kv.set_bool(keys::FREE_TRIAL_USED, true) {
            Ok(()) => info!("Free trial marked as used"),
            Err(e) => warn!("Failed to persist free-trial flag: {}", e),
        }
    }
}
