//! Free-view quota
//!
//! Free-tier users may open a fixed number of premium items per calendar day.
//! Views are counted in a ledger keyed by day; entries older than the retention
//! window are pruned whenever a view is recorded, never on read.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{FixedOffset, NaiveDate, Offset, Utc};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::QuotaConfig;
use crate::error::{EntitlementError, EntitlementResult};
use crate::storage::{keys, KeyValueStore};

/// Days of history kept in the ledger
pub const RETENTION_DAYS: i64 = 7;

/// Persisted form of a day key
const DAY_KEY_FORMAT: &str = "%Y-%m-%d";

pub fn day_key(day: NaiveDate) -> String {
    day.format(DAY_KEY_FORMAT).to_string()
}

pub fn parse_day_key(key: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(key, DAY_KEY_FORMAT).ok()
}

/// Per-day view counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeViewLedger {
    days: BTreeMap<NaiveDate, u32>,
}

impl FreeViewLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the stored mapping, dropping keys that are not calendar dates.
    /// Keys spelling the same date (`2024-6-10`, `2024-06-10`) are summed.
    /// Returns the ledger and how many keys were dropped.
    pub fn from_stored(raw: &BTreeMap<String, u32>) -> (Self, usize) {
        let mut ledger = Self::new();
        let mut dropped = 0;
        for (key, count) in raw {
            match parse_day_key(key) {
                Some(day) => {
                    let total = ledger.days.entry(day).or_insert(0);
                    *total = total.saturating_add(*count);
                }
                None => dropped += 1,
            }
        }
        (ledger, dropped)
    }

    pub fn to_stored(&self) -> BTreeMap<String, u32> {
        self.days
            .iter()
            .map(|(day, count)| (day_key(*day), *count))
            .collect()
    }

    pub fn count_on(&self, day: NaiveDate) -> u32 {
        self.days.get(&day).copied().unwrap_or(0)
    }

    pub fn set(&mut self, day: NaiveDate, count: u32) {
        self.days.insert(day, count);
    }

    /// Add one view on `day`, returning the new count
    pub fn increment(&mut self, day: NaiveDate) -> u32 {
        let count = self.days.entry(day).or_insert(0);
        *count = count.saturating_add(1);
        *count
    }

    /// Drop every day `retention_days` or more calendar days before `today`.
    /// Returns how many entries were removed.
    pub fn prune(&mut self, today: NaiveDate, retention_days: i64) -> usize {
        let before = self.days.len();
        self.days
            .retain(|day, _| today.signed_duration_since(*day).num_days() < retention_days);
        before - self.days.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
        self.days.iter().map(|(day, count)| (*day, *count))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

pub struct FreeViewQuotaTracker {
    kv: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    max_free_views_per_day: u32,
    day_offset: FixedOffset,
    /// Serializes prune-increment-write so concurrent views are never lost
    guard: Mutex<()>,
}

impl FreeViewQuotaTracker {
    pub fn new(kv: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, config: &QuotaConfig) -> Self {
        let day_offset = config
            .utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                warn!(
                    "UTC offset of {} minutes is out of range, cutting days at UTC",
                    config.utc_offset_minutes
                );
                Utc.fix()
            });
        Self {
            kv,
            clock,
            max_free_views_per_day: config.max_free_views_per_day,
            day_offset,
            guard: Mutex::new(()),
        }
    }

    pub fn max_free_views_per_day(&self) -> u32 {
        self.max_free_views_per_day
    }

    /// Calendar day "now" falls on
    pub fn today(&self) -> NaiveDate {
        self.clock.now().with_timezone(&self.day_offset).date_naive()
    }

    fn lock(&self) -> EntitlementResult<MutexGuard<'_, ()>> {
        self.guard
            .lock()
            .map_err(|e| EntitlementError::LockPoisoned(e.to_string()))
    }

    fn read_raw(&self) -> EntitlementResult<BTreeMap<String, u32>> {
        Ok(self.kv.get_counts(keys::FREE_VIEW_LEDGER)?.unwrap_or_default())
    }

    /// Snapshot of the stored ledger, as-is (no pruning)
    pub fn ledger(&self) -> FreeViewLedger {
        match self.read_raw() {
            Ok(raw) => FreeViewLedger::from_stored(&raw).0,
            Err(e) => {
                warn!("Unreadable free-view ledger: {}", e);
                FreeViewLedger::new()
            }
        }
    }

    pub fn view_count_today(&self) -> u32 {
        match self.read_raw() {
            Ok(raw) => FreeViewLedger::from_stored(&raw).0.count_on(self.today()),
            Err(e) => {
                warn!("Unreadable free-view ledger, counting zero views: {}", e);
                0
            }
        }
    }

    /// Record one free view for today. Returns today's count afterwards.
    pub fn record_view(&self) -> u32 {
        match self.try_record_view() {
            Ok(count) => count,
            Err(e) => {
                warn!("Failed to record free view: {}", e);
                self.view_count_today()
            }
        }
    }

    pub fn try_record_view(&self) -> EntitlementResult<u32> {
        let _guard = self.lock()?;

        let raw = match self.read_raw() {
            Ok(raw) => raw,
            Err(EntitlementError::TypeMismatch { .. }) => {
                warn!("Free-view ledger has the wrong shape, starting a new one");
                BTreeMap::new()
            }
            Err(e) => return Err(e),
        };

        let (mut ledger, dropped) = FreeViewLedger::from_stored(&raw);
        if dropped > 0 {
            warn!("Dropped {} unparseable day keys from free-view ledger", dropped);
        }

        let today = self.today();
        let pruned = ledger.prune(today, RETENTION_DAYS);
        if pruned > 0 {
            debug!("Pruned {} expired free-view ledger entries", pruned);
        }

        let count = ledger.increment(today);
        self.kv.set_counts(keys::FREE_VIEW_LEDGER, ledger.to_stored())?;

        info!(
            "Free view recorded for {}: {}/{}",
            today, count, self.max_free_views_per_day
        );
        Ok(count)
    }

    pub fn has_quota_remaining(&self) -> bool {
        self.view_count_today() < self.max_free_views_per_day
    }

    pub fn remaining_views(&self) -> u32 {
        self.max_free_views_per_day
            .saturating_sub(self.view_count_today())
    }
}
