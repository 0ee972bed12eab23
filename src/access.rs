//! Content access policy
//!
//! | Caller            | Content                   | Decision            |
//! |-------------------|---------------------------|---------------------|
//! | Premium           | anything                  | allowed             |
//! | Free              | track 1 or 2 (`id / 100`) | allowed             |
//! | Free              | later tracks              | daily free quota    |
//!
//! Checking access never consumes quota; [`AccessPolicy::open_content`] does.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::entitlement::EntitlementStore;
use crate::quota::FreeViewQuotaTracker;

/// Content ids are grouped into tracks of this many items
pub const CONTENT_PER_TRACK: u32 = 100;

/// Highest track number that is always free
pub const FREE_TRACK_LIMIT: u32 = 2;

/// Track number for a content id: 101 and 102 → 1, 201 → 2, 305 → 3
pub fn track_of(content_id: u32) -> u32 {
    content_id / CONTENT_PER_TRACK
}

/// Zero-based track index: index 2 (the third track) onwards is premium
pub fn is_premium_track(track_index: usize) -> bool {
    track_index >= 2
}

/// Level ids share the content numbering: levels past track 2 are premium
pub fn is_premium_level(level_id: u32) -> bool {
    level_id / CONTENT_PER_TRACK > FREE_TRACK_LIMIT
}

/// Why content was or was not opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum AccessDecision {
    /// Caller holds an active subscription
    Premium,
    /// Content belongs to an always-free track
    FreeTrack { track: u32 },
    /// Free-tier caller still has `remaining` views today
    FreeQuota { remaining: u32 },
    /// Free-tier caller used up today's views
    QuotaExhausted,
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Self::QuotaExhausted)
    }

    /// Whether opening the content should count against the daily quota
    pub fn consumes_quota(&self) -> bool {
        matches!(self, Self::FreeQuota { .. })
    }
}

#[derive(Clone)]
pub struct AccessPolicy {
    entitlements: Arc<EntitlementStore>,
    quota: Arc<FreeViewQuotaTracker>,
}

impl AccessPolicy {
    pub fn new(entitlements: Arc<EntitlementStore>, quota: Arc<FreeViewQuotaTracker>) -> Self {
        Self {
            entitlements,
            quota,
        }
    }

    pub fn evaluate(&self, content_id: u32) -> AccessDecision {
        if self.entitlements.is_premium() {
            return AccessDecision::Premium;
        }

        let track = track_of(content_id);
        if track <= FREE_TRACK_LIMIT {
            return AccessDecision::FreeTrack { track };
        }

        let remaining = self.quota.remaining_views();
        if remaining > 0 {
            AccessDecision::FreeQuota { remaining }
        } else {
            AccessDecision::QuotaExhausted
        }
    }

    /// Read-only gate: never records a view
    pub fn can_access_content(&self, content_id: u32) -> bool {
        self.evaluate(content_id).is_allowed()
    }

    /// Gate and, when the open is paid for by the free quota, record the view
    pub fn open_content(&self, content_id: u32) -> AccessDecision {
        let decision = self.evaluate(content_id);
        if decision.consumes_quota() {
            self.quota.record_view();
        }
        debug!("Open content {}: {:?}", content_id, decision);
        decision
    }
}
