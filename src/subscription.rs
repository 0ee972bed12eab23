//! Subscription Record
//!
//! The entitlement snapshot handed over by the purchase-verification subsystem,
//! and the expiry rule that ages it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    /// No entitlement
    Free,
    /// Paid and within its term
    Active,
    /// Term has lapsed
    Expired,
    /// Cancelled by the user; ages like `Active` but never grants access
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "active" => Ok(Self::Active),
            "expired" => Ok(Self::Expired),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(format!("unknown subscription status `{}`", other)),
        }
    }
}

/// Persisted entitlement snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRecord {
    pub status: SubscriptionStatus,
    pub product_id: Option<String>,
    pub purchase_date: Option<DateTime<Utc>>,
    /// None = lifetime or promotional grant, never ages out
    pub expiration_date: Option<DateTime<Utc>>,
    pub original_transaction_id: Option<String>,
    pub auto_renew_enabled: bool,
}

impl SubscriptionRecord {
    /// The canonical "no entitlement" record
    pub fn free() -> Self {
        Self {
            status: SubscriptionStatus::Free,
            product_id: None,
            purchase_date: None,
            expiration_date: None,
            original_transaction_id: None,
            auto_renew_enabled: false,
        }
    }

    /// An active subscription to `product_id` running until `expires_at`
    pub fn active(
        product_id: impl Into<String>,
        purchased_at: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            status: SubscriptionStatus::Active,
            product_id: Some(product_id.into()),
            purchase_date: Some(purchased_at),
            expiration_date: expires_at,
            original_transaction_id: None,
            auto_renew_enabled: expires_at.is_some(),
        }
    }

    pub fn with_transaction_id(mut self, id: impl Into<String>) -> Self {
        self.original_transaction_id = Some(id.into());
        self
    }

    /// Only `Active` grants access
    pub fn is_active(&self) -> bool {
        self.status == SubscriptionStatus::Active
    }

    /// True when the term has lapsed but the status does not say so yet
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        match self.expiration_date {
            Some(expires) => expires < now && self.status != SubscriptionStatus::Expired,
            None => false,
        }
    }

    /// The record as it should read at `now`, or None if it is already current
    pub fn normalized(&self, now: DateTime<Utc>) -> Option<Self> {
        if !self.is_stale(now) {
            return None;
        }
        Some(Self {
            status: SubscriptionStatus::Expired,
            auto_renew_enabled: false,
            ..self.clone()
        })
    }
}

impl Default for SubscriptionRecord {
    fn default() -> Self {
        Self::free()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_free_record_is_canonical_default() {
        let free = SubscriptionRecord::default();
        assert_eq!(free.status, SubscriptionStatus::Free);
        assert!(free.product_id.is_none());
        assert!(free.purchase_date.is_none());
        assert!(free.expiration_date.is_none());
        assert!(!free.auto_renew_enabled);
        assert!(!free.is_active());
    }

    #[test]
    fn test_only_active_status_is_active() {
        let mut record = SubscriptionRecord::active("pro.monthly", now(), None);
        assert!(record.is_active());
        for status in [
            SubscriptionStatus::Free,
            SubscriptionStatus::Expired,
            SubscriptionStatus::Cancelled,
        ] {
            record.status = status;
            assert!(!record.is_active());
        }
    }

    #[test]
    fn test_normalized_expires_lapsed_record() {
        let record = SubscriptionRecord::active(
            "pro.monthly",
            now() - Duration::days(31),
            Some(now() - Duration::seconds(1)),
        )
        .with_transaction_id("1000000123");

        let normalized = record.normalized(now()).unwrap();
        assert_eq!(normalized.status, SubscriptionStatus::Expired);
        assert!(!normalized.auto_renew_enabled);
        assert_eq!(normalized.product_id, record.product_id);
        assert_eq!(normalized.purchase_date, record.purchase_date);
        assert_eq!(normalized.expiration_date, record.expiration_date);
        assert_eq!(normalized.original_transaction_id, record.original_transaction_id);

        assert!(normalized.normalized(now()).is_none());
    }

    #[test]
    fn test_expiry_boundary_is_strict() {
        let record = SubscriptionRecord::active("pro.monthly", now(), Some(now()));
        assert!(!record.is_stale(now()));
        assert!(record.is_stale(now() + Duration::milliseconds(1)));
    }

    #[test]
    fn test_cancelled_record_ages_like_active() {
        let mut record = SubscriptionRecord::active("pro.yearly", now(), Some(now()));
        record.status = SubscriptionStatus::Cancelled;
        let normalized = record.normalized(now() + Duration::hours(1)).unwrap();
        assert_eq!(normalized.status, SubscriptionStatus::Expired);
    }

    #[test]
    fn test_free_record_with_past_expiry_heals_to_expired() {
        let mut record = SubscriptionRecord::free();
        record.expiration_date = Some(now() - Duration::hours(1));
        record.auto_renew_enabled = true;
        assert!(record.is_stale(now()));

        let normalized = record.normalized(now()).unwrap();
        assert_eq!(normalized.status, SubscriptionStatus::Expired);
        assert!(!normalized.auto_renew_enabled);
        assert_eq!(normalized.expiration_date, record.expiration_date);
        assert!(!normalized.is_active());

        // Undated free record stays as it is
        assert!(SubscriptionRecord::free().normalized(now()).is_none());
    }

    #[test]
    fn test_lifetime_record_never_stale() {
        let record = SubscriptionRecord::active("lifetime", now(), None);
        assert!(record.normalized(now() + Duration::days(10_000)).is_none());
    }

    #[test]
    fn test_status_parse_and_serde() {
        assert_eq!("Active".parse::<SubscriptionStatus>(), Ok(SubscriptionStatus::Active));
        assert_eq!("canceled".parse::<SubscriptionStatus>(), Ok(SubscriptionStatus::Cancelled));
        assert!("gold".parse::<SubscriptionStatus>().is_err());

        let json = serde_json::to_value(SubscriptionRecord::free()).unwrap();
        assert_eq!(json["status"], "free");
        assert_eq!(json["autoRenewEnabled"], false);
    }
}
