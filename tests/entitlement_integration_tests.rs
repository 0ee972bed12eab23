//! Entitlement Integration Tests
//!
//! End-to-end behaviour of the entitlement service over a shared store and a
//! manually driven clock.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use content_entitlements::{
    keys, EntitlementConfig, Entitlements, FileStore, KeyValueStore, MemoryStore, MockClock,
    SubscriptionRecord, SubscriptionStatus,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 10, 9, 0, 0).unwrap()
}

fn setup() -> (Arc<MemoryStore>, MockClock, Entitlements) {
    let kv = Arc::new(MemoryStore::new());
    let clock = MockClock::new(start());
    let entitlements = Entitlements::new(
        kv.clone(),
        Arc::new(clock.clone()),
        &EntitlementConfig::default(),
    );
    (kv, clock, entitlements)
}

/// Active record expiring in an hour: premium now, expired two hours later
#[test]
fn test_subscription_expires_end_to_end() {
    let (_, clock, entitlements) = setup();
    entitlements.save(&SubscriptionRecord::active(
        "pro.monthly",
        start(),
        Some(start() + Duration::hours(1)),
    ));
    assert!(entitlements.is_premium());
    assert_eq!(entitlements.current_status(), SubscriptionStatus::Active);

    clock.advance(Duration::hours(2));
    assert_eq!(entitlements.load().status, SubscriptionStatus::Expired);
    assert!(!entitlements.is_premium());
}

/// Normalization is idempotent across repeated loads
#[test]
fn test_normalization_is_idempotent() {
    let (_, clock, entitlements) = setup();
    entitlements.save(
        &SubscriptionRecord::active("pro.yearly", start(), Some(start() + Duration::days(1)))
            .with_transaction_id("5000000001"),
    );

    clock.advance(Duration::days(3));
    let first = entitlements.load();
    let second = entitlements.load();
    assert_eq!(first, second);
    assert_eq!(first.status, SubscriptionStatus::Expired);
    assert!(!first.auto_renew_enabled);
    assert_eq!(first.original_transaction_id.as_deref(), Some("5000000001"));
}

/// Lifetime grants never age out
#[test]
fn test_lifetime_grant_never_expires() {
    let (_, clock, entitlements) = setup();
    entitlements.save(&SubscriptionRecord::active("lifetime", start(), None));

    clock.advance(Duration::days(3650));
    assert_eq!(entitlements.current_status(), SubscriptionStatus::Active);
    assert!(entitlements.is_premium());
}

/// Three views exhaust the quota; a fourth still counts
#[test]
fn test_daily_quota_lifecycle() {
    let (_, clock, entitlements) = setup();
    assert!(entitlements.can_access_content(305));

    for _ in 0..3 {
        entitlements.record_view();
    }
    assert_eq!(entitlements.quota().view_count_today(), 3);
    assert!(!entitlements.quota().has_quota_remaining());
    assert!(!entitlements.can_access_content(305));

    assert_eq!(entitlements.record_view(), 4);
    assert!(!entitlements.can_access_content(305));

    // Free tracks stay open regardless of quota
    assert!(entitlements.can_access_content(101));
    assert!(entitlements.can_access_content(201));

    // Next calendar day resets the gate
    clock.advance(Duration::days(1));
    assert_eq!(entitlements.remaining_views(), 3);
    assert!(entitlements.can_access_content(305));
}

/// An entry ten days old is gone after the next recorded view
#[test]
fn test_old_ledger_entry_pruned_on_record() {
    let (kv, _, entitlements) = setup();
    let ten_days_ago = NaiveDate::from_ymd_opt(2024, 5, 31).unwrap();
    let mut raw = BTreeMap::new();
    raw.insert(ten_days_ago.format("%Y-%m-%d").to_string(), 2);
    kv.set_counts(keys::FREE_VIEW_LEDGER, raw).unwrap();

    entitlements.record_view();

    let ledger = entitlements.free_view_ledger();
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger.count_on(ten_days_ago), 0);
    assert_eq!(ledger.count_on(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()), 1);
}

/// A ledger key written without zero padding still gates today's access
#[test]
fn test_unpadded_ledger_key_gates_access() {
    let (kv, _, entitlements) = setup();
    let mut raw = BTreeMap::new();
    raw.insert("2024-6-10".to_string(), 3);
    kv.set_counts(keys::FREE_VIEW_LEDGER, raw).unwrap();

    assert_eq!(entitlements.quota().view_count_today(), 3);
    assert_eq!(entitlements.remaining_views(), 0);
    assert!(!entitlements.can_access_content(305));
    assert!(entitlements.can_access_content(201));
}

/// Verification cadence: due, fresh after save, due again at 24 whole hours
#[test]
fn test_verification_cadence() {
    let (_, clock, entitlements) = setup();
    assert!(entitlements.needs_verification());

    entitlements.save(&SubscriptionRecord::active("pro.monthly", start(), None));
    assert!(!entitlements.needs_verification());

    clock.advance(Duration::hours(23) + Duration::minutes(59));
    assert!(!entitlements.needs_verification());

    clock.advance(Duration::minutes(1));
    assert!(entitlements.needs_verification());
}

/// Sign-out wipes the account but keeps installation-scoped signals
#[test]
fn test_clear_keeps_trial_and_ledger() {
    let (_, _, entitlements) = setup();
    entitlements.save(&SubscriptionRecord::active("pro.monthly", start(), None));
    entitlements.mark_free_trial_used();
    entitlements.record_view();

    entitlements.clear();

    assert_eq!(entitlements.load(), SubscriptionRecord::free());
    assert!(entitlements.needs_verification());
    assert!(entitlements.has_free_trial_been_used());
    assert_eq!(entitlements.remaining_views(), 2);
}

/// A corrupt snapshot never grants access
#[test]
fn test_corrupt_snapshot_fails_closed() {
    let (kv, _, entitlements) = setup();
    kv.set_bytes(keys::SUBSCRIPTION_INFO, b"\xff\xfe not json".to_vec())
        .unwrap();

    assert!(entitlements.store().try_load().is_err());
    assert!(!entitlements.is_premium());
    assert_eq!(entitlements.current_status(), SubscriptionStatus::Free);
    assert!(entitlements.can_access_content(201));
}

/// State written through one file-backed service is visible to the next
#[test]
fn test_file_store_persists_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("entitlements.json");
    let clock = MockClock::new(start());

    {
        let kv = Arc::new(FileStore::open(&path).unwrap());
        let entitlements =
            Entitlements::new(kv, Arc::new(clock.clone()), &EntitlementConfig::default());
        entitlements.save(&SubscriptionRecord::active(
            "pro.monthly",
            start(),
            Some(start() + Duration::hours(1)),
        ));
        entitlements.open_content(305);
    }

    clock.advance(Duration::hours(2));
    let kv = Arc::new(FileStore::open(&path).unwrap());
    let entitlements = Entitlements::new(kv.clone(), Arc::new(clock), &EntitlementConfig::default());

    assert_eq!(entitlements.current_status(), SubscriptionStatus::Expired);
    // Premium at the time, so no free view was spent
    assert_eq!(entitlements.remaining_views(), 3);

    // The healed record was written back to disk
    let reopened = FileStore::open(&path).unwrap();
    let raw = reopened.get_bytes(keys::SUBSCRIPTION_INFO).unwrap().unwrap();
    let persisted: SubscriptionRecord = serde_json::from_slice(&raw).unwrap();
    assert_eq!(persisted.status, SubscriptionStatus::Expired);
}

/// Concurrent views on one handle are never lost
#[test]
fn test_concurrent_views_are_counted() {
    use std::thread;

    let (_, _, entitlements) = setup();
    let num_threads = 8;
    let views_per_thread = 25;

    let handles: Vec<_> = (0..num_threads)
        .map(|_| {
            let entitlements = entitlements.clone();
            thread::spawn(move || {
                for _ in 0..views_per_thread {
                    entitlements.record_view();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(
        entitlements.quota().view_count_today(),
        (num_threads * views_per_thread) as u32
    );
}
