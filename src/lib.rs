//! # Content Entitlements
//!
//! Local entitlement store for a content-access application.
//!
//! ## Features
//! - Subscription snapshots persisted through a pluggable key-value store
//! - Expiry normalization on read (a lapsed `active` record heals to `expired`)
//! - 24-hour re-verification cadence
//! - Daily free-view quota with a 7-day rolling ledger
//! - Access decisions combining tier, content track and quota
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use content_entitlements::{initialize, EntitlementConfig};
//!
//! let entitlements = initialize(EntitlementConfig::default()).unwrap();
//! if entitlements.can_access_content(305) {
//!     entitlements.open_content(305);
//! }
//! ```

pub mod access;
pub mod clock;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod quota;
pub mod service;
pub mod storage;
pub mod subscription;

pub use access::{is_premium_level, is_premium_track, track_of, AccessDecision, AccessPolicy};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{EntitlementConfig, QuotaConfig, StorageConfig, VerificationConfig};
pub use entitlement::EntitlementStore;
pub use error::{EntitlementError, EntitlementResult};
pub use quota::{FreeViewLedger, FreeViewQuotaTracker, RETENTION_DAYS};
pub use service::Entitlements;
pub use storage::{keys, FileStore, KeyValueStore, MemoryStore, StoredValue};
pub use subscription::{SubscriptionRecord, SubscriptionStatus};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build the process-wide entitlement service. Call once at startup and share
/// the handle.
pub fn initialize(config: EntitlementConfig) -> EntitlementResult<Entitlements> {
    tracing::info!("Content entitlements v{}", VERSION);
    Entitlements::from_config(&config)
}
