//! Error types for the entitlement core.
//!
//! Nothing in the infallible public API returns these: every failure there
//! degrades to the least-privileged default. The `try_*` variants surface them
//! so callers and tests can observe what went wrong.

/// Errors raised while persisting or interpreting entitlement state
#[derive(Debug, thiserror::Error)]
pub enum EntitlementError {
    /// A value could not be encoded or decoded
    #[error("Serialization failed for `{key}`: {reason}")]
    Serialization { key: String, reason: String },

    /// The key-value collaborator failed to read or write
    #[error("Storage error: {0}")]
    Storage(String),

    /// A stored value had a different type than expected
    #[error("Key `{key}` holds a {found} value, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// A guard was poisoned by a panicking holder
    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EntitlementError {
    pub(crate) fn serialization(key: &str, reason: impl std::fmt::Display) -> Self {
        Self::Serialization {
            key: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<std::io::Error> for EntitlementError {
    fn from(err: std::io::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Result alias used throughout the crate
pub type EntitlementResult<T> = Result<T, EntitlementError>;
