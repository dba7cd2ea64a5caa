//! Durable account and session facts, consumed by the coordinator.
//!
//! Implementations own atomicity: every mutation here must be a single
//! atomic write against the backing storage, and
//! `insert_session_principal_hash` must be a conditional insert so two racing
//! authentication attempts cannot both issue a principal for one identity.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;

pub mod memory;
pub mod postgres;

pub use memory::{AccountSeed, MemoryCredentialStore};
pub use postgres::PgCredentialStore;

/// The pending-challenge fields of an account. Both are set while a
/// challenge is outstanding, both are null otherwise; never one without the
/// other.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OtpState {
    pub hash: Option<String>,
    pub issued_at: Option<DateTime<Utc>>,
}

impl OtpState {
    /// The hash of the currently pending challenge, if one is outstanding.
    #[must_use]
    pub fn pending_hash(&self) -> Option<&str> {
        match (&self.hash, &self.issued_at) {
            (Some(hash), Some(_)) => Some(hash),
            _ => None,
        }
    }
}

/// Consecutive-failure bookkeeping. `first_failure_at` is null exactly when
/// `count` is zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FailureState {
    pub first_failure_at: Option<DateTime<Utc>>,
    pub count: u32,
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Whether an account row exists for this identity.
    async fn exists(&self, identity: &str) -> Result<bool>;

    /// Whether a session principal hash is already recorded for this
    /// identity.
    async fn has_active_session(&self, identity: &str) -> Result<bool>;

    async fn is_enabled(&self, identity: &str) -> Result<bool>;

    /// Disable the account. Used when failures cross the lockout threshold.
    async fn disable(&self, identity: &str) -> Result<()>;

    async fn get_otp_state(&self, identity: &str) -> Result<OtpState>;

    /// Persist a freshly issued challenge: hash and issuance timestamp in one
    /// write.
    async fn set_otp(&self, identity: &str, hash: &str, issued_at: DateTime<Utc>) -> Result<()>;

    /// Clear both OTP fields in one write (expiry, or single-use consumption).
    async fn clear_otp(&self, identity: &str) -> Result<()>;

    async fn get_failure_state(&self, identity: &str) -> Result<FailureState>;

    /// Record one failed attempt atomically: always increments the count,
    /// sets `first_failure_at` to `observed_at` only when currently null, and
    /// returns the count after the increment so the caller can decide on the
    /// disable side effect without a second racing read.
    async fn record_failure(&self, identity: &str, observed_at: DateTime<Utc>) -> Result<u32>;

    /// Zero the count and null the first-failure timestamp in one write.
    /// A partial reset is a correctness bug, not a degraded mode.
    async fn reset_failures(&self, identity: &str) -> Result<()>;

    async fn get_salt(&self, identity: &str) -> Result<SecretString>;

    async fn get_role(&self, identity: &str) -> Result<String>;

    /// The recorded session principal hash, if a session is active.
    async fn get_session_principal_hash(&self, identity: &str) -> Result<Option<String>>;

    /// Conditional insert of the session principal hash. Returns `false`
    /// when a row already exists for the identity, which means another
    /// attempt won the race; the caller must not treat that as success.
    async fn insert_session_principal_hash(&self, identity: &str, hash: &str) -> Result<bool>;

    /// Remove the session principal hash, ending the active session.
    async fn remove_session_principal_hash(&self, identity: &str) -> Result<()>;
}
