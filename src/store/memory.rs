//! In-memory credential store for tests and single-process embedding.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{CredentialStore, FailureState, OtpState};

/// Initial account facts. OTP and failure fields always start clear; the
/// flow under test is what populates them.
#[derive(Clone, Debug)]
pub struct AccountSeed {
    pub identity: String,
    pub otp_salt: String,
    pub role: String,
    pub enabled: bool,
}

impl AccountSeed {
    #[must_use]
    pub fn new(
        identity: impl Into<String>,
        otp_salt: impl Into<String>,
        role: impl Into<String>,
    ) -> Self {
        Self {
            identity: identity.into(),
            otp_salt: otp_salt.into(),
            role: role.into(),
            enabled: true,
        }
    }
}

#[derive(Clone, Debug)]
struct AccountRow {
    otp_salt: String,
    otp_hash: Option<String>,
    otp_issued_at: Option<DateTime<Utc>>,
    enabled: bool,
    first_failure_at: Option<DateTime<Utc>>,
    failure_count: u32,
    role: String,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, AccountRow>,
    sessions: HashMap<String, String>,
}

/// One mutex over both maps, so every store operation is atomic with respect
/// to concurrent attempts, matching what the Postgres implementation gets
/// from single-statement updates.
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_account(&self, seed: AccountSeed) {
        let mut inner = self.inner.lock().await;
        inner.accounts.insert(
            seed.identity,
            AccountRow {
                otp_salt: seed.otp_salt,
                otp_hash: None,
                otp_issued_at: None,
                enabled: seed.enabled,
                first_failure_at: None,
                failure_count: 0,
                role: seed.role,
            },
        );
    }

}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn exists(&self, identity: &str) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.accounts.contains_key(identity))
    }

    async fn has_active_session(&self, identity: &str) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner.sessions.contains_key(identity))
    }

    async fn is_enabled(&self, identity: &str) -> Result<bool> {
        let inner = self.inner.lock().await;
        Ok(inner
            .accounts
            .get(identity)
            .is_some_and(|account| account.enabled))
    }

    async fn disable(&self, identity: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(account) = inner.accounts.get_mut(identity) {
            account.enabled = false;
        }
        Ok(())
    }

    async fn get_otp_state(&self, identity: &str) -> Result<OtpState> {
        let inner = self.inner.lock().await;
        Ok(inner
            .accounts
            .get(identity)
            .map_or_else(OtpState::default, |account| OtpState {
                hash: account.otp_hash.clone(),
                issued_at: account.otp_issued_at,
            }))
    }

    async fn set_otp(&self, identity: &str, hash: &str, issued_at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.lock().await;
        let Some(account) = inner.accounts.get_mut(identity) else {
            bail!("unknown account: {identity}");
        };
        account.otp_hash = Some(hash.to_string());
        account.otp_issued_at = Some(issued_at);
        Ok(())
    }

    async fn clear_otp(&self, identity: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(account) = inner.accounts.get_mut(identity) {
            account.otp_hash = None;
            account.otp_issued_at = None;
        }
        Ok(())
    }

    async fn get_failure_state(&self, identity: &str) -> Result<FailureState> {
        let inner = self.inner.lock().await;
        Ok(inner
            .accounts
            .get(identity)
            .map_or_else(FailureState::default, |account| FailureState {
                first_failure_at: account.first_failure_at,
                count: account.failure_count,
            }))
    }

    async fn record_failure(&self, identity: &str, observed_at: DateTime<Utc>) -> Result<u32> {
        let mut inner = self.inner.lock().await;
        let Some(account) = inner.accounts.get_mut(identity) else {
            bail!("unknown account: {identity}");
        };
        account.failure_count += 1;
        if account.first_failure_at.is_none() {
            account.first_failure_at = Some(observed_at);
        }
        Ok(account.failure_count)
    }

    async fn reset_failures(&self, identity: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(account) = inner.accounts.get_mut(identity) {
            account.failure_count = 0;
            account.first_failure_at = None;
        }
        Ok(())
    }

    async fn get_salt(&self, identity: &str) -> Result<SecretString> {
        let inner = self.inner.lock().await;
        let Some(account) = inner.accounts.get(identity) else {
            bail!("unknown account: {identity}");
        };
        if account.otp_salt.is_empty() {
            bail!("account salt is missing or empty");
        }
        Ok(SecretString::from(account.otp_salt.clone()))
    }

    async fn get_role(&self, identity: &str) -> Result<String> {
        let inner = self.inner.lock().await;
        let Some(account) = inner.accounts.get(identity) else {
            bail!("unknown account: {identity}");
        };
        Ok(account.role.clone())
    }

    async fn get_session_principal_hash(&self, identity: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner.sessions.get(identity).cloned())
    }

    async fn insert_session_principal_hash(&self, identity: &str, hash: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if inner.sessions.contains_key(identity) {
            return Ok(false);
        }
        inner
            .sessions
            .insert(identity.to_string(), hash.to_string());
        Ok(true)
    }

    async fn remove_session_principal_hash(&self, identity: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.sessions.remove(identity);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;
    use secrecy::ExposeSecret;

    #[tokio::test]
    async fn unknown_identity_reads_are_absent_not_errors() -> Result<()> {
        let store = MemoryCredentialStore::new();
        assert!(!store.exists("ghost@example.com").await?);
        assert!(!store.has_active_session("ghost@example.com").await?);
        assert!(!store.is_enabled("ghost@example.com").await?);
        assert_eq!(
            store.get_otp_state("ghost@example.com").await?,
            OtpState::default()
        );
        assert_eq!(
            store.get_failure_state("ghost@example.com").await?,
            FailureState::default()
        );
        Ok(())
    }

    #[tokio::test]
    async fn record_failure_sets_first_timestamp_only_once() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store
            .insert_account(AccountSeed::new("user@example.com", "salt", "member"))
            .await;

        let first_at = Utc::now();
        assert_eq!(store.record_failure("user@example.com", first_at).await?, 1);

        let later = first_at + TimeDelta::minutes(5);
        assert_eq!(store.record_failure("user@example.com", later).await?, 2);

        let state = store.get_failure_state("user@example.com").await?;
        assert_eq!(state.count, 2);
        assert_eq!(state.first_failure_at, Some(first_at));
        Ok(())
    }

    #[tokio::test]
    async fn reset_failures_clears_both_fields_together() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store
            .insert_account(AccountSeed::new("user@example.com", "salt", "member"))
            .await;
        store.record_failure("user@example.com", Utc::now()).await?;

        store.reset_failures("user@example.com").await?;
        assert_eq!(
            store.get_failure_state("user@example.com").await?,
            FailureState::default()
        );
        Ok(())
    }

    #[tokio::test]
    async fn principal_hash_insert_is_conditional() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store
            .insert_account(AccountSeed::new("user@example.com", "salt", "member"))
            .await;

        assert!(
            store
                .insert_session_principal_hash("user@example.com", "hash-a")
                .await?
        );
        // Second writer loses; the stored hash is untouched.
        assert!(
            !store
                .insert_session_principal_hash("user@example.com", "hash-b")
                .await?
        );
        assert_eq!(
            store.get_session_principal_hash("user@example.com").await?,
            Some("hash-a".to_string())
        );

        store
            .remove_session_principal_hash("user@example.com")
            .await?;
        assert!(!store.has_active_session("user@example.com").await?);
        Ok(())
    }

    #[tokio::test]
    async fn salt_is_exposed_only_on_demand() -> Result<()> {
        let store = MemoryCredentialStore::new();
        store
            .insert_account(AccountSeed::new("user@example.com", "pepper", "member"))
            .await;
        let salt = store.get_salt("user@example.com").await?;
        assert_eq!(salt.expose_secret(), "pepper");
        Ok(())
    }
}
