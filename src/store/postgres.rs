//! Postgres-backed credential store.
//!
//! Expected schema:
//!
//! ```sql
//! CREATE TABLE user_accounts (
//!     identity          TEXT PRIMARY KEY,
//!     otp_salt          TEXT NOT NULL,
//!     otp_hash          TEXT,
//!     otp_issued_at     TIMESTAMPTZ,
//!     enabled           BOOLEAN NOT NULL DEFAULT TRUE,
//!     first_failure_at  TIMESTAMPTZ,
//!     failure_count     INTEGER NOT NULL DEFAULT 0,
//!     role              TEXT NOT NULL
//! );
//!
//! CREATE TABLE session_principal_hashes (
//!     identity        TEXT PRIMARY KEY REFERENCES user_accounts (identity),
//!     principal_hash  TEXT NOT NULL,
//!     created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
//! );
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{CredentialStore, FailureState, OtpState};

#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn query_span(operation: &str, statement: &str) -> tracing::Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn exists(&self, identity: &str) -> Result<bool> {
        let query = "SELECT 1 FROM user_accounts WHERE identity = $1";
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check account existence")?;
        Ok(row.is_some())
    }

    async fn has_active_session(&self, identity: &str) -> Result<bool> {
        let query = "SELECT 1 FROM session_principal_hashes WHERE identity = $1";
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check active session")?;
        Ok(row.is_some())
    }

    async fn is_enabled(&self, identity: &str) -> Result<bool> {
        let query = "SELECT enabled FROM user_accounts WHERE identity = $1";
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to check account status")?;
        Ok(row.is_some_and(|row| row.get("enabled")))
    }

    async fn disable(&self, identity: &str) -> Result<()> {
        let query = "UPDATE user_accounts SET enabled = FALSE WHERE identity = $1";
        sqlx::query(query)
            .bind(identity)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to disable account")?;
        Ok(())
    }

    async fn get_otp_state(&self, identity: &str) -> Result<OtpState> {
        let query = "SELECT otp_hash, otp_issued_at FROM user_accounts WHERE identity = $1";
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to fetch OTP state")?;
        Ok(row.map_or_else(OtpState::default, |row| OtpState {
            hash: row.get("otp_hash"),
            issued_at: row.get("otp_issued_at"),
        }))
    }

    async fn set_otp(&self, identity: &str, hash: &str, issued_at: DateTime<Utc>) -> Result<()> {
        // Single statement keeps hash and timestamp set together.
        let query = r"
            UPDATE user_accounts
            SET otp_hash = $2, otp_issued_at = $3
            WHERE identity = $1
        ";
        sqlx::query(query)
            .bind(identity)
            .bind(hash)
            .bind(issued_at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to store OTP hash")?;
        Ok(())
    }

    async fn clear_otp(&self, identity: &str) -> Result<()> {
        let query = r"
            UPDATE user_accounts
            SET otp_hash = NULL, otp_issued_at = NULL
            WHERE identity = $1
        ";
        sqlx::query(query)
            .bind(identity)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to clear OTP")?;
        Ok(())
    }

    async fn get_failure_state(&self, identity: &str) -> Result<FailureState> {
        let query = "SELECT first_failure_at, failure_count FROM user_accounts WHERE identity = $1";
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to fetch failure state")?;
        match row {
            Some(row) => {
                let count: i32 = row.get("failure_count");
                Ok(FailureState {
                    first_failure_at: row.get("first_failure_at"),
                    count: u32::try_from(count).context("negative failure count in store")?,
                })
            }
            None => Ok(FailureState::default()),
        }
    }

    async fn record_failure(&self, identity: &str, observed_at: DateTime<Utc>) -> Result<u32> {
        // COALESCE preserves the timestamp of the oldest failure in the run;
        // RETURNING avoids a second read racing other attempts.
        let query = r"
            UPDATE user_accounts
            SET failure_count = failure_count + 1,
                first_failure_at = COALESCE(first_failure_at, $2)
            WHERE identity = $1
            RETURNING failure_count
        ";
        let row = sqlx::query(query)
            .bind(identity)
            .bind(observed_at)
            .fetch_one(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to record authentication failure")?;
        let count: i32 = row.get("failure_count");
        u32::try_from(count).context("negative failure count in store")
    }

    async fn reset_failures(&self, identity: &str) -> Result<()> {
        let query = r"
            UPDATE user_accounts
            SET failure_count = 0, first_failure_at = NULL
            WHERE identity = $1
        ";
        sqlx::query(query)
            .bind(identity)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to reset authentication failures")?;
        Ok(())
    }

    async fn get_salt(&self, identity: &str) -> Result<SecretString> {
        let query = "SELECT otp_salt FROM user_accounts WHERE identity = $1";
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to fetch account salt")?;
        let salt: String = row.get("otp_salt");
        if salt.is_empty() {
            anyhow::bail!("account salt is missing or empty");
        }
        Ok(SecretString::from(salt))
    }

    async fn get_role(&self, identity: &str) -> Result<String> {
        let query = "SELECT role FROM user_accounts WHERE identity = $1";
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_one(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to fetch account role")?;
        Ok(row.get("role"))
    }

    async fn get_session_principal_hash(&self, identity: &str) -> Result<Option<String>> {
        let query = "SELECT principal_hash FROM session_principal_hashes WHERE identity = $1";
        let row = sqlx::query(query)
            .bind(identity)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to fetch session principal hash")?;
        Ok(row.map(|row| row.get("principal_hash")))
    }

    async fn insert_session_principal_hash(&self, identity: &str, hash: &str) -> Result<bool> {
        // The primary key on identity makes this a conditional insert; a
        // unique violation means another attempt already issued a principal.
        let query = r"
            INSERT INTO session_principal_hashes (identity, principal_hash)
            VALUES ($1, $2)
        ";
        let result = sqlx::query(query)
            .bind(identity)
            .bind(hash)
            .execute(&self.pool)
            .instrument(query_span("INSERT", query))
            .await;
        match result {
            Ok(_) => Ok(true),
            Err(err) if is_unique_violation(&err) => Ok(false),
            Err(err) => Err(err).context("failed to insert session principal hash"),
        }
    }

    async fn remove_session_principal_hash(&self, identity: &str) -> Result<()> {
        // Deauthentication is idempotent; deleting zero rows is fine.
        let query = "DELETE FROM session_principal_hashes WHERE identity = $1";
        sqlx::query(query)
            .bind(identity)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to remove session principal hash")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::error::{DatabaseError, ErrorKind};
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::fmt;

    #[derive(Debug)]
    struct FakeDbError {
        code: Option<&'static str>,
    }

    impl fmt::Display for FakeDbError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "fake database error")
        }
    }

    impl StdError for FakeDbError {}

    impl DatabaseError for FakeDbError {
        fn message(&self) -> &'static str {
            "fake database error"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            self.code.map(Cow::Borrowed)
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::UniqueViolation
        }
    }

    #[test]
    fn unique_violation_detection_matches_sqlstate() {
        let err = sqlx::Error::Database(Box::new(FakeDbError {
            code: Some("23505"),
        }));
        assert!(is_unique_violation(&err));

        let err = sqlx::Error::Database(Box::new(FakeDbError {
            code: Some("42601"),
        }));
        assert!(!is_unique_violation(&err));

        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
