//! The authentication state machine: guards, lockout, challenge, decision.

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use secrecy::ExposeSecret;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::hashing;
use crate::lockout;
use crate::otp;
use crate::store::CredentialStore;
use crate::types::{AuthenticationRequest, Outcome, RejectReason, SessionPrincipal};

/// Orchestrates one authentication pass per call. Retries are the caller's
/// job: a `Pending` outcome means "come back with the code".
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    clock: Arc<dyn Clock>,
}

/// Whether a usable challenge is outstanding once expiry has been applied.
enum Challenge {
    None,
    Pending { expected_hash: String },
}

impl Authenticator {
    #[must_use]
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    #[must_use]
    pub fn with_system_clock(store: Arc<dyn CredentialStore>) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    /// Run the full flow for one request.
    ///
    /// `Ok(Outcome::Rejected(_))` is a decision; `Err(_)` is a store failure.
    /// The two are kept apart so an outage never masquerades as a lockout.
    ///
    /// # Errors
    /// Returns an error if any credential store operation fails.
    pub async fn authenticate(&self, request: &AuthenticationRequest) -> Result<Outcome> {
        // Guards collapse into one generic rejection so a caller probing the
        // flow cannot tell an unknown account from a malformed identity.
        let Some(identity) = normalize_identity(&request.identity) else {
            debug!("rejecting request with malformed identity");
            return Ok(Outcome::Rejected(RejectReason::InvalidCredentials));
        };
        if !self.store.exists(&identity).await? {
            debug!("rejecting request for unknown identity");
            return Ok(Outcome::Rejected(RejectReason::InvalidCredentials));
        }
        if self.store.has_active_session(&identity).await? {
            debug!("rejecting request for already-authenticated identity");
            return Ok(Outcome::Rejected(RejectReason::InvalidCredentials));
        }

        if !self.store.is_enabled(&identity).await? {
            return Ok(Outcome::Rejected(RejectReason::AccountDisabled));
        }

        let now = self.clock.now();
        self.expire_stale_failures(&identity, now).await?;

        let challenge = self.current_challenge(&identity, now).await?;
        match challenge {
            Challenge::None => self.issue_challenge(&identity, now).await,
            Challenge::Pending { expected_hash } => {
                self.verify_challenge(&identity, &expected_hash, request, now)
                    .await
            }
        }
    }

    /// Re-verify a presented principal against the stored session row.
    ///
    /// Recomputes the principal hash from the presented identity and role
    /// with the account's salt and compares it, constant-time, to the hash
    /// recorded when the session was issued. A tampered role or identity,
    /// or a session that has since ended, yields `false`.
    ///
    /// # Errors
    /// Returns an error if any credential store operation fails.
    pub async fn validate_principal(&self, principal: &SessionPrincipal) -> Result<bool> {
        let Some(identity) = normalize_identity(&principal.identity) else {
            return Ok(false);
        };
        let Some(stored_hash) = self.store.get_session_principal_hash(&identity).await? else {
            return Ok(false);
        };
        let salt = self.store.get_salt(&identity).await?;
        let recomputed = hashing::hash_value(
            &format!("{identity}|{role}", role = principal.role),
            salt.expose_secret(),
        )?;
        Ok(hashing::hashes_match(&recomputed, &stored_hash))
    }

    /// End the active session for an identity, if any.
    ///
    /// # Errors
    /// Returns `Error::InvalidInput` for a malformed identity, or any store
    /// failure.
    pub async fn deauthenticate(&self, identity: &str) -> Result<()> {
        let Some(identity) = normalize_identity(identity) else {
            return Err(Error::InvalidInput.into());
        };
        self.store.remove_session_principal_hash(&identity).await
    }

    /// Reset the failure counters once the 24-hour window has fully elapsed.
    /// Counts below the threshold inside the window just keep accumulating;
    /// counts at the threshold only exist on disabled accounts, which were
    /// rejected before this point.
    async fn expire_stale_failures(&self, identity: &str, now: DateTime<Utc>) -> Result<()> {
        let failures = self.store.get_failure_state(identity).await?;
        if let Some(first_failure_at) = failures.first_failure_at {
            if lockout::needs_reset(first_failure_at, now) {
                debug!(count = failures.count, "failure window elapsed, resetting");
                self.store.reset_failures(identity).await?;
            }
        }
        Ok(())
    }

    /// Apply OTP expiry, then report whether a live challenge remains.
    async fn current_challenge(&self, identity: &str, now: DateTime<Utc>) -> Result<Challenge> {
        let state = self.store.get_otp_state(identity).await?;
        match (state.pending_hash(), state.issued_at) {
            (Some(hash), Some(issued_at)) => {
                if lockout::otp_expired(issued_at, now) {
                    // An expired OTP is equivalent to no OTP at all.
                    self.store.clear_otp(identity).await?;
                    Ok(Challenge::None)
                } else {
                    Ok(Challenge::Pending {
                        expected_hash: hash.to_string(),
                    })
                }
            }
            _ => Ok(Challenge::None),
        }
    }

    /// Generate and persist a fresh challenge. The plaintext code leaves this
    /// function only through the out-of-band delivery path, never the return
    /// value or the logs.
    async fn issue_challenge(&self, identity: &str, now: DateTime<Utc>) -> Result<Outcome> {
        let salt = self.store.get_salt(identity).await?;
        let code = otp::generate()?;
        let hash = hashing::hash_value(&code, salt.expose_secret())?;
        self.store.set_otp(identity, &hash, now).await?;
        debug!("issued new OTP challenge");
        Ok(Outcome::Pending)
    }

    /// Compare the caller's proof against the pending challenge and settle
    /// the attempt.
    async fn verify_challenge(
        &self,
        identity: &str,
        expected_hash: &str,
        request: &AuthenticationRequest,
        now: DateTime<Utc>,
    ) -> Result<Outcome> {
        let salt = self.store.get_salt(identity).await?;
        let proof = request.proof.expose_secret();
        let submitted_hash = match hashing::hash_value(proof, salt.expose_secret()) {
            Ok(hash) => hash,
            Err(Error::InvalidInput) => {
                // An absent proof is bad input, not a failed guess; it does
                // not burn one of the three attempts.
                debug!("rejecting request with empty proof");
                return Ok(Outcome::Rejected(RejectReason::InvalidCredentials));
            }
            Err(err) => return Err(err.into()),
        };

        if !hashing::hashes_match(&submitted_hash, expected_hash) {
            return self.settle_failure(identity, now).await;
        }

        // Counters reset and the OTP is consumed before the principal is
        // issued; the code is single-use even if the insert below loses.
        self.store.reset_failures(identity).await?;
        self.store.clear_otp(identity).await?;

        let role = self.store.get_role(identity).await?;
        let principal_hash =
            hashing::hash_value(&format!("{identity}|{role}"), salt.expose_secret())?;
        if !self
            .store
            .insert_session_principal_hash(identity, &principal_hash)
            .await?
        {
            debug!("lost principal insert race, rejecting");
            return Ok(Outcome::Rejected(RejectReason::AlreadyAuthenticated));
        }

        debug!("authentication succeeded");
        Ok(Outcome::Authenticated(SessionPrincipal {
            identity: identity.to_string(),
            role,
            principal_hash,
        }))
    }

    async fn settle_failure(&self, identity: &str, now: DateTime<Utc>) -> Result<Outcome> {
        let count = self.store.record_failure(identity, now).await?;
        if lockout::is_over_threshold(count) {
            // The pending OTP is deliberately left in place; the disabled
            // account cannot use it either way.
            warn!(count, "failure threshold reached, disabling account");
            self.store.disable(identity).await?;
        } else {
            debug!(count, "OTP mismatch recorded");
        }
        Ok(Outcome::Rejected(RejectReason::InvalidOtp))
    }
}

/// Trim and case-fold the submitted identity, returning it only when it is
/// well-formed: at least 8 characters of alphanumerics plus `.`, `-`, `@`.
pub(crate) fn normalize_identity(raw: &str) -> Option<String> {
    let identity = raw.trim().to_lowercase();
    if valid_identity(&identity) {
        Some(identity)
    } else {
        None
    }
}

fn valid_identity(identity_normalized: &str) -> bool {
    Regex::new(r"^[a-z0-9.\-@]{8,}$").is_ok_and(|regex| regex.is_match(identity_normalized))
}
