//! Data contracts shared between the coordinator, the store, and callers.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// What a caller submits: who they claim to be, and the OTP they claim to
/// know. The proof is wrapped so it never shows up in `Debug` output or logs.
#[derive(Clone, Debug)]
pub struct AuthenticationRequest {
    pub identity: String,
    pub proof: SecretString,
}

impl AuthenticationRequest {
    #[must_use]
    pub fn new(identity: impl Into<String>, proof: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            proof: SecretString::from(proof.into()),
        }
    }
}

/// The principal issued on successful authentication. The hash (not the
/// principal itself) is what the store keeps to detect duplicate sessions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPrincipal {
    pub identity: String,
    pub role: String,
    pub principal_hash: String,
}

impl SessionPrincipal {
    /// Case-sensitive role membership check.
    #[must_use]
    pub fn is_in_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// Whether the principal holds any of the given roles. An empty set
    /// authorizes nobody.
    #[must_use]
    pub fn is_in_any_role<'a, I>(&self, roles: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        roles.into_iter().any(|role| self.is_in_role(role))
    }
}

/// Terminal result of one pass through the authentication flow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Proof matched; the caller now holds a session principal.
    Authenticated(SessionPrincipal),
    /// A fresh OTP was issued; the caller must retry with the code in hand.
    Pending,
    /// The attempt was refused. The reason is structured for the embedding
    /// caller's logs; the public message stays deliberately vague.
    Rejected(RejectReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectReason {
    /// Malformed identity, unknown account, or an already-authenticated
    /// identity at the guard stage. Collapsed into one variant so callers
    /// cannot enumerate accounts by probing.
    InvalidCredentials,
    /// The account is disabled; recovery happens outside this flow.
    AccountDisabled,
    /// The submitted proof did not match the pending OTP.
    InvalidOtp,
    /// Lost the race to insert the session principal hash.
    AlreadyAuthenticated,
}

impl RejectReason {
    /// Message safe to surface to the caller.
    #[must_use]
    pub const fn public_message(self) -> &'static str {
        match self {
            Self::InvalidCredentials => "invalid credentials or state",
            Self::AccountDisabled => "account disabled",
            Self::InvalidOtp => "invalid OTP",
            Self::AlreadyAuthenticated => "already authenticated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn request_debug_redacts_proof() {
        let request = AuthenticationRequest::new("user@example.com", "Aa12Bb34");
        let rendered = format!("{request:?}");
        assert!(!rendered.contains("Aa12Bb34"));
        assert_eq!(request.proof.expose_secret(), "Aa12Bb34");
    }

    #[test]
    fn principal_role_check_is_case_sensitive() {
        let principal = SessionPrincipal {
            identity: "user@example.com".to_string(),
            role: "auditor".to_string(),
            principal_hash: "hash".to_string(),
        };
        assert!(principal.is_in_role("auditor"));
        assert!(!principal.is_in_role("Auditor"));
        assert!(!principal.is_in_role("admin"));
    }

    #[test]
    fn any_role_check_needs_one_match() {
        let principal = SessionPrincipal {
            identity: "user@example.com".to_string(),
            role: "auditor".to_string(),
            principal_hash: "hash".to_string(),
        };
        assert!(principal.is_in_any_role(["viewer", "auditor"]));
        assert!(!principal.is_in_any_role(["viewer", "admin"]));
        assert!(!principal.is_in_any_role([]));
    }

    #[test]
    fn public_messages_stay_generic() {
        assert_eq!(
            RejectReason::InvalidCredentials.public_message(),
            "invalid credentials or state"
        );
        assert_eq!(
            RejectReason::AccountDisabled.public_message(),
            "account disabled"
        );
        assert_eq!(RejectReason::InvalidOtp.public_message(), "invalid OTP");
        assert_eq!(
            RejectReason::AlreadyAuthenticated.public_message(),
            "already authenticated"
        );
    }
}
