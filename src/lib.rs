//! # Custodia (OTP Authentication Core)
//!
//! `custodia` authenticates an identity via a one-time-password (OTP)
//! challenge layered on a stored per-account secret salt, and enforces an
//! account lockout policy after repeated failures.
//!
//! ## Flow
//!
//! A caller submits an [`AuthenticationRequest`] to the [`Authenticator`].
//! One pass through the state machine yields an [`Outcome`]:
//!
//! - **`Pending`** — no challenge was outstanding, so a fresh OTP was
//!   generated, hashed with the account salt, and persisted. The caller
//!   delivers the code out-of-band and re-invokes the flow with the proof.
//! - **`Authenticated`** — the proof matched; a [`SessionPrincipal`] was
//!   issued and its hash recorded to block duplicate sessions.
//! - **`Rejected`** — the attempt was refused. The structured
//!   [`RejectReason`] is for the embedder's logs; the public message stays
//!   deliberately generic to prevent account enumeration.
//!
//! ## Policy (contract values, not configuration)
//!
//! - Failures accumulate for **24 hours** from the first miss; the **third**
//!   consecutive failure disables the account.
//! - An issued OTP is valid for **2 minutes** and is single-use.
//! - Both windows expire on strictly-greater-than comparisons.
//!
//! ## Storage & time
//!
//! Durable facts live behind the [`store::CredentialStore`] trait: a
//! Postgres implementation for production and an in-memory one for tests and
//! single-process embedding. The store owns atomicity; in particular, the
//! session principal insert is conditional so two racing attempts cannot
//! both issue a principal. Time comes from an injected [`Clock`], so every
//! window boundary is testable to the second.
//!
//! Store I/O failures surface as `Err(_)` from [`Authenticator::authenticate`]
//! and are never folded into a rejection — an outage must not look like a
//! lockout.

pub mod clock;
pub mod coordinator;
pub mod error;
pub mod hashing;
pub mod lockout;
pub mod otp;
pub mod store;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::Authenticator;
pub use error::Error;
pub use types::{AuthenticationRequest, Outcome, RejectReason, SessionPrincipal};
