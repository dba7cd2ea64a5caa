//! Pure lockout and expiry policy. No I/O, no state; just the contract values.

use chrono::{DateTime, TimeDelta, Utc};

/// Consecutive failures tolerated before the account is disabled.
pub const MAX_FAILED_ATTEMPTS: u32 = 3;

/// How long a run of failures keeps counting toward the threshold.
#[must_use]
pub fn lockout_window() -> TimeDelta {
    TimeDelta::hours(24)
}

/// How long an issued OTP stays valid.
#[must_use]
pub fn otp_ttl() -> TimeDelta {
    TimeDelta::minutes(2)
}

/// True once the failure window has fully elapsed and the counters should be
/// reset. Exactly 24 hours is still inside the window; strictly more is not.
#[must_use]
pub fn needs_reset(first_failure_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - first_failure_at > lockout_window()
}

/// True when the failure count has reached the disable threshold.
#[must_use]
pub fn is_over_threshold(failure_count: u32) -> bool {
    failure_count >= MAX_FAILED_ATTEMPTS
}

/// True once a pending OTP has outlived its validity. Exactly 2 minutes is
/// still fresh; strictly more is expired.
#[must_use]
pub fn otp_expired(issued_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - issued_at > otp_ttl()
}
