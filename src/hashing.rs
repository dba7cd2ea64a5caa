//! Deterministic salted hashing for OTP codes and session principals.

use base64ct::{Base64, Encoding};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::Error;

type HmacSha256 = Hmac<Sha256>;

/// Compute an HMAC-SHA256 of `value` keyed by the per-account salt and encode
/// the digest as base64.
///
/// Pure function of its inputs: same `(value, salt)` always yields the same
/// output, so stored hashes can be compared without keeping plaintext around.
///
/// # Errors
/// Returns `Error::InvalidInput` for an empty `value` and `Error::EmptySalt`
/// for an empty `salt`; the salt is expected to be validated upstream.
pub fn hash_value(value: &str, salt: &str) -> Result<String, Error> {
    if value.is_empty() {
        return Err(Error::InvalidInput);
    }
    if salt.is_empty() {
        return Err(Error::EmptySalt);
    }

    let mut mac = HmacSha256::new_from_slice(salt.as_bytes()).map_err(|_| Error::Hash)?;
    mac.update(value.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(Base64::encode_string(&digest))
}

/// Constant-time equality for two encoded hashes.
///
/// Comparison cost must not depend on how long a common prefix the inputs
/// share, otherwise an attacker can binary-search the stored OTP hash.
#[must_use]
pub fn hashes_match(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
