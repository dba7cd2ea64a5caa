//! Cryptographically secure one-time-password generation.

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};

/// Alphabet for OTP codes: 62 case-sensitive alphanumerics.
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Fixed code length; the code is sent out-of-band and typed back by a human.
const CODE_LENGTH: usize = 8;

// 248 = 62 * 4, the largest multiple of the alphabet size that fits in a
// byte. Draws at or above it are discarded so `byte % 62` stays uniform.
const REJECTION_BOUND: u8 = (u8::MAX / ALPHABET.len() as u8) * ALPHABET.len() as u8;

/// Generate an 8-character OTP drawn uniformly from `[A-Za-z0-9]`.
///
/// Each character is an independent draw from the OS random source; biased
/// tail bytes are redrawn rather than folded in.
///
/// # Errors
/// Returns an error if the OS random source fails.
pub fn generate() -> Result<String> {
    let mut code = String::with_capacity(CODE_LENGTH);
    let mut byte = [0u8; 1];

    while code.len() < CODE_LENGTH {
        OsRng
            .try_fill_bytes(&mut byte)
            .context("failed to draw OTP randomness")?;
        if byte[0] < REJECTION_BOUND {
            code.push(char::from(ALPHABET[usize::from(byte[0]) % ALPHABET.len()]));
        }
    }

    Ok(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_bound_is_a_multiple_of_the_alphabet() {
        assert_eq!(usize::from(REJECTION_BOUND) % ALPHABET.len(), 0);
        assert_eq!(REJECTION_BOUND, 248);
    }

    #[test]
    fn generated_codes_have_fixed_length_and_alphabet() -> Result<()> {
        for _ in 0..1_000 {
            let code = generate()?;
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| ALPHABET.contains(&b)));
        }
        Ok(())
    }

    #[test]
    fn generated_codes_are_not_constant() -> Result<()> {
        let first = generate()?;
        // 62^8 possibilities; ten draws colliding with the first would mean
        // the random source is broken.
        let repeated = (0..10).try_fold(true, |all_equal, _| {
            generate().map(|code| all_equal && code == first)
        })?;
        assert!(!repeated);
        Ok(())
    }

    #[test]
    fn character_distribution_passes_chi_square_sanity_check() -> Result<()> {
        let mut counts = [0u64; 62];
        let samples = 10_000;
        for _ in 0..samples {
            for byte in generate()?.bytes() {
                if let Some(index) = ALPHABET.iter().position(|&c| c == byte) {
                    counts[index] += 1;
                }
            }
        }

        let draws = (samples * CODE_LENGTH) as f64;
        let expected = draws / ALPHABET.len() as f64;
        let chi_square: f64 = counts
            .iter()
            .map(|&observed| {
                let delta = observed as f64 - expected;
                delta * delta / expected
            })
            .sum();

        // 61 degrees of freedom; 150 is far beyond any plausible critical
        // value, so only a genuinely biased generator trips this.
        assert!(
            chi_square < 150.0,
            "chi-square statistic too high: {chi_square}"
        );
        Ok(())
    }
}
