//! TOTP multi-factor authentication.
//!
//! Enrollment produces a base32 secret, an `otpauth://` provisioning URI
//! for authenticator apps, and ten single-use backup codes. Storage and
//! consumption of the backup codes belong to the user store, not this
//! crate.
//!
//! Verification accepts a skew of two 30-second steps in either
//! direction to absorb clock drift.

use rand::RngCore;
use serde::Serialize;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::AuthResult;
use crate::error::AuthError;

/// TOTP code length.
const DIGITS: usize = 6;
/// Accepted clock skew, in 30-second steps, in each direction.
const SKEW: u8 = 2;
/// TOTP time step in seconds.
const STEP: u64 = 30;
/// Number of backup codes issued at enrollment.
const BACKUP_CODES: usize = 10;

/// The result of enrolling a user in MFA.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MfaEnrollment {
    /// Base32-encoded shared secret.
    pub secret: String,

    /// `otpauth://` URI for provisioning authenticator apps.
    pub provisioning_uri: String,

    /// Single-use backup codes (8 hex chars, uppercase).
    pub backup_codes: Vec<String>,
}

/// Generates a new MFA enrollment for an account.
///
/// # Errors
///
/// Returns an error if the TOTP parameters are rejected (e.g. an issuer
/// containing `:`).
pub fn generate_enrollment(issuer: &str, account: &str) -> AuthResult<MfaEnrollment> {
    let secret = Secret::generate_secret();
    let secret_bytes = secret
        .to_bytes()
        .map_err(|e| AuthError::internal(format!("TOTP secret generation failed: {e:?}")))?;

    let totp = TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| AuthError::internal(format!("TOTP setup failed: {e:?}")))?;

    Ok(MfaEnrollment {
        secret: secret.to_encoded().to_string(),
        provisioning_uri: totp.get_url(),
        backup_codes: generate_backup_codes(),
    })
}

/// Verifies a TOTP code against a base32 secret with ±2 step skew.
///
/// # Errors
///
/// Returns an error if the stored secret is malformed or the system
/// clock is unavailable.
pub fn verify_code(secret_base32: &str, code: &str) -> AuthResult<bool> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| AuthError::internal(format!("malformed TOTP secret: {e:?}")))?;

    let totp = TOTP::new(
        Algorithm::SHA1,
        DIGITS,
        SKEW,
        STEP,
        secret_bytes,
        None,
        String::new(),
    )
    .map_err(|e| AuthError::internal(format!("TOTP setup failed: {e:?}")))?;

    totp.check_current(code)
        .map_err(|e| AuthError::internal(format!("system clock error: {e}")))
}

/// Generates the backup code set.
fn generate_backup_codes() -> Vec<String> {
    (0..BACKUP_CODES)
        .map(|_| {
            let mut bytes = [0u8; 4];
            rand::thread_rng().fill_bytes(&mut bytes);
            hex::encode(bytes).to_uppercase()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enrollment_shape() {
        let enrollment = generate_enrollment("Hubgate", "ada@example.com").unwrap();

        assert!(!enrollment.secret.is_empty());
        assert!(enrollment.provisioning_uri.starts_with("otpauth://totp/"));
        assert!(enrollment.provisioning_uri.contains("Hubgate"));
        assert_eq!(enrollment.backup_codes.len(), 10);
        for code in &enrollment.backup_codes {
            assert_eq!(code.len(), 8);
            assert!(code.chars().all(|c| c.is_ascii_hexdigit()));
            assert_eq!(*code, code.to_uppercase());
        }
    }

    #[test]
    fn test_enrollments_are_unique() {
        let a = generate_enrollment("Hubgate", "a@example.com").unwrap();
        let b = generate_enrollment("Hubgate", "b@example.com").unwrap();
        assert_ne!(a.secret, b.secret);
        assert_ne!(a.backup_codes, b.backup_codes);
    }

    #[test]
    fn test_current_code_verifies() {
        let enrollment = generate_enrollment("Hubgate", "ada@example.com").unwrap();

        // Compute the current code the way an authenticator app would.
        let secret_bytes = Secret::Encoded(enrollment.secret.clone()).to_bytes().unwrap();
        let totp = TOTP::new(
            Algorithm::SHA1,
            DIGITS,
            SKEW,
            STEP,
            secret_bytes,
            None,
            String::new(),
        )
        .unwrap();
        let code = totp.generate_current().unwrap();

        assert!(verify_code(&enrollment.secret, &code).unwrap());
    }

    #[test]
    fn test_wrong_code_rejected() {
        let enrollment = generate_enrollment("Hubgate", "ada@example.com").unwrap();
        assert!(!verify_code(&enrollment.secret, "000000").unwrap());
    }

    #[test]
    fn test_malformed_secret_errors() {
        assert!(verify_code("not base32 !!!", "123456").is_err());
    }
}
