//! PKCE (RFC 7636), S256 method only.
//!
//! The `plain` method is forbidden: a challenge must be the base64url
//! SHA-256 digest of the verifier.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

use crate::AuthResult;
use crate::error::AuthError;

/// Computes the S256 challenge for a verifier:
/// `BASE64URL(SHA256(ASCII(code_verifier)))`.
#[must_use]
pub fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Returns `true` if the verifier matches the stored challenge.
#[must_use]
pub fn verify(challenge: &str, verifier: &str) -> bool {
    compute_challenge(verifier) == challenge
}

/// Validates a `code_challenge_method` parameter. Only `S256` is
/// accepted; `plain` is explicitly rejected.
///
/// # Errors
///
/// Returns `Validation` for any method other than `S256`.
pub fn validate_method(method: &str) -> AuthResult<()> {
    if method == "S256" {
        Ok(())
    } else {
        Err(AuthError::validation(format!(
            "unsupported code_challenge_method '{method}', only S256 is supported"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc7636_appendix_b_test_vector() {
        // https://tools.ietf.org/html/rfc7636#appendix-B
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            compute_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
        assert!(verify("E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM", verifier));
    }

    #[test]
    fn test_wrong_verifier_rejected() {
        let challenge = compute_challenge("the-real-verifier-the-real-verifier-the-real");
        assert!(!verify(&challenge, "some-other-verifier-some-other-verifier-42"));
    }

    #[test]
    fn test_method_validation() {
        assert!(validate_method("S256").is_ok());
        assert!(validate_method("plain").is_err());
        assert!(validate_method("s256").is_err());
        assert!(validate_method("").is_err());
    }
}
