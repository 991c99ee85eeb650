//! HS512 JWT signing and verification.
//!
//! Access and refresh tokens are signed with HMAC-SHA512 under
//! *distinct* secrets, so a refresh token can never be replayed as an
//! access token (and vice versa) even before the `type` claim is
//! checked. Issuer and audience are validated on every decode.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};

use crate::AuthResult;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::types::claims::{TokenClaims, TokenType};

/// Signs and verifies the access/refresh token pair.
pub struct JwtSigner {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    issuer: String,
    audience: String,
}

impl JwtSigner {
    /// Builds a signer from the service configuration.
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_token_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_token_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_token_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
        }
    }

    /// Encodes claims into a signed JWT, keyed by the claims'
    /// `token_type`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails.
    pub fn encode(&self, claims: &TokenClaims) -> AuthResult<String> {
        let key = match claims.token_type {
            TokenType::Access => &self.access_encoding,
            TokenType::Refresh => &self.refresh_encoding,
        };

        encode(&Header::new(Algorithm::HS512), claims, key)
            .map_err(|e| AuthError::internal(format!("token encoding failed: {e}")))
    }

    /// Decodes and validates a JWT of the expected type.
    ///
    /// Checks the signature (against the secret for `expected`), the
    /// issuer, the audience, expiry, and the `type` claim. Every failure
    /// collapses into [`AuthError::TokenInvalid`].
    ///
    /// # Errors
    ///
    /// Returns `TokenInvalid` on any validation failure.
    pub fn decode(&self, token: &str, expected: TokenType) -> AuthResult<TokenClaims> {
        let key = match expected {
            TokenType::Access => &self.access_decoding,
            TokenType::Refresh => &self.refresh_decoding,
        };

        let mut validation = Validation::new(Algorithm::HS512);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.validate_exp = true;

        let data = decode::<TokenClaims>(token, key, &validation)
            .map_err(|e| AuthError::token_invalid(e.to_string()))?;

        if data.claims.token_type != expected {
            return Err(AuthError::token_invalid(format!(
                "expected {expected} token, got {}",
                data.claims.token_type
            )));
        }

        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::user::{Role, User, hash_password};
    use std::time::Duration;

    fn config() -> AuthConfig {
        AuthConfig::default()
    }

    fn user() -> User {
        User {
            id: "user-1".to_string(),
            email: "user-1@example.com".to_string(),
            password_hash: hash_password("pw").unwrap(),
            role: Role::Editor,
            mfa_enabled: false,
            mfa_secret: None,
        }
    }

    #[test]
    fn test_encode_decode_access() {
        let config = config();
        let signer = JwtSigner::new(&config);

        let claims = TokenClaims::access(
            &user(),
            "session-1",
            "token-1",
            &config.issuer,
            &config.audience,
            Duration::from_secs(900),
        );
        let token = signer.encode(&claims).unwrap();

        let decoded = signer.decode(&token, TokenType::Access).unwrap();
        assert_eq!(decoded.sub, "user-1");
        assert_eq!(decoded.session_id, "session-1");
        assert_eq!(decoded.token_type, TokenType::Access);
    }

    #[test]
    fn test_refresh_token_rejected_as_access() {
        let config = config();
        let signer = JwtSigner::new(&config);

        let claims = TokenClaims::refresh(
            &user(),
            "session-1",
            "token-1",
            &config.issuer,
            &config.audience,
            Duration::from_secs(604_800),
        );
        let token = signer.encode(&claims).unwrap();

        // Wrong secret: the signature check alone rejects it.
        assert!(matches!(
            signer.decode(&token, TokenType::Access),
            Err(AuthError::TokenInvalid { .. })
        ));
        assert!(signer.decode(&token, TokenType::Refresh).is_ok());
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = config();
        let signer = JwtSigner::new(&config);

        let mut claims = TokenClaims::access(
            &user(),
            "s",
            "t",
            &config.issuer,
            &config.audience,
            Duration::from_secs(900),
        );
        claims.iat -= 7200;
        claims.exp = claims.iat + 900;
        let token = signer.encode(&claims).unwrap();

        assert!(matches!(
            signer.decode(&token, TokenType::Access),
            Err(AuthError::TokenInvalid { .. })
        ));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let config = config();
        let signer = JwtSigner::new(&config);

        let claims = TokenClaims::access(
            &user(),
            "s",
            "t",
            "someone-else",
            &config.audience,
            Duration::from_secs(900),
        );
        let token = signer.encode(&claims).unwrap();

        assert!(signer.decode(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_tampered_token_rejected() {
        let config = config();
        let signer = JwtSigner::new(&config);

        let claims = TokenClaims::access(
            &user(),
            "s",
            "t",
            &config.issuer,
            &config.audience,
            Duration::from_secs(900),
        );
        let mut token = signer.encode(&claims).unwrap();
        token.push('x');

        assert!(signer.decode(&token, TokenType::Access).is_err());
    }

    #[test]
    fn test_other_signer_rejected() {
        let config_a = config();
        let config_b = config();
        let signer_a = JwtSigner::new(&config_a);
        let signer_b = JwtSigner::new(&config_b);

        let claims = TokenClaims::access(
            &user(),
            "s",
            "t",
            &config_a.issuer,
            &config_a.audience,
            Duration::from_secs(900),
        );
        let token = signer_a.encode(&claims).unwrap();

        // Different random secrets: must not verify.
        assert!(signer_b.decode(&token, TokenType::Access).is_err());
    }
}
