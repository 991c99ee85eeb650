//! Authentication and OAuth2 configuration.
//!
//! Defaults reproduce the production profile: 15-minute access tokens,
//! 7-day refresh tokens (30 days for OAuth2), 10-minute authorization
//! codes, and the standard rate-limit ladder. Secrets default to
//! freshly generated random values, which is right for single-node
//! deployments and tests; multi-node deployments must configure shared
//! secrets explicitly.

use std::time::Duration;

use hubgate_store::RateLimiterConfig;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;

/// Generates a 512-bit random secret, hex encoded.
#[must_use]
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 64];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Configuration for the JWT authentication service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JWT issuer claim.
    pub issuer: String,

    /// JWT audience claim.
    pub audience: String,

    /// HS512 secret for access tokens.
    pub access_token_secret: String,

    /// HS512 secret for refresh tokens. Must differ from the access
    /// secret so a refresh token can never pass as an access token.
    pub refresh_token_secret: String,

    /// Access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Duration,

    /// Refresh token (and session) lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,

    /// Login attempts per IP: 5 per 15 minutes, then a 15-minute block.
    pub login_limit: RateLimiterConfig,

    /// MFA attempts per (ip, user): 3 per 5 minutes, then a 30-minute
    /// block.
    pub mfa_limit: RateLimiterConfig,

    /// Display name used in TOTP provisioning URIs.
    pub mfa_issuer: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: "hubgate-auth".to_string(),
            audience: "hubgate-api".to_string(),
            access_token_secret: generate_secret(),
            refresh_token_secret: generate_secret(),
            access_token_ttl: Duration::from_secs(15 * 60),
            refresh_token_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            login_limit: RateLimiterConfig::new(5, Duration::from_secs(15 * 60))
                .with_block(Duration::from_secs(15 * 60)),
            mfa_limit: RateLimiterConfig::new(3, Duration::from_secs(5 * 60))
                .with_block(Duration::from_secs(30 * 60)),
            mfa_issuer: "Hubgate".to_string(),
        }
    }
}

impl AuthConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a secret is empty or reused, or a lifetime is
    /// zero.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.access_token_secret.is_empty() || self.refresh_token_secret.is_empty() {
            return Err(AuthError::internal("token secrets must not be empty"));
        }
        if self.access_token_secret == self.refresh_token_secret {
            return Err(AuthError::internal(
                "access and refresh token secrets must differ",
            ));
        }
        if self.access_token_ttl.is_zero() || self.refresh_token_ttl.is_zero() {
            return Err(AuthError::internal("token lifetimes must be non-zero"));
        }
        Ok(())
    }
}

/// Configuration for the OAuth2 provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuth2Config {
    /// Issuer claim for OAuth2 access tokens.
    pub issuer: String,

    /// Audience claim for OAuth2 access tokens.
    pub audience: String,

    /// HS256 secret for OAuth2 access tokens.
    pub jwt_secret: String,

    /// OAuth2 access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token_ttl: Duration,

    /// OAuth2 refresh token lifetime.
    #[serde(with = "humantime_serde")]
    pub refresh_token_ttl: Duration,

    /// Authorization code (and pending request) lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code_ttl: Duration,

    /// Authorize endpoint: 10 requests per minute per IP.
    pub authorize_limit: RateLimiterConfig,

    /// Token endpoint: 30 requests per minute per IP.
    pub token_limit: RateLimiterConfig,
}

impl Default for OAuth2Config {
    fn default() -> Self {
        Self {
            issuer: "hubgate-oauth".to_string(),
            audience: "hubgate-api".to_string(),
            jwt_secret: generate_secret(),
            access_token_ttl: Duration::from_secs(60 * 60),
            refresh_token_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            authorization_code_ttl: Duration::from_secs(10 * 60),
            authorize_limit: RateLimiterConfig::new(10, Duration::from_secs(60)),
            token_limit: RateLimiterConfig::new(30, Duration::from_secs(60)),
        }
    }
}

impl OAuth2Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the secret is empty or a lifetime is zero.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.jwt_secret.is_empty() {
            return Err(AuthError::internal("OAuth2 JWT secret must not be empty"));
        }
        if self.access_token_ttl.is_zero() || self.authorization_code_ttl.is_zero() {
            return Err(AuthError::internal("OAuth2 lifetimes must be non-zero"));
        }
        Ok(())
    }
}
