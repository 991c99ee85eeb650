//! JWT claim structures for the token pair.
//!
//! Access and refresh tokens share one claim shape: both carry the
//! session and token ids that bind them to a session lineage, plus a
//! `type` discriminator. The identity fields (email, role, permissions)
//! are present only on access tokens.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::types::user::{Role, User};

/// Token kind discriminator carried in the `type` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    /// Short-lived access token.
    Access,
    /// Long-lived refresh token.
    Refresh,
}

impl TokenType {
    /// Returns the claim value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl std::fmt::Display for TokenType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Claims carried by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenClaims {
    /// Subject: the user id.
    pub sub: String,

    /// Login email (access tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Role (access tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,

    /// Resolved permission set (access tokens only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<Vec<String>>,

    /// Session the token is bound to.
    #[serde(rename = "sessionId")]
    pub session_id: String,

    /// Token pair lineage id; the blacklist is keyed by this.
    #[serde(rename = "tokenId")]
    pub token_id: String,

    /// Token kind.
    #[serde(rename = "type")]
    pub token_type: TokenType,

    /// Issuer.
    pub iss: String,

    /// Audience.
    pub aud: String,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration (Unix timestamp).
    pub exp: i64,
}

impl TokenClaims {
    /// Builds access token claims for a user.
    #[must_use]
    pub fn access(
        user: &User,
        session_id: &str,
        token_id: &str,
        issuer: &str,
        audience: &str,
        ttl: std::time::Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            sub: user.id.clone(),
            email: Some(user.email.clone()),
            role: Some(user.role),
            permissions: Some(
                user.role
                    .permissions()
                    .iter()
                    .map(|p| (*p).to_string())
                    .collect(),
            ),
            session_id: session_id.to_string(),
            token_id: token_id.to_string(),
            token_type: TokenType::Access,
            iss: issuer.to_string(),
            aud: audience.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        }
    }

    /// Builds refresh token claims for a user.
    #[must_use]
    pub fn refresh(
        user: &User,
        session_id: &str,
        token_id: &str,
        issuer: &str,
        audience: &str,
        ttl: std::time::Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        Self {
            sub: user.id.clone(),
            email: None,
            role: None,
            permissions: None,
            session_id: session_id.to_string(),
            token_id: token_id.to_string(),
            token_type: TokenType::Refresh,
            iss: issuer.to_string(),
            aud: audience.to_string(),
            iat: now,
            exp: now + ttl.as_secs() as i64,
        }
    }

    /// Remaining lifetime, zero if already expired.
    #[must_use]
    pub fn remaining_ttl(&self) -> std::time::Duration {
        let seconds = self.exp - OffsetDateTime::now_utc().unix_timestamp();
        std::time::Duration::from_secs(seconds.max(0) as u64)
    }
}
