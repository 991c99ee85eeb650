//! Ephemeral OAuth 2.0 records held in the shared store.
//!
//! Pending authorization requests and authorization codes live for ten
//! minutes; refresh token records for thirty days. Codes are single-use:
//! redemption consumes the record atomically, so concurrent redemption
//! of one code yields at most one success.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A pending authorization request awaiting user consent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    /// The requesting client.
    pub client_id: String,

    /// Redirect URI the code will be delivered to (already validated
    /// against the registration).
    pub redirect_uri: String,

    /// Requested response type (always `code`).
    pub response_type: String,

    /// Scope after filtering against the known table.
    pub scope: String,

    /// Opaque client state, echoed back on redirect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// PKCE challenge, when the client uses PKCE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method (`S256` when present).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<String>,

    /// When the request was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Hard deadline for consent.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthorizationRequest {
    /// Returns `true` if the consent window has closed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// A single-use authorization code, bound to everything the token
/// exchange must re-verify.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationCode {
    /// The code value.
    pub code: String,

    /// Client the code was issued to.
    pub client_id: String,

    /// User who granted consent.
    pub user_id: String,

    /// Redirect URI the exchange must repeat exactly.
    pub redirect_uri: String,

    /// Granted scope.
    pub scope: String,

    /// PKCE challenge the exchange verifier must match.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// When the code was minted.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Hard redemption deadline.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthorizationCode {
    /// Returns `true` if the redemption window has closed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// A stored refresh token record (the token itself is opaque to the
/// client and hashed in the store key).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRefreshToken {
    /// Client the token was issued to; the refresh grant requires an
    /// exact match.
    pub client_id: String,

    /// User the token acts for (`None` would mean client credentials,
    /// which never issues refresh tokens).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    /// Granted scope.
    pub scope: String,

    /// When the token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Hard expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

/// Generates a 256-bit random value, hex encoded. Used for
/// authorization codes and opaque refresh tokens.
#[must_use]
pub fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    #[test]
    fn test_opaque_tokens_are_unique_hex() {
        let a = generate_opaque_token();
        let b = generate_opaque_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn test_expiry_checks() {
        let now = OffsetDateTime::now_utc();
        let code = AuthorizationCode {
            code: generate_opaque_token(),
            client_id: "client_x".to_string(),
            user_id: "user-1".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            scope: "read:campaigns".to_string(),
            code_challenge: None,
            created_at: now,
            expires_at: now + Duration::minutes(10),
        };
        assert!(!code.is_expired());

        let stale = AuthorizationCode {
            expires_at: now - Duration::seconds(1),
            ..code
        };
        assert!(stale.is_expired());
    }

    #[test]
    fn test_record_serde_round_trip() {
        let now = OffsetDateTime::now_utc();
        let request = AuthorizationRequest {
            client_id: "client_x".to_string(),
            redirect_uri: "https://app.example.com/cb".to_string(),
            response_type: "code".to_string(),
            scope: "read:campaigns".to_string(),
            state: Some("opaque-state".to_string()),
            code_challenge: Some("challenge".to_string()),
            code_challenge_method: Some("S256".to_string()),
            created_at: now,
            expires_at: now + Duration::minutes(10),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains(r#""codeChallengeMethod":"S256""#));
        let parsed: AuthorizationRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.client_id, "client_x");
        assert_eq!(parsed.state.as_deref(), Some("opaque-state"));
    }
}
