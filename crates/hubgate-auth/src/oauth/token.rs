//! OAuth 2.0 wire types.
//!
//! Request and response shapes for the authorize, token, introspection,
//! and revocation endpoints. Field names follow the OAuth2 wire
//! vocabulary exactly; grant error codes are a wire contract and are
//! preserved verbatim.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AuthError;

// =============================================================================
// Authorize Endpoint
// =============================================================================

/// Query parameters of `GET /oauth/authorize`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeRequest {
    /// OAuth 2.0 client id.
    pub client_id: String,

    /// Redirect URI; must exactly match a registered URI.
    pub redirect_uri: String,

    /// Response type; only `code` is supported.
    pub response_type: String,

    /// Requested scope (space-separated).
    #[serde(default)]
    pub scope: Option<String>,

    /// Opaque client state, echoed back with the code.
    #[serde(default)]
    pub state: Option<String>,

    /// PKCE challenge.
    #[serde(default)]
    pub code_challenge: Option<String>,

    /// PKCE challenge method; must be `S256` when a challenge is given.
    #[serde(default)]
    pub code_challenge_method: Option<String>,
}

/// A scope with its consent-screen description.
#[derive(Debug, Clone, Serialize)]
pub struct ScopeDescription {
    /// Scope name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
}

/// Client summary shown on the consent screen.
#[derive(Debug, Clone, Serialize)]
pub struct ClientSummary {
    /// Display name.
    pub name: String,
    /// Client id.
    pub id: String,
}

/// Payload driving the consent screen. No code has been issued yet.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentPayload {
    /// Id of the pending authorization request.
    pub auth_request_id: String,

    /// The requesting client.
    pub client: ClientSummary,

    /// Scopes that survived filtering, with descriptions.
    pub scopes: Vec<ScopeDescription>,

    /// Redirect URI the code will be delivered to.
    pub redirect_uri: String,

    /// Echoed client state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

// =============================================================================
// Token Endpoint
// =============================================================================

/// Form parameters of `POST /oauth/token`, covering all grant types.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// One of `authorization_code`, `client_credentials`,
    /// `refresh_token`.
    pub grant_type: String,

    /// Authorization code (authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI (authorization_code grant; must match the code).
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// Client id.
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret.
    #[serde(default)]
    pub client_secret: Option<String>,

    /// PKCE verifier (authorization_code grant).
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Refresh token (refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Requested scope (client_credentials grant).
    #[serde(default)]
    pub scope: Option<String>,
}

/// Successful token response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token (HS256 JWT).
    pub access_token: String,

    /// Always `Bearer`.
    pub token_type: String,

    /// Access token lifetime in seconds.
    pub expires_in: u64,

    /// Granted scope (space-separated).
    pub scope: String,

    /// Opaque refresh token; absent for client credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl TokenResponse {
    /// Creates a response without a refresh token.
    #[must_use]
    pub fn new(access_token: String, expires_in: u64, scope: String) -> Self {
        Self {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in,
            scope,
            refresh_token: None,
        }
    }

    /// Attaches a refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, token: String) -> Self {
        self.refresh_token = Some(token);
        self
    }
}

// =============================================================================
// Error Responses
// =============================================================================

/// OAuth 2.0 token error codes (RFC 6749 §5.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenErrorCode {
    /// Malformed or incomplete request.
    InvalidRequest,
    /// Client authentication failed.
    InvalidClient,
    /// The grant (code or refresh token) is invalid, expired, consumed,
    /// or issued to another client.
    InvalidGrant,
    /// The requested scope is invalid or malformed.
    InvalidScope,
    /// The resource owner denied the request.
    AccessDenied,
    /// The grant type is not supported.
    UnsupportedGrantType,
    /// The response type is not supported.
    UnsupportedResponseType,
    /// The server is refusing the request (rate limiting).
    TemporarilyUnavailable,
    /// Internal failure.
    ServerError,
}

impl TokenErrorCode {
    /// Returns the wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::InvalidClient => "invalid_client",
            Self::InvalidGrant => "invalid_grant",
            Self::InvalidScope => "invalid_scope",
            Self::AccessDenied => "access_denied",
            Self::UnsupportedGrantType => "unsupported_grant_type",
            Self::UnsupportedResponseType => "unsupported_response_type",
            Self::TemporarilyUnavailable => "temporarily_unavailable",
            Self::ServerError => "server_error",
        }
    }

    /// HTTP status for this code.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidClient => 401,
            Self::TemporarilyUnavailable => 429,
            Self::ServerError => 500,
            _ => 400,
        }
    }
}

impl fmt::Display for TokenErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Token error response body.
#[derive(Debug, Clone, Serialize)]
pub struct TokenError {
    /// Wire error code.
    pub error: TokenErrorCode,

    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

impl TokenError {
    /// Creates an error with a description.
    #[must_use]
    pub fn with_description(error: TokenErrorCode, description: impl Into<String>) -> Self {
        Self {
            error,
            error_description: Some(description.into()),
        }
    }
}

impl From<&AuthError> for TokenError {
    fn from(err: &AuthError) -> Self {
        let code = match err.oauth_error_code() {
            "invalid_client" => TokenErrorCode::InvalidClient,
            "invalid_grant" => TokenErrorCode::InvalidGrant,
            "invalid_scope" => TokenErrorCode::InvalidScope,
            "access_denied" => TokenErrorCode::AccessDenied,
            "unsupported_grant_type" => TokenErrorCode::UnsupportedGrantType,
            "unsupported_response_type" => TokenErrorCode::UnsupportedResponseType,
            "temporarily_unavailable" => TokenErrorCode::TemporarilyUnavailable,
            "server_error" => TokenErrorCode::ServerError,
            _ => TokenErrorCode::InvalidRequest,
        };
        // Server errors keep their detail out of the wire response.
        let description = if err.is_client_error() {
            err.to_string()
        } else {
            "internal error".to_string()
        };
        Self::with_description(code, description)
    }
}

// =============================================================================
// Introspection and Revocation
// =============================================================================

/// Introspection response (RFC 7662). `active: false` carries no other
/// fields, so a failed introspection reveals nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is currently valid.
    pub active: bool,

    /// Subject (user or client id).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Client the token was issued to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// Granted scope.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Expiration (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// Issued at (Unix timestamp).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

impl IntrospectionResponse {
    /// The inactive response.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            active: false,
            sub: None,
            client_id: None,
            scope: None,
            exp: None,
            iat: None,
        }
    }
}

/// Token type hint for revocation requests (RFC 7009).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenTypeHint {
    /// The token is an access token.
    AccessToken,
    /// The token is a refresh token.
    RefreshToken,
}

impl TokenTypeHint {
    /// Returns the wire string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessToken => "access_token",
            Self::RefreshToken => "refresh_token",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_deserialization() {
        let request: TokenRequest = serde_json::from_str(
            r#"{
                "grant_type": "authorization_code",
                "code": "abc",
                "redirect_uri": "https://app.example.com/cb",
                "client_id": "client_x",
                "client_secret": "s",
                "code_verifier": "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"
            }"#,
        )
        .unwrap();
        assert_eq!(request.grant_type, "authorization_code");
        assert_eq!(request.code.as_deref(), Some("abc"));
        assert!(request.refresh_token.is_none());
    }

    #[test]
    fn test_token_response_serialization() {
        let response =
            TokenResponse::new("jwt".to_string(), 3600, "read:campaigns".to_string());
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""token_type":"Bearer""#));
        assert!(json.contains(r#""expires_in":3600"#));
        assert!(!json.contains("refresh_token"));

        let with_refresh = TokenResponse::new("jwt".to_string(), 3600, "s".to_string())
            .with_refresh_token("opaque".to_string());
        let json = serde_json::to_string(&with_refresh).unwrap();
        assert!(json.contains(r#""refresh_token":"opaque""#));
    }

    #[test]
    fn test_error_codes_and_statuses() {
        assert_eq!(TokenErrorCode::InvalidGrant.as_str(), "invalid_grant");
        assert_eq!(TokenErrorCode::InvalidClient.http_status(), 401);
        assert_eq!(TokenErrorCode::InvalidGrant.http_status(), 400);
        assert_eq!(TokenErrorCode::TemporarilyUnavailable.http_status(), 429);
    }

    #[test]
    fn test_auth_error_maps_to_wire_code() {
        let err = AuthError::invalid_grant("code expired");
        let wire = TokenError::from(&err);
        assert_eq!(wire.error, TokenErrorCode::InvalidGrant);
        assert!(wire.error_description.unwrap().contains("code expired"));

        // Internal detail never reaches the wire.
        let err = AuthError::storage("connection refused to 10.0.0.5");
        let wire = TokenError::from(&err);
        assert_eq!(wire.error, TokenErrorCode::ServerError);
        assert_eq!(wire.error_description.as_deref(), Some("internal error"));
    }

    #[test]
    fn test_inactive_introspection_is_bare() {
        let json = serde_json::to_string(&IntrospectionResponse::inactive()).unwrap();
        assert_eq!(json, r#"{"active":false}"#);
    }
}
