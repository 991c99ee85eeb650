//! OAuth 2.0 client registration types.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use crate::AuthResult;
use crate::error::AuthError;

/// Length in bytes of generated client secrets.
const CLIENT_SECRET_LEN: usize = 64;

// =============================================================================
// Grant Type
// =============================================================================

/// OAuth 2.0 grant types supported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow (PKCE mandatory when a challenge is
    /// present).
    AuthorizationCode,
    /// Machine-to-machine authentication.
    ClientCredentials,
    /// Refresh token exchange.
    RefreshToken,
}

impl GrantType {
    /// Returns the `grant_type` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
        }
    }

    /// Parses a `grant_type` parameter value.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedGrantType` for anything outside the supported
    /// set.
    pub fn parse(value: &str) -> AuthResult<Self> {
        match value {
            "authorization_code" => Ok(Self::AuthorizationCode),
            "client_credentials" => Ok(Self::ClientCredentials),
            "refresh_token" => Ok(Self::RefreshToken),
            other => Err(AuthError::unsupported_grant_type(other)),
        }
    }
}

impl std::fmt::Display for GrantType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth 2.0 client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuth2Client {
    /// Unique client identifier.
    pub client_id: String,

    /// Client secret. Returned once at registration; never expires.
    pub client_secret: String,

    /// Human-readable client name, shown on the consent screen.
    pub client_name: String,

    /// Allowed redirect URIs (exact match).
    pub redirect_uris: Vec<String>,

    /// Grant types this client may use.
    pub grant_types: Vec<GrantType>,

    /// Allowed response types.
    pub response_types: Vec<String>,

    /// Default scope string.
    pub scope: String,

    /// When the client was registered.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Whether the client may be used.
    pub is_active: bool,
}

impl OAuth2Client {
    /// Exact-match check against the registered redirect URIs.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    /// Checks whether the client registered for a grant type.
    #[must_use]
    pub fn is_grant_allowed(&self, grant: GrantType) -> bool {
        self.grant_types.contains(&grant)
    }
}

// =============================================================================
// Registration
// =============================================================================

/// A client registration request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    /// Human-readable client name (required).
    pub client_name: String,

    /// Redirect URIs; at least one syntactically valid URI is required.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Requested grant types; defaults to `authorization_code`.
    /// Anything outside the supported set fails deserialization.
    #[serde(default)]
    pub grant_types: Option<Vec<GrantType>>,

    /// Requested response types; defaults to `code`.
    #[serde(default)]
    pub response_types: Option<Vec<String>>,

    /// Default scope; defaults to `read:campaigns`.
    #[serde(default)]
    pub scope: Option<String>,
}

impl ClientRegistration {
    /// Validates the registration request.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the name is empty, no redirect URI is
    /// given, or a redirect URI fails to parse.
    pub fn validate(&self) -> AuthResult<()> {
        if self.client_name.trim().is_empty() {
            return Err(AuthError::validation("client name is required"));
        }

        if self.redirect_uris.is_empty() {
            return Err(AuthError::validation(
                "at least one redirect URI is required",
            ));
        }

        for uri in &self.redirect_uris {
            if Url::parse(uri).is_err() {
                return Err(AuthError::validation(format!("invalid redirect URI: {uri}")));
            }
        }

        Ok(())
    }
}

/// Registration response: the secret is returned here once and never
/// again.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredClient {
    /// Issued client id.
    pub client_id: String,

    /// Issued client secret.
    pub client_secret: String,

    /// Unix timestamp of issuance.
    pub client_id_issued_at: i64,

    /// Always 0: client secrets never expire.
    pub client_secret_expires_at: i64,
}

/// Generates a client id of the form `client_{32 hex chars}`.
#[must_use]
pub fn generate_client_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    format!("client_{}", hex::encode(bytes))
}

/// Generates a 512-bit client secret, hex encoded.
#[must_use]
pub fn generate_client_secret() -> String {
    let mut bytes = [0u8; CLIENT_SECRET_LEN];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
