//! Request metadata types shared across the workspace.

use serde::{Deserialize, Serialize};

/// Connection metadata captured from the incoming request.
///
/// Carried through authentication and audit logging so that every
/// security event records where it came from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client IP address as observed by the server (or trusted proxy).
    pub ip: String,

    /// The `User-Agent` header, if present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ClientInfo {
    /// Creates client info with an IP address and no user agent.
    #[must_use]
    pub fn from_ip(ip: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: None,
        }
    }

    /// Sets the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// Identity attached to a request after token verification.
///
/// The authentication middleware inserts this into the request
/// extensions; the security middleware reads it (e.g. to key rate
/// limiting by user instead of IP). Keeping it here avoids a dependency
/// between the two crates.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    /// Authenticated user id, if the request carried a valid token.
    pub user_id: Option<String>,

    /// Client IP the identity was established from.
    pub ip: String,
}

impl RequestIdentity {
    /// Identity for an unauthenticated request.
    #[must_use]
    pub fn anonymous(ip: impl Into<String>) -> Self {
        Self {
            user_id: None,
            ip: ip.into(),
        }
    }

    /// Identity for an authenticated request.
    #[must_use]
    pub fn authenticated(user_id: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ip: ip.into(),
        }
    }

    /// The key used for per-identity rate limiting: the user id when
    /// authenticated, otherwise the IP address.
    #[must_use]
    pub fn rate_limit_key(&self) -> String {
        match &self.user_id {
            Some(user_id) => format!("user:{user_id}"),
            None => format!("ip:{}", self.ip),
        }
    }
}
