//! Bearer authentication middleware.
//!
//! Downstream collaborators (campaign tooling, analytics, dashboards)
//! sit behind this layer and authorize their operations through the
//! auth service's verify contract. On success an [`AuthContext`] and a
//! [`hubgate_core::RequestIdentity`] are inserted into the request
//! extensions; the security middleware keys its rate limiting off the
//! latter.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode, header::AUTHORIZATION};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use hubgate_core::RequestIdentity;

use crate::http::AuthState;
use crate::types::claims::{TokenClaims, TokenType};
use crate::types::user::Role;

/// Verified identity attached to authenticated requests.
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The authenticated user id.
    pub user_id: String,

    /// Role from the access token.
    pub role: Option<Role>,

    /// Resolved permission set from the access token.
    pub permissions: Vec<String>,

    /// Session the token is bound to.
    pub session_id: String,
}

impl AuthContext {
    /// Builds a context from verified access token claims.
    #[must_use]
    pub fn from_claims(claims: &TokenClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            role: claims.role,
            permissions: claims.permissions.clone().unwrap_or_default(),
            session_id: claims.session_id.clone(),
        }
    }

    /// Checks a permission against this context with wildcard
    /// semantics.
    #[must_use]
    pub fn has_permission(&self, required: &str) -> bool {
        crate::types::user::has_permission(&self.permissions, required)
    }
}

/// Axum middleware enforcing a valid Bearer access token.
///
/// Returns 401 with a JSON body when the header is missing, malformed,
/// or the token fails verification. The specific failure cause stays in
/// the audit log.
pub async fn require_auth(
    State(state): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let Some(header) = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
    else {
        return unauthorized("Authentication required");
    };

    let token = match header.strip_prefix("Bearer ") {
        Some(token) if !token.is_empty() => token,
        _ => return unauthorized("Invalid Authorization header format"),
    };

    match state.auth.verify_token(token, TokenType::Access).await {
        Ok(claims) => {
            let context = AuthContext::from_claims(&claims);
            let identity = RequestIdentity::authenticated(&claims.sub, addr.ip().to_string());

            tracing::debug!(user_id = %context.user_id, "bearer token verified");
            req.extensions_mut().insert(context);
            req.extensions_mut().insert(identity);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(error = %err, "bearer token rejected");
            unauthorized("Token is invalid")
        }
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "unauthorized", "error_description": message })),
    )
        .into_response()
}
