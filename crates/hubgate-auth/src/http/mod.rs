//! Axum HTTP handlers for the authentication and OAuth2 endpoints.
//!
//! Routes:
//!
//! - `POST /auth/login` / `POST /auth/refresh` / `POST /auth/revoke`
//! - `GET /oauth/authorize`, `POST /oauth/consent`, `POST /oauth/token`,
//!   `POST /oauth/introspect`, `POST /oauth/revoke`
//!
//! OAuth2 endpoints speak forms and the exact wire vocabulary; errors
//! are serialized as `{ "error": ..., "error_description": ... }` with
//! the matching status code. Rate-limit rejections carry `Retry-After`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use serde::Deserialize;
use serde_json::json;

use hubgate_core::ClientInfo;

use crate::error::AuthError;
use crate::oauth::provider::{ConsentOutcome, OAuth2Provider};
use crate::oauth::token::{AuthorizeRequest, TokenError, TokenRequest, TokenTypeHint};
use crate::service::{AuthOutcome, JwtAuthService};
use crate::types::claims::TokenType;

// =============================================================================
// State
// =============================================================================

/// State for the authentication endpoints.
#[derive(Clone)]
pub struct AuthState {
    /// The authentication service.
    pub auth: Arc<JwtAuthService>,
}

/// State for the OAuth2 endpoints.
#[derive(Clone)]
pub struct OAuthState {
    /// The OAuth2 provider.
    pub provider: Arc<OAuth2Provider>,
}

/// Builds the `/auth` router.
pub fn auth_router(state: AuthState) -> Router {
    Router::new()
        .route("/auth/login", post(login_handler))
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/revoke", post(revoke_handler))
        .with_state(state)
}

/// Builds the `/oauth` router.
pub fn oauth_router(state: OAuthState) -> Router {
    Router::new()
        .route("/oauth/authorize", get(authorize_handler))
        .route("/oauth/consent", post(consent_handler))
        .route("/oauth/token", post(token_handler))
        .route("/oauth/introspect", post(introspect_handler))
        .route("/oauth/revoke", post(oauth_revoke_handler))
        .with_state(state)
}

/// Extracts client connection metadata, honoring `X-Forwarded-For` from
/// a trusted proxy.
#[must_use]
pub fn client_info(headers: &HeaderMap, addr: SocketAddr) -> ClientInfo {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string());

    let mut info = ClientInfo::from_ip(ip);
    if let Some(agent) = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
    {
        info = info.with_user_agent(agent);
    }
    info
}

// =============================================================================
// Error Mapping
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = match &self {
            AuthError::AuthenticationFailed { .. } | AuthError::TokenInvalid { .. } => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::InvalidClient { .. } => StatusCode::UNAUTHORIZED,
            AuthError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AuthError::Validation { .. }
            | AuthError::InvalidGrant { .. }
            | AuthError::InvalidScope { .. }
            | AuthError::AccessDenied { .. }
            | AuthError::UnsupportedGrantType { .. }
            | AuthError::UnsupportedResponseType { .. } => StatusCode::BAD_REQUEST,
            AuthError::Storage { .. } | AuthError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(TokenError::from(&self));

        match self.retry_after() {
            Some(retry_after) => (
                status,
                [(header::RETRY_AFTER, retry_after.as_secs().to_string())],
                body,
            )
                .into_response(),
            None => (status, body).into_response(),
        }
    }
}

// =============================================================================
// Authentication Handlers
// =============================================================================

/// Body of `POST /auth/login`.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    /// Login email.
    pub email: String,
    /// Password.
    pub password: String,
    /// TOTP code, when the account has MFA enabled.
    #[serde(default)]
    pub mfa_code: Option<String>,
}

async fn login_handler(
    State(state): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Response, AuthError> {
    let client = client_info(&headers, addr);
    let outcome = state
        .auth
        .authenticate(
            &request.email,
            &request.password,
            request.mfa_code.as_deref(),
            &client,
        )
        .await?;

    let response = match outcome {
        AuthOutcome::MfaRequired { auth_id } => {
            Json(json!({ "requiresMfa": true, "authId": auth_id })).into_response()
        }
        AuthOutcome::Authenticated { user, tokens } => {
            Json(json!({ "user": user, "tokens": tokens })).into_response()
        }
    };
    Ok(response)
}

/// Body of `POST /auth/refresh`.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    /// The refresh token.
    pub refresh_token: String,
}

async fn refresh_handler(
    State(state): State<AuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Response, AuthError> {
    let client = client_info(&headers, addr);
    let refreshed = state
        .auth
        .refresh_access_token(&request.refresh_token, &client)
        .await?;
    Ok(Json(refreshed).into_response())
}

/// Body of `POST /auth/revoke`.
#[derive(Debug, Deserialize)]
pub struct RevokeRequest {
    /// The token to revoke.
    pub token: String,
    /// Which kind of token it is.
    pub token_type: TokenType,
}

async fn revoke_handler(
    State(state): State<AuthState>,
    Json(request): Json<RevokeRequest>,
) -> Result<Response, AuthError> {
    state
        .auth
        .revoke_token(&request.token, request.token_type)
        .await?;
    Ok(Json(json!({ "revoked": true })).into_response())
}

// =============================================================================
// OAuth2 Handlers
// =============================================================================

async fn authorize_handler(
    State(state): State<OAuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Query(request): Query<AuthorizeRequest>,
) -> Result<Response, AuthError> {
    let client = client_info(&headers, addr);
    let consent = state.provider.authorize(&request, &client.ip).await?;
    Ok(Json(consent).into_response())
}

/// Body of `POST /oauth/consent`.
#[derive(Debug, Deserialize)]
pub struct ConsentRequest {
    /// Pending authorization request id.
    pub auth_request_id: String,
    /// The consenting user.
    pub user_id: String,
    /// The decision.
    pub approved: bool,
}

async fn consent_handler(
    State(state): State<OAuthState>,
    Json(request): Json<ConsentRequest>,
) -> Result<Response, AuthError> {
    let outcome = state
        .provider
        .handle_consent(&request.auth_request_id, &request.user_id, request.approved)
        .await?;

    let response = match outcome {
        ConsentOutcome::Granted {
            code,
            state,
            redirect_uri,
        } => Json(json!({
            "code": code,
            "state": state,
            "redirect_uri": redirect_uri
        }))
        .into_response(),
        ConsentOutcome::Denied {
            error,
            error_description,
        } => (
            StatusCode::FORBIDDEN,
            Json(json!({
                "error": error,
                "error_description": error_description
            })),
        )
            .into_response(),
    };
    Ok(response)
}

async fn token_handler(
    State(state): State<OAuthState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Result<Response, AuthError> {
    let client = client_info(&headers, addr);
    let response = state.provider.token(&request, &client.ip).await?;
    Ok(Json(response).into_response())
}

/// Form of `POST /oauth/introspect`.
#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    /// The token to introspect.
    pub token: String,
    /// The introspecting client.
    pub client_id: String,
}

async fn introspect_handler(
    State(state): State<OAuthState>,
    Form(request): Form<IntrospectRequest>,
) -> Response {
    // This endpoint never raises; failures are {"active": false}.
    let response = state
        .provider
        .introspect(&request.token, &request.client_id)
        .await;
    Json(response).into_response()
}

/// Form of `POST /oauth/revoke`.
#[derive(Debug, Deserialize)]
pub struct OAuthRevokeRequest {
    /// The token to revoke.
    pub token: String,
    /// Optional hint per RFC 7009.
    #[serde(default)]
    pub token_type_hint: Option<TokenTypeHint>,
}

async fn oauth_revoke_handler(
    State(state): State<OAuthState>,
    Form(request): Form<OAuthRevokeRequest>,
) -> Result<Response, AuthError> {
    state
        .provider
        .revoke(&request.token, request.token_type_hint)
        .await?;
    // RFC 7009: 200 with an empty body regardless of token validity.
    Ok(StatusCode::OK.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_info_prefers_forwarded_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "203.0.113.9, 10.0.0.2".parse().unwrap());
        headers.insert(header::USER_AGENT, "curl/8.0".parse().unwrap());

        let addr: SocketAddr = "10.0.0.1:443".parse().unwrap();
        let info = client_info(&headers, addr);
        assert_eq!(info.ip, "203.0.113.9");
        assert_eq!(info.user_agent.as_deref(), Some("curl/8.0"));
    }

    #[test]
    fn test_client_info_falls_back_to_peer_addr() {
        let addr: SocketAddr = "192.0.2.7:51000".parse().unwrap();
        let info = client_info(&HeaderMap::new(), addr);
        assert_eq!(info.ip, "192.0.2.7");
        assert!(info.user_agent.is_none());
    }

    #[test]
    fn test_rate_limited_response_carries_retry_after() {
        let response = AuthError::RateLimited {
            retry_after: std::time::Duration::from_secs(900),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "900"
        );
    }

    #[test]
    fn test_error_statuses() {
        assert_eq!(
            AuthError::authentication_failed("x").into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::invalid_grant("x").into_response().status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::storage("x").into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
