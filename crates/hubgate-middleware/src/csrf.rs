//! CSRF protection.
//!
//! Per-session tokens are issued at login time and stored in the shared
//! store with a 24-hour TTL. Every non-GET request outside the exempt
//! paths must present `x-session-id` and `x-csrf-token` headers; the
//! token is compared against the stored one in constant time.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Method, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use rand::RngCore;
use serde_json::json;

use hubgate_store::{KeyValueStore, StorageError};

use crate::metrics::SecurityMetrics;

/// CSRF token header.
const CSRF_TOKEN_HEADER: &str = "x-csrf-token";
/// Session id header accompanying the token.
const SESSION_ID_HEADER: &str = "x-session-id";

/// Issues and verifies per-session CSRF tokens.
pub struct CsrfProtection {
    store: Arc<dyn KeyValueStore>,
    ttl: Duration,
}

impl CsrfProtection {
    /// Creates the token service.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    fn key(session_id: &str) -> String {
        format!("csrf:{session_id}")
    }

    /// Issues a fresh token for a session, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn issue(&self, session_id: &str) -> Result<String, StorageError> {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = hex::encode(bytes);

        self.store
            .put(
                &Self::key(session_id),
                token.clone().into_bytes(),
                Some(self.ttl),
            )
            .await?;
        Ok(token)
    }

    /// Verifies a presented token against the stored one, in constant
    /// time.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn verify(&self, session_id: &str, token: &str) -> Result<bool, StorageError> {
        let Some(stored) = self.store.get(&Self::key(session_id)).await? else {
            return Ok(false);
        };
        Ok(constant_time_eq(&stored, token.as_bytes()))
    }
}

/// Branch-free byte comparison. Only the length check short-circuits.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// State for the CSRF middleware.
#[derive(Clone)]
pub struct CsrfState {
    /// The token service.
    pub csrf: Arc<CsrfProtection>,
    /// Shared counters.
    pub metrics: Arc<SecurityMetrics>,
    /// Path prefixes exempt from CSRF (the login endpoint).
    pub exempt_paths: Arc<Vec<String>>,
}

fn forbidden(message: &str) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "csrf_required", "error_description": message })),
    )
        .into_response()
}

/// Middleware enforcing CSRF tokens on state-changing requests.
pub async fn csrf_protection(
    State(state): State<CsrfState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    // Safe methods carry no state change.
    if matches!(
        *req.method(),
        Method::GET | Method::HEAD | Method::OPTIONS
    ) {
        return next.run(req).await;
    }

    let path = req.uri().path();
    if state
        .exempt_paths
        .iter()
        .any(|prefix| path.starts_with(prefix))
    {
        return next.run(req).await;
    }

    let token = req
        .headers()
        .get(CSRF_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let session_id = req
        .headers()
        .get(SESSION_ID_HEADER)
        .and_then(|value| value.to_str().ok());

    let (Some(token), Some(session_id)) = (token, session_id) else {
        state.metrics.record_csrf();
        tracing::warn!(%path, "CSRF token or session id missing");
        return forbidden("CSRF token required");
    };

    match state.csrf.verify(session_id, token).await {
        Ok(true) => next.run(req).await,
        Ok(false) => {
            state.metrics.record_csrf();
            tracing::warn!(%path, "invalid CSRF token");
            forbidden("Invalid CSRF token")
        }
        Err(err) => {
            tracing::error!(error = %err, "CSRF store failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal_error" })),
            )
                .into_response()
        }
    }
}
