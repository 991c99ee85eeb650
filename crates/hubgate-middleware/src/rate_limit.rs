//! Per-request rate limiting.
//!
//! Three profiles over the shared store: `api` (100/60s), `auth`
//! (5/60s with a 15-minute block), and `heavy` (10/300s). The profile
//! is chosen by path prefix; the key is the authenticated user id when
//! a [`RequestIdentity`] extension is present, otherwise the client IP.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use hubgate_core::RequestIdentity;
use hubgate_store::{KeyValueStore, RateLimitError, RateLimiter};

use crate::config::SecurityConfig;
use crate::metrics::SecurityMetrics;

/// The three limiter profiles.
#[derive(Clone)]
pub struct RateLimiters {
    api: RateLimiter,
    auth: RateLimiter,
    heavy: RateLimiter,
}

impl RateLimiters {
    /// Builds the profile limiters over the shared store.
    #[must_use]
    pub fn new(config: &SecurityConfig, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            api: RateLimiter::new(store.clone(), "mw:api", config.api_limit),
            auth: RateLimiter::new(store.clone(), "mw:auth", config.auth_limit),
            heavy: RateLimiter::new(store, "mw:heavy", config.heavy_limit),
        }
    }
}

/// State for the rate-limit middleware.
#[derive(Clone)]
pub struct RateLimitState {
    /// The profile limiters.
    pub limiters: RateLimiters,
    /// Shared counters.
    pub metrics: Arc<SecurityMetrics>,
    /// Path prefixes under the auth profile.
    pub auth_paths: Arc<Vec<String>>,
    /// Path prefixes under the heavy profile.
    pub heavy_paths: Arc<Vec<String>>,
}

/// Identity key for limiting: the authenticated user when known, else
/// the peer IP.
fn rate_limit_key(req: &Request<Body>) -> String {
    if let Some(identity) = req.extensions().get::<RequestIdentity>() {
        return identity.rate_limit_key();
    }
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return format!("ip:{}", addr.ip());
    }
    "ip:unknown".to_string()
}

fn matches_prefix(path: &str, prefixes: &[String]) -> bool {
    prefixes.iter().any(|prefix| path.starts_with(prefix))
}

/// Middleware enforcing the profile limits.
pub async fn rate_limit(
    State(state): State<RateLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let limiter = if matches_prefix(&path, &state.auth_paths) {
        &state.limiters.auth
    } else if matches_prefix(&path, &state.heavy_paths) {
        &state.limiters.heavy
    } else {
        &state.limiters.api
    };

    let key = rate_limit_key(&req);
    match limiter.check(&key).await {
        Ok(()) => next.run(req).await,
        Err(RateLimitError::Exceeded { retry_after }) => {
            state.metrics.record_rate_limit();
            tracing::warn!(%path, key = %key, "rate limit exceeded");

            (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, retry_after.as_secs().to_string())],
                Json(json!({
                    "error": "too_many_requests",
                    "retry_after": retry_after.as_secs()
                })),
            )
                .into_response()
        }
        Err(RateLimitError::Storage(err)) => {
            tracing::error!(error = %err, "rate limiter storage failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "internal_error" })),
            )
                .into_response()
        }
    }
}
