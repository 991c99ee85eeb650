//! Request size limiting.
//!
//! A declared `Content-Length` over the ceiling is rejected before any
//! byte is read; otherwise the body is drained with a hard cap, so a
//! stream that exceeds the ceiling aborts as soon as the limit is
//! crossed.

use std::sync::Arc;

use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{Request, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::metrics::SecurityMetrics;

/// State for the size-limit middleware.
#[derive(Clone)]
pub struct SizeLimitState {
    /// Body ceiling in bytes.
    pub max_bytes: u64,
    /// Shared counters.
    pub metrics: Arc<SecurityMetrics>,
}

fn too_large() -> Response {
    (
        StatusCode::PAYLOAD_TOO_LARGE,
        Json(json!({ "error": "payload_too_large" })),
    )
        .into_response()
}

/// Middleware enforcing the request body ceiling.
pub async fn limit_request_size(
    State(state): State<SizeLimitState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let declared = req
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());

    if let Some(length) = declared {
        if length > state.max_bytes {
            state.metrics.record_blocked();
            tracing::warn!(length, max = state.max_bytes, "declared body too large");
            return too_large();
        }
    }

    let (parts, body) = req.into_parts();
    match to_bytes(body, state.max_bytes as usize).await {
        Ok(bytes) => {
            let req = Request::from_parts(parts, Body::from(bytes));
            next.run(req).await
        }
        Err(_) => {
            state.metrics.record_blocked();
            tracing::warn!(max = state.max_bytes, "streamed body exceeded ceiling");
            too_large()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::middleware::from_fn_with_state;
    use axum::routing::post;
    use tower::ServiceExt;

    fn app(max_bytes: u64) -> (Router, Arc<SecurityMetrics>) {
        let metrics = Arc::new(SecurityMetrics::default());
        let router = Router::new()
            .route("/upload", post(|body: String| async move { body.len().to_string() }))
            .layer(from_fn_with_state(
                SizeLimitState {
                    max_bytes,
                    metrics: metrics.clone(),
                },
                limit_request_size,
            ));
        (router, metrics)
    }

    #[tokio::test]
    async fn test_body_under_limit_passes() {
        let (app, metrics) = app(1024);
        let response = app
            .oneshot(
                Request::post("/upload")
                    .body(Body::from(vec![b'a'; 512]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(metrics.snapshot().blocked_requests, 0);
    }

    #[tokio::test]
    async fn test_body_over_limit_is_rejected() {
        let (app, metrics) = app(256);
        let response = app
            .oneshot(
                Request::post("/upload")
                    .body(Body::from(vec![b'a'; 1024]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(metrics.snapshot().blocked_requests, 1);
    }

    #[tokio::test]
    async fn test_declared_length_rejected_without_reading() {
        let (app, _metrics) = app(256);
        let response = app
            .oneshot(
                Request::post("/upload")
                    .header(header::CONTENT_LENGTH, "99999")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
