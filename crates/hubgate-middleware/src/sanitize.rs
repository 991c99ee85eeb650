//! Input sanitization and injection detection.
//!
//! JSON bodies are sanitized recursively (control characters stripped
//! from every string, depth capped at 10), then the serialized request
//! content - body, query string, and path - is matched against
//! SQL-injection and XSS signatures. A signature match hard-fails the
//! request with 400 rather than silently stripping: a request caught
//! attacking is not worth repairing.

use std::sync::Arc;
use std::sync::LazyLock;

use axum::body::{Body, to_bytes};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use regex::RegexSet;
use serde_json::{Value, json};

use crate::metrics::SecurityMetrics;

/// Recursion ceiling for nested payloads.
const MAX_DEPTH: usize = 10;

/// SQL-injection signatures.
static SQL_INJECTION_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)\b(union\s+select|insert\s+into|update\s+\w+\s+set|delete\s+from|drop\s+(table|database)|alter\s+table|exec(ute)?\s)",
        r"(?i)select\s+.+\s+from\s",
        r"(--|;--|/\*|\*/|@@)",
        r"(?i)'\s*(or|and)\s+[^']*=",
        r"%3B|%2D%2D",
    ])
    .expect("SQL injection patterns are valid")
});

/// XSS signatures.
static XSS_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)<script\b",
        r"(?i)javascript:",
        r"(?i)\bon\w+\s*=",
        r"(?i)<(iframe|object|embed|link)\b",
    ])
    .expect("XSS patterns are valid")
});

/// State for the sanitization middleware.
#[derive(Clone)]
pub struct SanitizeState {
    /// Shared counters.
    pub metrics: Arc<SecurityMetrics>,
    /// Body buffering ceiling (same as the size-limit layer, so this
    /// layer can never be tricked into unbounded buffering).
    pub max_bytes: u64,
}

/// Strips ASCII control characters (including DEL) from a string.
fn strip_control_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_ascii_control())
        .collect()
}

/// Recursively sanitizes every string in a JSON value, capped at
/// [`MAX_DEPTH`]. Deeper levels are left untouched.
pub fn sanitize_value(value: &mut Value, depth: usize) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::String(text) => {
            if text.chars().any(|c| c.is_ascii_control()) {
                *text = strip_control_chars(text);
            }
        }
        Value::Array(items) => {
            for item in items {
                sanitize_value(item, depth + 1);
            }
        }
        Value::Object(map) => {
            for (_, item) in map.iter_mut() {
                sanitize_value(item, depth + 1);
            }
        }
        _ => {}
    }
}

/// Returns `true` if the content matches a SQL-injection signature.
#[must_use]
pub fn detect_sql_injection(content: &str) -> bool {
    SQL_INJECTION_PATTERNS.is_match(content)
}

/// Returns `true` if the content matches an XSS signature.
#[must_use]
pub fn detect_xss(content: &str) -> bool {
    XSS_PATTERNS.is_match(content)
}

fn invalid_input_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": "invalid_input",
            "error_description": "Request contains potentially malicious content"
        })),
    )
        .into_response()
}

/// Middleware sanitizing request input and rejecting injection
/// signatures.
pub async fn sanitize_input(
    State(state): State<SanitizeState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let (parts, body) = req.into_parts();

    let Ok(bytes) = to_bytes(body, state.max_bytes as usize).await else {
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({ "error": "payload_too_large" })),
        )
            .into_response();
    };

    // Sanitize JSON bodies in place; other content types pass through
    // byte-identical and are only pattern-checked.
    let (body_bytes, body_text) = match serde_json::from_slice::<Value>(&bytes) {
        Ok(mut value) => {
            sanitize_value(&mut value, 0);
            let text = value.to_string();
            (text.clone().into_bytes(), text)
        }
        Err(_) => (
            bytes.to_vec(),
            String::from_utf8_lossy(&bytes).into_owned(),
        ),
    };

    // Match against the decoded query, not the percent-encoded wire
    // form, so encoded payloads cannot slip past the signatures.
    let query = parts.uri.query().unwrap_or_default();
    let decoded_query: String = url::form_urlencoded::parse(query.as_bytes())
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join("&");
    let path = parts.uri.path();
    let content = format!("{path} {decoded_query} {body_text}");

    if detect_sql_injection(&content) {
        state.metrics.record_sql_injection();
        tracing::warn!(%path, "SQL injection signature detected");
        return invalid_input_response();
    }

    if detect_xss(&content) {
        state.metrics.record_xss();
        tracing::warn!(%path, "XSS signature detected");
        return invalid_input_response();
    }

    let req = Request::from_parts(parts, Body::from(body_bytes));
    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_control_chars() {
        assert_eq!(strip_control_chars("he\x00llo\x1fworld\x7f"), "helloworld");
        assert_eq!(strip_control_chars("line1\nline2\ttab"), "line1line2tab");
        assert_eq!(strip_control_chars("clean"), "clean");
    }

    #[test]
    fn test_sanitize_value_recurses_with_depth_cap() {
        let mut value = json!({
            "name": "a\x00b",
            "nested": { "list": ["c\x1fd", 42, { "deep": "e\x7ff" }] }
        });
        sanitize_value(&mut value, 0);

        assert_eq!(value["name"], "ab");
        assert_eq!(value["nested"]["list"][0], "cd");
        assert_eq!(value["nested"]["list"][2]["deep"], "ef");

        // Beyond the cap the value is left as-is.
        let mut deep = json!("x\x00y");
        sanitize_value(&mut deep, MAX_DEPTH + 1);
        assert_eq!(deep, "x\u{0}y");
    }

    #[test]
    fn test_sql_injection_signatures() {
        assert!(detect_sql_injection("1' OR 1=1"));
        assert!(detect_sql_injection("UNION SELECT password FROM users"));
        assert!(detect_sql_injection("x; DROP TABLE campaigns"));
        assert!(detect_sql_injection("name'--"));
        assert!(detect_sql_injection("/* comment */ select 1 from t"));
    }

    #[test]
    fn test_benign_content_is_not_flagged_as_sql() {
        assert!(!detect_sql_injection(r#"{"email":"ada@example.com"}"#));
        assert!(!detect_sql_injection("a perfectly ordinary sentence"));
        assert!(!detect_sql_injection(r#"{"note":"choose a plan in the pricing menu"}"#));
    }

    #[test]
    fn test_xss_signatures() {
        assert!(detect_xss("<script>alert(1)</script>"));
        assert!(detect_xss("<SCRIPT src=x>"));
        assert!(detect_xss("javascript:alert(1)"));
        assert!(detect_xss(r#"<img src=x onerror=alert(1)>"#));
        assert!(detect_xss("<iframe src=//evil>"));
    }

    #[test]
    fn test_benign_content_is_not_flagged_as_xss() {
        assert!(!detect_xss(r#"{"title":"Q3 campaign <draft>"}"#));
        assert!(!detect_xss("plain text with no markup"));
    }
}
