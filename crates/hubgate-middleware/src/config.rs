//! Security pipeline configuration.

use std::time::Duration;

use hubgate_store::RateLimiterConfig;
use serde::{Deserialize, Serialize};

/// Configuration for the security middleware pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Apply security response headers.
    pub enable_headers: bool,

    /// Apply rate limiting.
    pub enable_rate_limit: bool,

    /// Apply input sanitization and injection detection.
    pub enable_sanitization: bool,

    /// Apply CSRF protection to non-GET requests.
    pub enable_csrf: bool,

    /// Apply country allow/deny rules (requires a geo resolver).
    pub enable_geo_blocking: bool,

    /// Request body ceiling in bytes.
    pub max_request_bytes: u64,

    /// IPs/CIDRs always allowed; when non-empty, everything else is
    /// blocked.
    pub ip_allowlist: Vec<String>,

    /// IPs/CIDRs always blocked.
    pub ip_denylist: Vec<String>,

    /// Countries allowed (ISO codes); when non-empty, all others are
    /// blocked.
    pub allowed_countries: Vec<String>,

    /// Countries blocked (ISO codes).
    pub blocked_countries: Vec<String>,

    /// Paths exempt from CSRF (prefix match).
    pub csrf_exempt_paths: Vec<String>,

    /// Lifetime of issued CSRF tokens.
    #[serde(with = "humantime_serde")]
    pub csrf_token_ttl: Duration,

    /// Paths rate limited under the strict auth profile (prefix match).
    pub auth_rate_limit_paths: Vec<String>,

    /// Paths rate limited under the heavy-operation profile (prefix
    /// match).
    pub heavy_rate_limit_paths: Vec<String>,

    /// General API profile: 100 requests per 60 seconds.
    pub api_limit: RateLimiterConfig,

    /// Auth profile: 5 per 60 seconds, then a 15-minute block.
    pub auth_limit: RateLimiterConfig,

    /// Heavy-operation profile: 10 per 5 minutes.
    pub heavy_limit: RateLimiterConfig,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_headers: true,
            enable_rate_limit: true,
            enable_sanitization: true,
            enable_csrf: true,
            enable_geo_blocking: false,
            max_request_bytes: 10 * 1024 * 1024,
            ip_allowlist: Vec::new(),
            ip_denylist: Vec::new(),
            allowed_countries: Vec::new(),
            blocked_countries: Vec::new(),
            csrf_exempt_paths: vec!["/auth/login".to_string()],
            csrf_token_ttl: Duration::from_secs(24 * 60 * 60),
            auth_rate_limit_paths: vec!["/auth".to_string(), "/oauth".to_string()],
            heavy_rate_limit_paths: Vec::new(),
            api_limit: RateLimiterConfig::new(100, Duration::from_secs(60))
                .with_block(Duration::from_secs(300)),
            auth_limit: RateLimiterConfig::new(5, Duration::from_secs(60))
                .with_block(Duration::from_secs(900)),
            heavy_limit: RateLimiterConfig::new(10, Duration::from_secs(300)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SecurityConfig::default();
        assert!(config.enable_headers);
        assert!(config.enable_csrf);
        assert!(!config.enable_geo_blocking);
        assert_eq!(config.max_request_bytes, 10 * 1024 * 1024);
        assert_eq!(config.api_limit.points, 100);
        assert_eq!(config.auth_limit.points, 5);
        assert_eq!(config.auth_limit.block_duration, Duration::from_secs(900));
        assert_eq!(config.heavy_limit.points, 10);
        assert_eq!(config.heavy_limit.window, Duration::from_secs(300));
        assert_eq!(config.csrf_exempt_paths, vec!["/auth/login"]);
    }

    #[test]
    fn test_deserialization_with_humantime() {
        let config: SecurityConfig = serde_json::from_str(
            r#"{
                "max_request_bytes": 1048576,
                "csrf_token_ttl": "12h",
                "blocked_countries": ["XX"]
            }"#,
        )
        .unwrap();
        assert_eq!(config.max_request_bytes, 1_048_576);
        assert_eq!(config.csrf_token_ttl, Duration::from_secs(43_200));
        assert_eq!(config.blocked_countries, vec!["XX"]);
    }
}
