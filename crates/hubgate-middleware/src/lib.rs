//! # hubgate-middleware
//!
//! Ordered per-request security pipeline for Hubgate, built as Axum
//! middleware layers. Each check may short-circuit with a 4xx response:
//!
//! 1. Security headers (CSP, HSTS, frame, sniff, XSS) - response side,
//!    always applied
//! 2. Rate limiting - api/auth/heavy profiles, keyed by authenticated
//!    user id else IP
//! 3. Input sanitization - recursive control-character stripping, then
//!    SQL-injection and XSS signature matching; a match hard-fails 400
//! 4. CSRF - per-session tokens on all non-GET requests outside login
//! 5. IP/Geo access control - allow/deny lists and country rules
//! 6. Request size limiting - body byte ceiling, 413 on overflow
//!
//! The pipeline is independent of the auth service; it cooperates
//! through the [`hubgate_core::RequestIdentity`] request extension that
//! the auth layer inserts. All checks increment the shared
//! [`SecurityMetrics`] counters.

pub mod access;
pub mod config;
pub mod csrf;
pub mod headers;
pub mod metrics;
pub mod rate_limit;
pub mod sanitize;
pub mod size_limit;

use std::sync::Arc;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};

use hubgate_store::KeyValueStore;

pub use access::{AccessControl, GeoResolver, StaticGeoResolver};
pub use config::SecurityConfig;
pub use csrf::CsrfProtection;
pub use metrics::{SecurityMetrics, SecurityMetricsSnapshot};

/// Errors raised while building the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// An IP list entry is neither an address nor a CIDR block.
    #[error("Invalid IP or CIDR entry '{entry}'")]
    InvalidIpEntry {
        /// The offending entry.
        entry: String,
    },
}

/// The assembled security pipeline.
///
/// Construct once, then [`apply`](SecurityPipeline::apply) it to a
/// router. The CSRF handle is exposed so login flows can issue
/// per-session tokens.
pub struct SecurityPipeline {
    config: SecurityConfig,
    metrics: Arc<SecurityMetrics>,
    csrf: Arc<CsrfProtection>,
    access: Arc<AccessControl>,
    limiters: rate_limit::RateLimiters,
}

impl SecurityPipeline {
    /// Builds the pipeline over the shared store.
    ///
    /// # Errors
    ///
    /// Returns an error if an IP allow/deny entry fails to parse.
    pub fn new(
        config: SecurityConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, PipelineError> {
        let metrics = Arc::new(SecurityMetrics::default());
        let csrf = Arc::new(CsrfProtection::new(store.clone(), config.csrf_token_ttl));
        let access = Arc::new(AccessControl::from_config(&config)?);
        let limiters = rate_limit::RateLimiters::new(&config, store);

        Ok(Self {
            config,
            metrics,
            csrf,
            access,
            limiters,
        })
    }

    /// Installs a geo resolver for country allow/deny rules.
    ///
    /// # Errors
    ///
    /// Returns an error if an IP allow/deny entry fails to parse.
    pub fn with_geo_resolver(
        mut self,
        resolver: Arc<dyn GeoResolver>,
    ) -> Result<Self, PipelineError> {
        self.access =
            Arc::new(AccessControl::from_config(&self.config)?.with_resolver(resolver));
        Ok(self)
    }

    /// The shared security counters.
    #[must_use]
    pub fn metrics(&self) -> Arc<SecurityMetrics> {
        self.metrics.clone()
    }

    /// The CSRF token service, for issuing per-session tokens at login.
    #[must_use]
    pub fn csrf(&self) -> Arc<CsrfProtection> {
        self.csrf.clone()
    }

    /// Applies the pipeline to a router in the documented order.
    ///
    /// Layers added later run earlier, so they are attached in reverse:
    /// the request flows headers → rate limit → sanitize → CSRF →
    /// access control → size limit → handler.
    #[must_use]
    pub fn apply(&self, router: Router) -> Router {
        let mut router = router;

        router = router.layer(from_fn_with_state(
            size_limit::SizeLimitState {
                max_bytes: self.config.max_request_bytes,
                metrics: self.metrics.clone(),
            },
            size_limit::limit_request_size,
        ));

        router = router.layer(from_fn_with_state(
            access::AccessState {
                control: self.access.clone(),
                metrics: self.metrics.clone(),
            },
            access::access_control,
        ));

        if self.config.enable_csrf {
            router = router.layer(from_fn_with_state(
                csrf::CsrfState {
                    csrf: self.csrf.clone(),
                    metrics: self.metrics.clone(),
                    exempt_paths: Arc::new(self.config.csrf_exempt_paths.clone()),
                },
                csrf::csrf_protection,
            ));
        }

        if self.config.enable_sanitization {
            router = router.layer(from_fn_with_state(
                sanitize::SanitizeState {
                    metrics: self.metrics.clone(),
                    max_bytes: self.config.max_request_bytes,
                },
                sanitize::sanitize_input,
            ));
        }

        if self.config.enable_rate_limit {
            router = router.layer(from_fn_with_state(
                rate_limit::RateLimitState {
                    limiters: self.limiters.clone(),
                    metrics: self.metrics.clone(),
                    auth_paths: Arc::new(self.config.auth_rate_limit_paths.clone()),
                    heavy_paths: Arc::new(self.config.heavy_rate_limit_paths.clone()),
                },
                rate_limit::rate_limit,
            ));
        }

        if self.config.enable_headers {
            router = router.layer(from_fn(headers::security_headers));
        }

        router
    }
}
