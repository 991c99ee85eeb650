//! IP and geographic access control.
//!
//! Allow/deny lists accept exact IPs or CIDR blocks. Country rules go
//! through an injected [`GeoResolver`] capability rather than a bundled
//! geolocation database; [`StaticGeoResolver`] serves tests and
//! fixed-mapping deployments.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, State};
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ipnetwork::IpNetwork;
use serde_json::json;

use hubgate_core::RequestIdentity;

use crate::PipelineError;
use crate::config::SecurityConfig;
use crate::metrics::SecurityMetrics;

/// Resolves an IP address to an ISO country code.
pub trait GeoResolver: Send + Sync {
    /// Country code for the address, if known.
    fn country_code(&self, ip: IpAddr) -> Option<String>;
}

/// Fixed-mapping resolver for tests and static deployments.
#[derive(Debug, Default)]
pub struct StaticGeoResolver {
    countries: HashMap<IpAddr, String>,
}

impl StaticGeoResolver {
    /// Creates an empty resolver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps an address to a country code.
    #[must_use]
    pub fn with(mut self, ip: IpAddr, country: impl Into<String>) -> Self {
        self.countries.insert(ip, country.into());
        self
    }
}

impl GeoResolver for StaticGeoResolver {
    fn country_code(&self, ip: IpAddr) -> Option<String> {
        self.countries.get(&ip).cloned()
    }
}

/// An allow/deny list entry: exact address or CIDR block.
#[derive(Debug, Clone)]
enum IpRule {
    Exact(IpAddr),
    Block(IpNetwork),
}

impl IpRule {
    fn parse(entry: &str) -> Result<Self, PipelineError> {
        if let Ok(ip) = entry.parse::<IpAddr>() {
            return Ok(Self::Exact(ip));
        }
        entry
            .parse::<IpNetwork>()
            .map(Self::Block)
            .map_err(|_| PipelineError::InvalidIpEntry {
                entry: entry.to_string(),
            })
    }

    fn matches(&self, ip: IpAddr) -> bool {
        match self {
            Self::Exact(rule) => *rule == ip,
            Self::Block(network) => network.contains(ip),
        }
    }
}

/// Why a request was blocked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// Allowed through.
    Allowed,
    /// Blocked by an IP rule.
    BlockedIp,
    /// Blocked by a country rule.
    BlockedCountry,
}

/// IP and country access rules.
pub struct AccessControl {
    allowlist: Vec<IpRule>,
    denylist: Vec<IpRule>,
    allowed_countries: Vec<String>,
    blocked_countries: Vec<String>,
    geo_enabled: bool,
    resolver: Option<Arc<dyn GeoResolver>>,
}

impl AccessControl {
    /// Builds the rules from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if an IP entry is neither an address nor a CIDR
    /// block.
    pub fn from_config(config: &SecurityConfig) -> Result<Self, PipelineError> {
        let parse_list = |entries: &[String]| -> Result<Vec<IpRule>, PipelineError> {
            entries.iter().map(|entry| IpRule::parse(entry)).collect()
        };

        Ok(Self {
            allowlist: parse_list(&config.ip_allowlist)?,
            denylist: parse_list(&config.ip_denylist)?,
            allowed_countries: config.allowed_countries.clone(),
            blocked_countries: config.blocked_countries.clone(),
            geo_enabled: config.enable_geo_blocking,
            resolver: None,
        })
    }

    /// Installs the geo resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn GeoResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Evaluates an address against the rules.
    #[must_use]
    pub fn evaluate(&self, ip: IpAddr) -> AccessDecision {
        // A non-empty allowlist blocks everything outside it.
        if !self.allowlist.is_empty() && !self.allowlist.iter().any(|rule| rule.matches(ip)) {
            return AccessDecision::BlockedIp;
        }

        if self.denylist.iter().any(|rule| rule.matches(ip)) {
            return AccessDecision::BlockedIp;
        }

        if self.geo_enabled {
            if let Some(country) = self
                .resolver
                .as_ref()
                .and_then(|resolver| resolver.country_code(ip))
            {
                if self.blocked_countries.contains(&country) {
                    return AccessDecision::BlockedCountry;
                }
                if !self.allowed_countries.is_empty()
                    && !self.allowed_countries.contains(&country)
                {
                    return AccessDecision::BlockedCountry;
                }
            }
        }

        AccessDecision::Allowed
    }
}

/// State for the access-control middleware.
#[derive(Clone)]
pub struct AccessState {
    /// The rules.
    pub control: Arc<AccessControl>,
    /// Shared counters.
    pub metrics: Arc<SecurityMetrics>,
}

fn peer_ip(req: &Request<Body>) -> Option<IpAddr> {
    if let Some(identity) = req.extensions().get::<RequestIdentity>() {
        if let Ok(ip) = identity.ip.parse() {
            return Some(ip);
        }
    }
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

/// Middleware enforcing the IP and country rules.
pub async fn access_control(
    State(state): State<AccessState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(ip) = peer_ip(&req) else {
        // No peer address available (e.g. in-process tests without
        // identity): nothing to evaluate.
        return next.run(req).await;
    };

    match state.control.evaluate(ip) {
        AccessDecision::Allowed => next.run(req).await,
        AccessDecision::BlockedIp => {
            state.metrics.record_ip_block();
            tracing::warn!(%ip, "request blocked by IP rule");
            denied()
        }
        AccessDecision::BlockedCountry => {
            state.metrics.record_geo_block();
            tracing::warn!(%ip, "request blocked by country rule");
            denied()
        }
    }
}

fn denied() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "access_denied" })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(
        allow: &[&str],
        deny: &[&str],
        allowed_countries: &[&str],
        blocked_countries: &[&str],
    ) -> SecurityConfig {
        let mut config = SecurityConfig::default();
        config.ip_allowlist = allow.iter().map(|s| (*s).to_string()).collect();
        config.ip_denylist = deny.iter().map(|s| (*s).to_string()).collect();
        config.allowed_countries = allowed_countries.iter().map(|s| (*s).to_string()).collect();
        config.blocked_countries = blocked_countries.iter().map(|s| (*s).to_string()).collect();
        config.enable_geo_blocking =
            !(allowed_countries.is_empty() && blocked_countries.is_empty());
        config
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_denylist_exact_and_cidr() {
        let control =
            AccessControl::from_config(&config_with(&[], &["203.0.113.7", "10.0.0.0/8"], &[], &[]))
                .unwrap();

        assert_eq!(control.evaluate(ip("203.0.113.7")), AccessDecision::BlockedIp);
        assert_eq!(control.evaluate(ip("10.200.1.2")), AccessDecision::BlockedIp);
        assert_eq!(control.evaluate(ip("198.51.100.1")), AccessDecision::Allowed);
    }

    #[test]
    fn test_allowlist_blocks_everyone_else() {
        let control =
            AccessControl::from_config(&config_with(&["192.168.0.0/16"], &[], &[], &[])).unwrap();

        assert_eq!(control.evaluate(ip("192.168.4.4")), AccessDecision::Allowed);
        assert_eq!(control.evaluate(ip("8.8.8.8")), AccessDecision::BlockedIp);
    }

    #[test]
    fn test_country_rules() {
        let resolver = Arc::new(
            StaticGeoResolver::new()
                .with(ip("203.0.113.1"), "XA")
                .with(ip("203.0.113.2"), "XB"),
        );
        let control = AccessControl::from_config(&config_with(&[], &[], &[], &["XA"]))
            .unwrap()
            .with_resolver(resolver.clone());

        assert_eq!(
            control.evaluate(ip("203.0.113.1")),
            AccessDecision::BlockedCountry
        );
        assert_eq!(control.evaluate(ip("203.0.113.2")), AccessDecision::Allowed);
        // Unresolvable addresses pass the country check.
        assert_eq!(control.evaluate(ip("198.51.100.9")), AccessDecision::Allowed);

        // Allowed-country mode restricts to the listed set.
        let restricted = AccessControl::from_config(&config_with(&[], &[], &["XA"], &[]))
            .unwrap()
            .with_resolver(resolver);
        assert_eq!(restricted.evaluate(ip("203.0.113.1")), AccessDecision::Allowed);
        assert_eq!(
            restricted.evaluate(ip("203.0.113.2")),
            AccessDecision::BlockedCountry
        );
    }

    #[test]
    fn test_geo_rules_ignored_without_resolver() {
        let control =
            AccessControl::from_config(&config_with(&[], &[], &[], &["XA"])).unwrap();
        assert_eq!(control.evaluate(ip("203.0.113.1")), AccessDecision::Allowed);
    }

    #[test]
    fn test_invalid_entry_is_rejected() {
        assert!(matches!(
            AccessControl::from_config(&config_with(&["not-an-ip"], &[], &[], &[])),
            Err(PipelineError::InvalidIpEntry { .. })
        ));
    }
}
