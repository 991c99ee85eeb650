//! Shared security counters.
//!
//! Every check in the pipeline increments these on a block, so
//! operators can watch attack pressure without parsing logs.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use time::OffsetDateTime;

/// Atomic counters shared across all pipeline layers.
#[derive(Debug, Default)]
pub struct SecurityMetrics {
    blocked_requests: AtomicU64,
    xss_attempts: AtomicU64,
    sql_injection_attempts: AtomicU64,
    csrf_attempts: AtomicU64,
    rate_limit_hits: AtomicU64,
    geo_blocks: AtomicU64,
    ip_blocks: AtomicU64,
}

/// Point-in-time view of the counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityMetricsSnapshot {
    /// Requests short-circuited by any check.
    pub blocked_requests: u64,
    /// XSS signature matches.
    pub xss_attempts: u64,
    /// SQL-injection signature matches.
    pub sql_injection_attempts: u64,
    /// Missing or invalid CSRF tokens.
    pub csrf_attempts: u64,
    /// Rate limit rejections.
    pub rate_limit_hits: u64,
    /// Country-rule blocks.
    pub geo_blocks: u64,
    /// IP-rule blocks.
    pub ip_blocks: u64,
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl SecurityMetrics {
    /// Records a blocked request.
    pub fn record_blocked(&self) {
        self.blocked_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an XSS signature match.
    pub fn record_xss(&self) {
        self.xss_attempts.fetch_add(1, Ordering::Relaxed);
        self.record_blocked();
    }

    /// Records a SQL-injection signature match.
    pub fn record_sql_injection(&self) {
        self.sql_injection_attempts.fetch_add(1, Ordering::Relaxed);
        self.record_blocked();
    }

    /// Records a CSRF failure.
    pub fn record_csrf(&self) {
        self.csrf_attempts.fetch_add(1, Ordering::Relaxed);
        self.record_blocked();
    }

    /// Records a rate-limit rejection.
    pub fn record_rate_limit(&self) {
        self.rate_limit_hits.fetch_add(1, Ordering::Relaxed);
        self.record_blocked();
    }

    /// Records a country-rule block.
    pub fn record_geo_block(&self) {
        self.geo_blocks.fetch_add(1, Ordering::Relaxed);
        self.record_blocked();
    }

    /// Records an IP-rule block.
    pub fn record_ip_block(&self) {
        self.ip_blocks.fetch_add(1, Ordering::Relaxed);
        self.record_blocked();
    }

    /// Takes a snapshot of the counters.
    #[must_use]
    pub fn snapshot(&self) -> SecurityMetricsSnapshot {
        SecurityMetricsSnapshot {
            blocked_requests: self.blocked_requests.load(Ordering::Relaxed),
            xss_attempts: self.xss_attempts.load(Ordering::Relaxed),
            sql_injection_attempts: self.sql_injection_attempts.load(Ordering::Relaxed),
            csrf_attempts: self.csrf_attempts.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            geo_blocks: self.geo_blocks.load(Ordering::Relaxed),
            ip_blocks: self.ip_blocks.load(Ordering::Relaxed),
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Resets every counter to zero.
    pub fn reset(&self) {
        self.blocked_requests.store(0, Ordering::Relaxed);
        self.xss_attempts.store(0, Ordering::Relaxed);
        self.sql_injection_attempts.store(0, Ordering::Relaxed);
        self.csrf_attempts.store(0, Ordering::Relaxed);
        self.rate_limit_hits.store(0, Ordering::Relaxed);
        self.geo_blocks.store(0, Ordering::Relaxed);
        self.ip_blocks.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_specific_counters_also_count_as_blocked() {
        let metrics = SecurityMetrics::default();
        metrics.record_xss();
        metrics.record_sql_injection();
        metrics.record_csrf();
        metrics.record_rate_limit();
        metrics.record_geo_block();
        metrics.record_ip_block();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.xss_attempts, 1);
        assert_eq!(snapshot.sql_injection_attempts, 1);
        assert_eq!(snapshot.csrf_attempts, 1);
        assert_eq!(snapshot.rate_limit_hits, 1);
        assert_eq!(snapshot.geo_blocks, 1);
        assert_eq!(snapshot.ip_blocks, 1);
        assert_eq!(snapshot.blocked_requests, 6);
    }

    #[test]
    fn test_reset() {
        let metrics = SecurityMetrics::default();
        metrics.record_csrf();
        metrics.reset();
        assert_eq!(metrics.snapshot().blocked_requests, 0);
        assert_eq!(metrics.snapshot().csrf_attempts, 0);
    }
}
