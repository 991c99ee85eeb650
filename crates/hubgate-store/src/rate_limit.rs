//! Fixed-window rate limiting with block escalation.
//!
//! Counters live in the shared [`KeyValueStore`], so every instance of a
//! horizontally scaled service sees the same windows. A key that exceeds
//! its allowance inside one window escalates to a block marker: further
//! attempts are rejected for the whole block duration rather than until
//! the window rolls over. This is the only place in the system where
//! repeated failures produce growing denial instead of immediate retry.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::kv::KeyValueStore;

/// Configuration for a fixed-window rate limiter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimiterConfig {
    /// Attempts allowed per window.
    pub points: u64,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// How long a key stays blocked after exhausting the window.
    /// `Duration::ZERO` disables escalation: the key is simply rejected
    /// until the window rolls over.
    #[serde(with = "humantime_serde", default)]
    pub block_duration: Duration,
}

impl RateLimiterConfig {
    /// Creates a configuration without block escalation.
    #[must_use]
    pub fn new(points: u64, window: Duration) -> Self {
        Self {
            points,
            window,
            block_duration: Duration::ZERO,
        }
    }

    /// Sets the block duration.
    #[must_use]
    pub fn with_block(mut self, block_duration: Duration) -> Self {
        self.block_duration = block_duration;
        self
    }
}

/// Errors returned by [`RateLimiter::check`].
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The key has exhausted its allowance.
    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    Exceeded {
        /// How long the caller should wait before retrying.
        retry_after: Duration,
    },

    /// The underlying store failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl RateLimitError {
    /// Returns the retry-after hint if this is an `Exceeded` error.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Exceeded { retry_after } => Some(*retry_after),
            Self::Storage(_) => None,
        }
    }
}

/// Fixed-window rate limiter over a shared key-value store.
///
/// Each limiter instance owns a key prefix so independent limiters
/// (login, MFA, OAuth2 authorize/token, middleware profiles) never
/// collide in the store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    prefix: String,
    config: RateLimiterConfig,
}

impl RateLimiter {
    /// Creates a new rate limiter.
    ///
    /// # Arguments
    ///
    /// * `store` - Shared counter storage
    /// * `prefix` - Namespace for this limiter's keys (e.g. `"login"`)
    /// * `config` - Window and block configuration
    #[must_use]
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        prefix: impl Into<String>,
        config: RateLimiterConfig,
    ) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            config,
        }
    }

    /// Records an attempt for `key` and rejects it once the allowance is
    /// exhausted.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::Exceeded`] with a retry-after hint when
    /// the key is blocked or over its window allowance, or
    /// [`RateLimitError::Storage`] if the store fails.
    pub async fn check(&self, key: &str) -> Result<(), RateLimitError> {
        let block_key = format!("{}:block:{}", self.prefix, key);

        if self.store.exists(&block_key).await? {
            return Err(RateLimitError::Exceeded {
                retry_after: self.config.block_duration,
            });
        }

        let count_key = format!("{}:count:{}", self.prefix, key);
        let count = self.store.incr(&count_key, self.config.window).await?;

        if count <= self.config.points {
            return Ok(());
        }

        let retry_after = if self.config.block_duration > Duration::ZERO {
            self.store
                .put(&block_key, Vec::new(), Some(self.config.block_duration))
                .await?;
            tracing::warn!(
                prefix = %self.prefix,
                key,
                count,
                "rate limit exceeded, key blocked"
            );
            self.config.block_duration
        } else {
            // No escalation configured: the key frees up when the window
            // rolls over, so the window length is the upper bound.
            self.config.window
        };

        Err(RateLimitError::Exceeded { retry_after })
    }

    /// Clears all counters and blocks for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn reset(&self, key: &str) -> Result<(), StorageError> {
        self.store
            .delete(&format!("{}:count:{}", self.prefix, key))
            .await?;
        self.store
            .delete(&format!("{}:block:{}", self.prefix, key))
            .await?;
        Ok(())
    }

    /// The configured allowance per window.
    #[must_use]
    pub fn points(&self) -> u64 {
        self.config.points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;

    fn limiter(points: u64, window: Duration, block: Duration) -> RateLimiter {
        RateLimiter::new(
            Arc::new(MemoryStore::new()),
            "test",
            RateLimiterConfig::new(points, window).with_block(block),
        )
    }

    #[tokio::test]
    async fn test_allows_up_to_points() {
        let limiter = limiter(3, Duration::from_secs(60), Duration::ZERO);

        for _ in 0..3 {
            assert!(limiter.check("ip:1.2.3.4").await.is_ok());
        }
        assert!(limiter.check("ip:1.2.3.4").await.is_err());
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60), Duration::ZERO);

        assert!(limiter.check("ip:1.1.1.1").await.is_ok());
        assert!(limiter.check("ip:1.1.1.1").await.is_err());
        assert!(limiter.check("ip:2.2.2.2").await.is_ok());
    }

    #[tokio::test]
    async fn test_exhaustion_escalates_to_block() {
        let limiter = limiter(2, Duration::from_secs(60), Duration::from_secs(900));

        assert!(limiter.check("k").await.is_ok());
        assert!(limiter.check("k").await.is_ok());
        let err = limiter.check("k").await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(900)));

        // Once blocked, every further attempt is rejected with the block
        // duration, not the window.
        let err = limiter.check("k").await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(900)));
    }

    #[tokio::test]
    async fn test_expired_window_frees_unblocked_key() {
        // Zero-length window: each attempt starts a fresh window, so the
        // key never exhausts its allowance.
        let limiter = limiter(1, Duration::ZERO, Duration::from_secs(900));

        assert!(limiter.check("k").await.is_ok());
        assert!(limiter.check("k").await.is_ok());
    }

    #[tokio::test]
    async fn test_retry_after_without_block_is_window() {
        let limiter = limiter(1, Duration::from_secs(60), Duration::ZERO);

        assert!(limiter.check("k").await.is_ok());
        let err = limiter.check("k").await.unwrap_err();
        assert_eq!(err.retry_after(), Some(Duration::from_secs(60)));
    }

    #[tokio::test]
    async fn test_reset_clears_counters_and_blocks() {
        let limiter = limiter(1, Duration::from_secs(60), Duration::from_secs(900));

        assert!(limiter.check("k").await.is_ok());
        assert!(limiter.check("k").await.is_err());

        limiter.reset("k").await.unwrap();
        assert!(limiter.check("k").await.is_ok());
    }
}
