//! # hubgate-store
//!
//! Storage abstraction for the Hubgate identity and data-protection core.
//!
//! All cross-process state in Hubgate (sessions, token blacklists, OAuth2
//! codes and refresh records, rate-limiter counters, CSRF tokens) lives
//! behind the [`KeyValueStore`] trait: a TTL-capable key-value contract
//! that a shared backend (e.g. Redis) implements in production. The
//! services themselves stay stateless and horizontally scalable.
//!
//! This crate provides:
//! - [`KeyValueStore`] - the async storage trait, including the atomic
//!   `take` (consume-and-delete) and `incr` (fixed-window counter)
//!   primitives the auth flows depend on
//! - [`MemoryStore`] - an in-process implementation for tests and
//!   single-node deployments
//! - [`RateLimiter`] - fixed-window rate limiting with block escalation,
//!   built on the counter primitive

pub mod error;
pub mod kv;
pub mod memory;
pub mod rate_limit;

pub use error::StorageError;
pub use kv::{KeyValueStore, KeyValueStoreExt};
pub use memory::MemoryStore;
pub use rate_limit::{RateLimitError, RateLimiter, RateLimiterConfig};

/// Type alias for storage results.
pub type StoreResult<T> = Result<T, StorageError>;
