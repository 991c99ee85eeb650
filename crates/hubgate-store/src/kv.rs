//! Key-value storage trait.
//!
//! Defines the interface all Hubgate storage backends implement. The
//! contract mirrors what a shared TTL-capable store (such as Redis)
//! offers: byte values with optional expiry, atomic consume-and-delete,
//! and atomic fixed-window counters.
//!
//! # Implementation Notes
//!
//! Implementations must:
//!
//! - Treat expired entries as absent from every operation
//! - Make [`take`](KeyValueStore::take) atomic: concurrent callers must
//!   see at most one `Some` result per stored value (authorization-code
//!   single-use depends on this)
//! - Make [`incr`](KeyValueStore::incr) atomic and bind the window TTL
//!   when the counter is first created

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StorageError;

/// Storage operations for TTL-bound key-value state.
///
/// Implementations must be thread-safe (`Send + Sync`). All methods are
/// bounded by the backend's own timeout; none blocks indefinitely.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the value for a key.
    ///
    /// Returns `None` if the key is absent or expired.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Writes a value, overwriting any existing entry.
    ///
    /// A `ttl` of `None` stores the value without expiry.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
    -> Result<(), StorageError>;

    /// Deletes a key.
    ///
    /// Returns `true` if a live entry was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Returns `true` if the key holds a live (unexpired) value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn exists(&self, key: &str) -> Result<bool, StorageError>;

    /// Atomically removes and returns the value for a key.
    ///
    /// This is the single-use primitive: when several callers race on the
    /// same key, at most one receives `Some`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails.
    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Atomically increments a fixed-window counter and returns the new
    /// count.
    ///
    /// The first increment creates the counter with `window` as its TTL;
    /// later increments within the window do not extend it. Once the
    /// window expires the next increment starts a fresh one at 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend operation fails or the key holds
    /// a non-counter value.
    async fn incr(&self, key: &str, window: Duration) -> Result<u64, StorageError>;
}

/// JSON convenience helpers over [`KeyValueStore`].
///
/// Blanket-implemented for every store, including trait objects, so
/// typed records (sessions, OAuth2 codes, client registrations) can be
/// stored without each call site repeating the serde plumbing.
#[async_trait]
pub trait KeyValueStoreExt: KeyValueStore {
    /// Reads and deserializes a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored bytes are not
    /// valid JSON for `T`.
    async fn get_json<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Serializes and writes a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the backend operation fails.
    async fn put_json<T>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        let bytes = serde_json::to_vec(value)?;
        self.put(key, bytes, ttl).await
    }

    /// Atomically removes and deserializes a JSON value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails or the stored bytes are not
    /// valid JSON for `T`.
    async fn take_json<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        match self.take(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStoreExt for S {}
