//! In-memory storage backend.
//!
//! A [`DashMap`]-backed implementation of [`KeyValueStore`] for tests
//! and single-node deployments. Entries carry an optional deadline and
//! are expired lazily on access; [`MemoryStore::purge_expired`] can be
//! called periodically to reclaim memory.
//!
//! Cross-process deployments substitute a shared backend (e.g. Redis)
//! implementing the same trait; nothing above this layer changes.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StorageError;
use crate::kv::KeyValueStore;

/// A stored entry with an optional expiry deadline.
#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// In-process [`KeyValueStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, Entry>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Removes all expired entries and returns how many were purged.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    /// Number of live entries (expired entries may still be counted
    /// until purged).
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the store holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        // The read guard must be released before removing an expired
        // entry, or the removal would deadlock on the shard lock.
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            self.entries.remove(key);
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        match self.entries.remove(key) {
            Some((_, entry)) => Ok(!entry.is_expired()),
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn take(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        // DashMap::remove is atomic per key, so concurrent takers see at
        // most one Some.
        match self.entries.remove(key) {
            Some((_, entry)) if !entry.is_expired() => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }

    async fn incr(&self, key: &str, window: Duration) -> Result<u64, StorageError> {
        // The entry lock held by the DashMap shard makes the
        // read-modify-write atomic.
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(0u64.to_le_bytes().to_vec(), Some(window)));

        if entry.is_expired() {
            *entry = Entry::new(0u64.to_le_bytes().to_vec(), Some(window));
        }

        let bytes: [u8; 8] = entry
            .value
            .as_slice()
            .try_into()
            .map_err(|_| StorageError::corrupt_value(key))?;
        let count = u64::from_le_bytes(bytes) + 1;
        entry.value = count.to_le_bytes().to_vec();

        Ok(count)
    }
}
