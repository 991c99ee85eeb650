//! Encryption key lifecycle management.
//!
//! Per-purpose keys are generated on demand, sealed under the master key
//! before they touch disk, and rotated by archiving the outgoing version
//! under a derived id (`{key_id}_v{version}`). Archived keys are never
//! deleted by rotation: ciphertexts sealed before the rotation still
//! reference them. The only operation that destroys key material is
//! [`KeyManager::delete`].
//!
//! The in-memory key map is a [`DashMap`], so rotation swaps entries
//! atomically and never blocks concurrent encrypt/decrypt callers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use dashmap::DashMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::fs;

use crate::envelope::{self, ALGORITHM, KEY_LEN};
use crate::error::CryptoError;
use crate::master::{MasterKey, restrict_permissions};

/// AAD binding stored key files to their purpose, so a key file cannot
/// be replayed as ordinary ciphertext.
const KEY_ENCRYPTION_AAD: &[u8] = b"key-encryption";

/// Lifecycle status of a stored key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    /// The key is the current one for its id; new ciphertexts use it.
    Active,
    /// The key was rotated out and is retained for old ciphertexts.
    Archived,
}

/// Metadata persisted alongside each key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyMetadata {
    /// Key id (archived versions carry the derived `{id}_v{n}` form).
    pub key_id: String,

    /// What the key protects (e.g. `pii`, `general`).
    pub purpose: String,

    /// Algorithm identifier.
    pub algorithm: String,

    /// Monotonic version, starting at 1.
    pub version: u32,

    /// How many rotations this id has been through.
    pub rotation_count: u32,

    /// Lifecycle status.
    pub status: KeyStatus,

    /// When this key version was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the id was last rotated.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub rotated_at: Option<OffsetDateTime>,

    /// When this version was archived.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub archived_at: Option<OffsetDateTime>,
}

impl KeyMetadata {
    fn new(key_id: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            purpose: purpose.into(),
            algorithm: ALGORITHM.to_string(),
            version: 1,
            rotation_count: 0,
            status: KeyStatus::Active,
            created_at: OffsetDateTime::now_utc(),
            rotated_at: None,
            archived_at: None,
        }
    }

    /// Age of this key version.
    #[must_use]
    pub fn age(&self) -> Duration {
        let seconds = (OffsetDateTime::now_utc() - self.created_at).whole_seconds();
        Duration::from_secs(seconds.max(0) as u64)
    }
}

/// A key with its metadata, held in memory.
#[derive(Clone)]
struct KeyEntry {
    key: [u8; KEY_LEN],
    metadata: KeyMetadata,
}

/// Manages per-purpose encryption keys under a master key.
pub struct KeyManager {
    dir: PathBuf,
    master: MasterKey,
    keys: DashMap<String, KeyEntry>,
}

impl KeyManager {
    /// Opens the key store, loading the master key (generating it on
    /// first run) and every stored encryption key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key store cannot be read or a stored key
    /// fails to decrypt under the master key.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, CryptoError> {
        let dir = dir.into();
        let master = MasterKey::load_or_generate(&dir).await?;

        let manager = Self {
            dir,
            master,
            keys: DashMap::new(),
        };
        manager.load_keys().await?;
        Ok(manager)
    }

    async fn load_keys(&self) -> Result<(), CryptoError> {
        let mut entries = fs::read_dir(&self.dir).await?;
        let mut loaded = 0usize;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(key_id) = name.strip_suffix(".key") else {
                continue;
            };
            if key_id == "master" {
                continue;
            }

            let sealed = fs::read(entry.path()).await?;
            let bytes = envelope::open(self.master.bytes(), &sealed, KEY_ENCRYPTION_AAD)?;
            let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CryptoError::Io {
                message: format!("stored key '{key_id}' has invalid length"),
            })?;

            let metadata = match fs::read(self.meta_path(key_id)).await {
                Ok(raw) => serde_json::from_slice(&raw)?,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                    // Sidecar lost: reconstruct minimal metadata so the
                    // key stays usable.
                    let metadata = KeyMetadata::new(key_id, "general");
                    self.write_metadata(key_id, &metadata).await?;
                    metadata
                }
                Err(err) => return Err(err.into()),
            };

            self.keys.insert(key_id.to_string(), KeyEntry { key, metadata });
            loaded += 1;
        }

        tracing::info!(count = loaded, "encryption keys loaded");
        Ok(())
    }

    fn key_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{key_id}.key"))
    }

    fn meta_path(&self, key_id: &str) -> PathBuf {
        self.dir.join(format!("{key_id}.meta"))
    }

    async fn write_metadata(&self, key_id: &str, metadata: &KeyMetadata) -> Result<(), CryptoError> {
        let path = self.meta_path(key_id);
        fs::write(&path, serde_json::to_vec_pretty(metadata)?).await?;
        restrict_permissions(&path, 0o600).await
    }

    async fn persist(
        &self,
        key_id: &str,
        key: &[u8; KEY_LEN],
        metadata: &KeyMetadata,
    ) -> Result<(), CryptoError> {
        let sealed = envelope::seal(self.master.bytes(), key, KEY_ENCRYPTION_AAD)?;
        let path = self.key_path(key_id);
        fs::write(&path, sealed).await?;
        restrict_permissions(&path, 0o600).await?;
        self.write_metadata(key_id, metadata).await
    }

    /// Generates a new key for `key_id`.
    ///
    /// # Errors
    ///
    /// Returns `KeyAlreadyExists` if the id already holds an active key,
    /// or an error if persistence fails.
    pub async fn generate(
        &self,
        key_id: &str,
        purpose: &str,
    ) -> Result<KeyMetadata, CryptoError> {
        if self.keys.contains_key(key_id) {
            return Err(CryptoError::key_already_exists(key_id));
        }

        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        let metadata = KeyMetadata::new(key_id, purpose);

        self.persist(key_id, &key, &metadata).await?;
        self.keys.insert(key_id.to_string(), KeyEntry {
            key,
            metadata: metadata.clone(),
        });

        tracing::info!(key_id, purpose, "new encryption key generated");
        Ok(metadata)
    }

    /// Ensures a key exists for `key_id`, generating one if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if generation fails.
    pub async fn ensure(&self, key_id: &str, purpose: &str) -> Result<(), CryptoError> {
        if self.keys.contains_key(key_id) {
            return Ok(());
        }
        match self.generate(key_id, purpose).await {
            Ok(_) => Ok(()),
            // Lost a race with a concurrent caller; the key exists now.
            Err(CryptoError::KeyAlreadyExists { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Returns the current (active) key and metadata for an id.
    #[must_use]
    pub fn current(&self, key_id: &str) -> Option<([u8; KEY_LEN], KeyMetadata)> {
        self.keys
            .get(key_id)
            .map(|entry| (entry.key, entry.metadata.clone()))
    }

    /// Resolves the key for a ciphertext sealed at `version`.
    ///
    /// If the id has rotated past that version, the archived
    /// `{key_id}_v{version}` entry is used.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if neither the current nor an archived key
    /// matches.
    pub fn resolve(
        &self,
        key_id: &str,
        version: u32,
    ) -> Result<[u8; KEY_LEN], CryptoError> {
        if let Some(entry) = self.keys.get(key_id) {
            if entry.metadata.version == version {
                return Ok(entry.key);
            }
        }

        let archived_id = archived_key_id(key_id, version);
        self.keys
            .get(&archived_id)
            .map(|entry| entry.key)
            .ok_or_else(|| CryptoError::key_not_found(archived_id))
    }

    /// Rotates the key for `key_id`.
    ///
    /// The outgoing version is archived under `{key_id}_v{version}` and
    /// retained; a fresh key becomes active under the original id with
    /// the version and rotation count advanced.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the id has no active key, or
    /// `KeyRotation` if persistence fails. A failed rotation leaves the
    /// previous key active.
    pub async fn rotate(&self, key_id: &str) -> Result<KeyMetadata, CryptoError> {
        let (old_key, old_metadata) = self
            .current(key_id)
            .ok_or_else(|| CryptoError::key_not_found(key_id))?;

        let now = OffsetDateTime::now_utc();
        let archived_id = archived_key_id(key_id, old_metadata.version);
        let archived_metadata = KeyMetadata {
            key_id: archived_id.clone(),
            status: KeyStatus::Archived,
            archived_at: Some(now),
            ..old_metadata.clone()
        };

        self.persist(&archived_id, &old_key, &archived_metadata)
            .await
            .map_err(|e| CryptoError::key_rotation(key_id, e.to_string()))?;

        let mut new_key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut new_key);
        let new_metadata = KeyMetadata {
            key_id: key_id.to_string(),
            purpose: old_metadata.purpose.clone(),
            algorithm: ALGORITHM.to_string(),
            version: old_metadata.version + 1,
            rotation_count: old_metadata.rotation_count + 1,
            status: KeyStatus::Active,
            created_at: now,
            rotated_at: Some(now),
            archived_at: None,
        };

        self.persist(key_id, &new_key, &new_metadata)
            .await
            .map_err(|e| CryptoError::key_rotation(key_id, e.to_string()))?;

        self.keys.insert(archived_id, KeyEntry {
            key: old_key,
            metadata: archived_metadata,
        });
        self.keys.insert(key_id.to_string(), KeyEntry {
            key: new_key,
            metadata: new_metadata.clone(),
        });

        tracing::info!(
            key_id,
            new_version = new_metadata.version,
            previous_version = old_metadata.version,
            "key rotated"
        );
        Ok(new_metadata)
    }

    /// Purges all key material for an id: the active key and every
    /// archived version. Data sealed under them becomes permanently
    /// unrecoverable.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the id has no active key, or an error if
    /// file removal fails.
    pub async fn delete(&self, key_id: &str) -> Result<(), CryptoError> {
        if self.keys.remove(key_id).is_none() {
            return Err(CryptoError::key_not_found(key_id));
        }

        let archive_prefix = format!("{key_id}_v");
        let archived: Vec<String> = self
            .keys
            .iter()
            .map(|entry| entry.key().clone())
            .filter(|id| id.starts_with(&archive_prefix))
            .collect();
        for id in &archived {
            self.keys.remove(id);
        }

        for id in std::iter::once(key_id.to_string()).chain(archived) {
            remove_if_exists(&self.key_path(&id)).await?;
            remove_if_exists(&self.meta_path(&id)).await?;
        }

        tracing::info!(key_id, "encryption key deleted");
        Ok(())
    }

    /// Ids of active keys older than `max_age`.
    #[must_use]
    pub fn keys_older_than(&self, max_age: Duration) -> Vec<String> {
        self.keys
            .iter()
            .filter(|entry| {
                entry.metadata.status == KeyStatus::Active && entry.metadata.age() >= max_age
            })
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Metadata for a key id, if present.
    #[must_use]
    pub fn metadata(&self, key_id: &str) -> Option<KeyMetadata> {
        self.keys.get(key_id).map(|entry| entry.metadata.clone())
    }

    /// Returns `true` if the id holds a key (active or archived).
    #[must_use]
    pub fn contains(&self, key_id: &str) -> bool {
        self.keys.contains_key(key_id)
    }

    /// Number of keys held (active and archived).
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns `true` if no keys are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Derived id an outgoing key version is archived under.
fn archived_key_id(key_id: &str, version: u32) -> String {
    format!("{key_id}_v{version}")
}

async fn remove_if_exists(path: &Path) -> Result<(), CryptoError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generate_and_reload_from_disk() {
        let dir = tempfile::tempdir().unwrap();

        let manager = KeyManager::open(dir.path()).await.unwrap();
        manager.generate("pii", "pii").await.unwrap();
        let (key, metadata) = manager.current("pii").unwrap();
        assert_eq!(metadata.version, 1);
        assert_eq!(metadata.status, KeyStatus::Active);

        // A fresh manager over the same directory sees the same key.
        let reloaded = KeyManager::open(dir.path()).await.unwrap();
        let (reloaded_key, reloaded_metadata) = reloaded.current("pii").unwrap();
        assert_eq!(key, reloaded_key);
        assert_eq!(reloaded_metadata.purpose, "pii");
    }

    #[tokio::test]
    async fn test_generate_rejects_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let manager = KeyManager::open(dir.path()).await.unwrap();

        manager.generate("pii", "pii").await.unwrap();
        assert!(matches!(
            manager.generate("pii", "pii").await,
            Err(CryptoError::KeyAlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_ensure_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let manager = KeyManager::open(dir.path()).await.unwrap();

        manager.ensure("default", "general").await.unwrap();
        let (first, _) = manager.current("default").unwrap();
        manager.ensure("default", "general").await.unwrap();
        let (second, _) = manager.current("default").unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_rotate_archives_previous_version() {
        let dir = tempfile::tempdir().unwrap();
        let manager = KeyManager::open(dir.path()).await.unwrap();

        manager.generate("pii", "pii").await.unwrap();
        let (old_key, _) = manager.current("pii").unwrap();

        let rotated = manager.rotate("pii").await.unwrap();
        assert_eq!(rotated.version, 2);
        assert_eq!(rotated.rotation_count, 1);

        let (new_key, _) = manager.current("pii").unwrap();
        assert_ne!(old_key, new_key);

        // Version 1 resolves to the archived key, version 2 to the new.
        assert_eq!(manager.resolve("pii", 1).unwrap(), old_key);
        assert_eq!(manager.resolve("pii", 2).unwrap(), new_key);

        let archived = manager.metadata("pii_v1").unwrap();
        assert_eq!(archived.status, KeyStatus::Archived);
        assert!(archived.archived_at.is_some());
    }

    #[tokio::test]
    async fn test_rotate_unknown_key_fails() {
        let dir = tempfile::tempdir().unwrap();
        let manager = KeyManager::open(dir.path()).await.unwrap();

        assert!(matches!(
            manager.rotate("missing").await,
            Err(CryptoError::KeyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_purges_archived_versions() {
        let dir = tempfile::tempdir().unwrap();
        let manager = KeyManager::open(dir.path()).await.unwrap();

        manager.generate("pii", "pii").await.unwrap();
        manager.rotate("pii").await.unwrap();
        assert!(manager.contains("pii_v1"));

        manager.delete("pii").await.unwrap();
        assert!(!manager.contains("pii"));
        assert!(!manager.contains("pii_v1"));
        assert!(matches!(
            manager.resolve("pii", 1),
            Err(CryptoError::KeyNotFound { .. })
        ));

        // Gone from disk as well.
        let reloaded = KeyManager::open(dir.path()).await.unwrap();
        assert!(!reloaded.contains("pii"));
    }

    #[tokio::test]
    async fn test_keys_older_than_only_reports_active() {
        let dir = tempfile::tempdir().unwrap();
        let manager = KeyManager::open(dir.path()).await.unwrap();

        manager.generate("pii", "pii").await.unwrap();
        manager.rotate("pii").await.unwrap();

        // Everything is freshly created, so nothing is stale.
        assert!(manager.keys_older_than(Duration::from_secs(60)).is_empty());

        // With a zero threshold both would qualify by age, but archived
        // versions must never be rotated again.
        let stale = manager.keys_older_than(Duration::ZERO);
        assert_eq!(stale, vec!["pii".to_string()]);
    }
}
