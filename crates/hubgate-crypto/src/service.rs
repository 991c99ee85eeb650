//! The data encryption service.
//!
//! Field-level AES-256-GCM encryption over the managed key store:
//! self-describing envelopes, PII per-field encryption with sentinels,
//! GDPR-style anonymization, and a background task that rotates aging
//! keys independently of request traffic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use tokio::time::MissedTickBehavior;

use crate::envelope::{self, ALGORITHM, EncryptedEnvelope};
use crate::error::CryptoError;
use crate::keys::{KeyManager, KeyMetadata};

/// Default key id for PII field encryption.
pub const PII_KEY_ID: &str = "pii";

/// Truncated hash length (hex chars) for anonymized values.
const ANONYMIZED_LEN: usize = 16;

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the data encryption service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Directory holding the master key and per-purpose key files.
    pub key_store_path: std::path::PathBuf,

    /// Keys older than this are rotated by the background task.
    #[serde(with = "humantime_serde")]
    pub rotation_interval: Duration,

    /// How often the background task looks for stale keys.
    #[serde(with = "humantime_serde")]
    pub rotation_check_interval: Duration,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            key_store_path: "security/keys".into(),
            rotation_interval: Duration::from_secs(30 * 24 * 60 * 60),
            rotation_check_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct EncryptionStats {
    operations: AtomicU64,
    bytes_encrypted: AtomicU64,
    bytes_decrypted: AtomicU64,
    key_rotations: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time view of the service counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionStatsSnapshot {
    /// Total encrypt/decrypt operations performed.
    pub operations: u64,
    /// Plaintext bytes encrypted.
    pub bytes_encrypted: u64,
    /// Plaintext bytes recovered.
    pub bytes_decrypted: u64,
    /// Key rotations performed (manual and automatic).
    pub key_rotations: u64,
    /// Failed operations.
    pub errors: u64,
    /// Keys currently held (active and archived).
    pub active_keys: usize,
    /// When the snapshot was taken.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

// =============================================================================
// Service
// =============================================================================

/// Field-level encryption service over the managed key store.
pub struct DataEncryptionService {
    keys: KeyManager,
    config: CryptoConfig,
    stats: EncryptionStats,
}

impl DataEncryptionService {
    /// Opens the key store and builds the service.
    ///
    /// The master key is generated on first run.
    ///
    /// # Errors
    ///
    /// Returns an error if the key store cannot be opened.
    pub async fn new(config: CryptoConfig) -> Result<Self, CryptoError> {
        let keys = KeyManager::open(&config.key_store_path).await?;
        Ok(Self {
            keys,
            config,
            stats: EncryptionStats::default(),
        })
    }

    /// Generates a key for `key_id` with an explicit purpose.
    ///
    /// # Errors
    ///
    /// Returns `KeyAlreadyExists` if the id is taken.
    pub async fn generate_key(
        &self,
        key_id: &str,
        purpose: &str,
    ) -> Result<KeyMetadata, CryptoError> {
        self.keys.generate(key_id, purpose).await
    }

    /// Encrypts `data` under `key_id`, provisioning a key for unseen ids.
    ///
    /// # Errors
    ///
    /// Returns an error if key provisioning or encryption fails.
    pub async fn encrypt(
        &self,
        data: &[u8],
        key_id: &str,
        aad: Option<&[u8]>,
    ) -> Result<EncryptedEnvelope, CryptoError> {
        self.keys.ensure(key_id, "general").await?;
        let (key, metadata) = self
            .keys
            .current(key_id)
            .ok_or_else(|| CryptoError::key_not_found(key_id))?;

        let blob = envelope::seal(&key, data, aad.unwrap_or_default()).inspect_err(|_| {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
        })?;

        self.stats.operations.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_encrypted
            .fetch_add(data.len() as u64, Ordering::Relaxed);

        use base64::Engine;
        Ok(EncryptedEnvelope {
            data: base64::engine::general_purpose::STANDARD.encode(blob),
            key_id: key_id.to_string(),
            key_version: metadata.version,
            algorithm: ALGORITHM.to_string(),
            timestamp: OffsetDateTime::now_utc(),
        })
    }

    /// Decrypts an envelope. Fails closed: an authentication-tag
    /// mismatch yields an error and no output.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the sealing key (or its archived
    /// version) is gone, or `DecryptionFailed` on tag mismatch.
    pub async fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        let result = self.decrypt_inner(envelope, aad);
        if result.is_err() {
            self.stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        result
    }

    fn decrypt_inner(
        &self,
        sealed: &EncryptedEnvelope,
        aad: Option<&[u8]>,
    ) -> Result<Vec<u8>, CryptoError> {
        let blob = sealed.decode()?;
        let key = self.keys.resolve(&sealed.key_id, sealed.key_version)?;
        let plaintext = envelope::open(&key, &blob, aad.unwrap_or_default())?;

        self.stats.operations.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_decrypted
            .fetch_add(plaintext.len() as u64, Ordering::Relaxed);
        Ok(plaintext)
    }

    /// Encrypts the named fields of a JSON object in place, marking each
    /// with a `{field}_encrypted` sentinel so partially encrypted records
    /// are self-describing. Fields already carrying the sentinel are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a JSON object or encryption
    /// fails.
    pub async fn encrypt_pii(
        &self,
        data: &Value,
        fields: &[&str],
        key_id: &str,
    ) -> Result<Value, CryptoError> {
        let map = data.as_object().ok_or_else(|| {
            CryptoError::encryption_failed("PII encryption expects a JSON object")
        })?;
        let mut result = map.clone();

        for &field in fields {
            let sentinel = format!("{field}_encrypted");
            if result
                .get(&sentinel)
                .and_then(Value::as_bool)
                .unwrap_or(false)
            {
                continue;
            }

            let Some(value) = map.get(field) else { continue };
            if value.is_null() {
                continue;
            }

            let plaintext = serde_json::to_vec(value)?;
            let sealed = self.encrypt(&plaintext, key_id, None).await?;
            result.insert(field.to_string(), serde_json::to_value(&sealed)?);
            result.insert(sentinel, Value::Bool(true));
        }

        Ok(Value::Object(result))
    }

    /// Decrypts the named fields of a JSON object. Fields without the
    /// `{field}_encrypted` sentinel are skipped, which makes decryption
    /// idempotent-safe over plain or partially encrypted records. The
    /// sentinel is removed on success.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is not a JSON object or decryption
    /// fails for a flagged field.
    pub async fn decrypt_pii(
        &self,
        data: &Value,
        fields: &[&str],
    ) -> Result<Value, CryptoError> {
        let map = data.as_object().ok_or_else(|| {
            CryptoError::decryption_failed("PII decryption expects a JSON object")
        })?;
        let mut result = map.clone();

        for &field in fields {
            let sentinel = format!("{field}_encrypted");
            let flagged = map
                .get(&sentinel)
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !flagged {
                continue;
            }

            let Some(value) = map.get(field) else { continue };
            let sealed: EncryptedEnvelope = serde_json::from_value(value.clone())
                .map_err(|e| CryptoError::invalid_envelope(e.to_string()))?;
            let plaintext = self.decrypt(&sealed, None).await?;
            let restored: Value = serde_json::from_slice(&plaintext)
                .map_err(|e| CryptoError::decryption_failed(e.to_string()))?;

            result.insert(field.to_string(), restored);
            result.remove(&sentinel);
        }

        Ok(Value::Object(result))
    }

    /// One-way pseudonymization: each named field is replaced by a
    /// deterministic truncated SHA-256 digest, preserving join-ability
    /// while severing the link to the original value.
    #[must_use]
    pub fn anonymize(&self, data: &Value, fields: &[&str]) -> Value {
        let Some(map) = data.as_object() else {
            return data.clone();
        };
        let mut result = map.clone();

        for &field in fields {
            let Some(value) = map.get(field) else { continue };
            if value.is_null() {
                continue;
            }

            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let digest = Sha256::digest(text.as_bytes());
            let hash = hex::encode(digest);

            result.insert(
                field.to_string(),
                Value::String(hash[..ANONYMIZED_LEN].to_string()),
            );
            result.insert(format!("{field}_anonymized"), Value::Bool(true));
        }

        Value::Object(result)
    }

    /// Rotates the key for `key_id`: the outgoing version is archived
    /// and stays available to old ciphertexts, new encryptions use the
    /// fresh key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown or persistence fails.
    pub async fn rotate_key(&self, key_id: &str) -> Result<KeyMetadata, CryptoError> {
        let metadata = self.keys.rotate(key_id).await?;
        self.stats.key_rotations.fetch_add(1, Ordering::Relaxed);
        Ok(metadata)
    }

    /// Purges all key material for `key_id` (active and archived
    /// versions). Data encrypted under it becomes permanently
    /// unrecoverable.
    ///
    /// # Errors
    ///
    /// Returns `KeyNotFound` if the id has no active key.
    pub async fn delete_encrypted_data(&self, key_id: &str) -> Result<(), CryptoError> {
        self.keys.delete(key_id).await
    }

    /// Rotates every active key older than the configured interval.
    /// A per-key failure is logged and retried on the next tick; it does
    /// not stop rotation of the remaining keys.
    ///
    /// Returns the number of keys rotated.
    pub async fn rotate_stale_keys(&self) -> usize {
        let stale = self.keys.keys_older_than(self.config.rotation_interval);
        let mut rotated = 0;

        for key_id in stale {
            match self.rotate_key(&key_id).await {
                Ok(metadata) => {
                    tracing::info!(
                        key_id = %key_id,
                        version = metadata.version,
                        "automatic key rotation"
                    );
                    rotated += 1;
                }
                Err(err) => {
                    tracing::error!(
                        key_id = %key_id,
                        error = %err,
                        "automatic key rotation failed"
                    );
                }
            }
        }

        rotated
    }

    /// Spawns the background rotation task.
    ///
    /// The task wakes every `rotation_check_interval` and rotates stale
    /// keys. It holds no lock that blocks concurrent encrypt/decrypt.
    /// Abort the returned handle on shutdown.
    pub fn spawn_rotation_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.config.rotation_check_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so a restart
            // doesn't rotate fresh keys.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let rotated = service.rotate_stale_keys().await;
                if rotated > 0 {
                    tracing::info!(rotated, "rotation sweep complete");
                }
            }
        })
    }

    /// Snapshot of the service counters.
    #[must_use]
    pub fn stats(&self) -> EncryptionStatsSnapshot {
        EncryptionStatsSnapshot {
            operations: self.stats.operations.load(Ordering::Relaxed),
            bytes_encrypted: self.stats.bytes_encrypted.load(Ordering::Relaxed),
            bytes_decrypted: self.stats.bytes_decrypted.load(Ordering::Relaxed),
            key_rotations: self.stats.key_rotations.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
            active_keys: self.keys.len(),
            timestamp: OffsetDateTime::now_utc(),
        }
    }
}
