//! AES-256-GCM sealing and the encrypted envelope format.
//!
//! The wire format is `base64(iv ‖ tag ‖ ciphertext)` with a 12-byte IV
//! and a 16-byte GCM tag, wrapped in an envelope that names the key id,
//! key version, and algorithm so ciphertexts stay decryptable across key
//! rotations.

use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::CryptoError;

/// AES-256 key size in bytes.
pub const KEY_LEN: usize = 32;
/// GCM nonce (IV) size in bytes.
pub const IV_LEN: usize = 12;
/// GCM authentication tag size in bytes.
pub const TAG_LEN: usize = 16;
/// The only supported algorithm identifier.
pub const ALGORITHM: &str = "aes-256-gcm";

/// A self-describing encrypted payload.
///
/// Carries everything needed to decrypt later: the key id, the key
/// version the data was sealed under (so rotated keys resolve to their
/// archived version), and the algorithm.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Base64 of `iv ‖ tag ‖ ciphertext`.
    pub data: String,

    /// Key id the payload was sealed under.
    pub key_id: String,

    /// Key version at seal time.
    pub key_version: u32,

    /// Algorithm identifier (always `aes-256-gcm`).
    pub algorithm: String,

    /// When the payload was sealed.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl EncryptedEnvelope {
    /// Decodes the payload into `(iv ‖ tag ‖ ciphertext)` bytes.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEnvelope` if the algorithm is unknown, the base64
    /// is malformed, or the blob is too short to contain IV and tag.
    pub fn decode(&self) -> Result<Vec<u8>, CryptoError> {
        if self.algorithm != ALGORITHM {
            return Err(CryptoError::invalid_envelope(format!(
                "unsupported algorithm '{}'",
                self.algorithm
            )));
        }

        let blob = BASE64
            .decode(&self.data)
            .map_err(|e| CryptoError::invalid_envelope(format!("bad base64: {e}")))?;

        if blob.len() < IV_LEN + TAG_LEN {
            return Err(CryptoError::invalid_envelope("payload too short"));
        }

        Ok(blob)
    }
}

/// Seals plaintext under a 256-bit key.
///
/// Returns `iv ‖ tag ‖ ciphertext`. A fresh random IV is drawn for every
/// call.
///
/// # Errors
///
/// Returns `EncryptionFailed` if the cipher rejects the input.
pub fn seal(key: &[u8; KEY_LEN], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::encryption_failed(format!("key init: {e}")))?;

    let mut iv = [0u8; IV_LEN];
    rand::thread_rng().fill_bytes(&mut iv);
    let nonce = Nonce::from_slice(&iv);

    // aes-gcm appends the tag to the ciphertext; re-split so the stored
    // layout is iv || tag || ciphertext.
    let sealed = cipher
        .encrypt(nonce, Payload {
            msg: plaintext,
            aad,
        })
        .map_err(|e| CryptoError::encryption_failed(e.to_string()))?;

    let tag_offset = sealed.len() - TAG_LEN;
    let mut blob = Vec::with_capacity(IV_LEN + sealed.len());
    blob.extend_from_slice(&iv);
    blob.extend_from_slice(&sealed[tag_offset..]);
    blob.extend_from_slice(&sealed[..tag_offset]);

    Ok(blob)
}

/// Opens an `iv ‖ tag ‖ ciphertext` blob sealed with [`seal`].
///
/// # Errors
///
/// Returns `InvalidEnvelope` if the blob is truncated, or
/// `DecryptionFailed` on authentication-tag mismatch. No partial
/// plaintext is ever returned.
pub fn open(key: &[u8; KEY_LEN], blob: &[u8], aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if blob.len() < IV_LEN + TAG_LEN {
        return Err(CryptoError::invalid_envelope("payload too short"));
    }

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|e| CryptoError::decryption_failed(format!("key init: {e}")))?;

    let iv = &blob[..IV_LEN];
    let tag = &blob[IV_LEN..IV_LEN + TAG_LEN];
    let ciphertext = &blob[IV_LEN + TAG_LEN..];

    let mut sealed = Vec::with_capacity(ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(ciphertext);
    sealed.extend_from_slice(tag);

    cipher
        .decrypt(Nonce::from_slice(iv), Payload {
            msg: &sealed,
            aad,
        })
        .map_err(|_| CryptoError::decryption_failed("authentication tag mismatch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> [u8; KEY_LEN] {
        let mut key = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    #[test]
    fn test_seal_open_round_trip() {
        let key = test_key();
        let plaintext = b"sensitive campaign data";

        let blob = seal(&key, plaintext, b"").unwrap();
        assert_eq!(blob.len(), IV_LEN + TAG_LEN + plaintext.len());

        let opened = open(&key, &blob, b"").unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn test_empty_plaintext_round_trip() {
        let key = test_key();
        let blob = seal(&key, b"", b"").unwrap();
        assert_eq!(open(&key, &blob, b"").unwrap(), b"");
    }

    #[test]
    fn test_unique_ivs() {
        let key = test_key();
        let a = seal(&key, b"same input", b"").unwrap();
        let b = seal(&key, b"same input", b"").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_tampered_ciphertext_fails_closed() {
        let key = test_key();
        let mut blob = seal(&key, b"payload", b"").unwrap();
        let last = blob.len() - 1;
        blob[last] ^= 0x01;

        let err = open(&key, &blob, b"").unwrap_err();
        assert!(err.is_decryption_error());
    }

    #[test]
    fn test_wrong_key_fails() {
        let blob = seal(&test_key(), b"payload", b"").unwrap();
        assert!(open(&test_key(), &blob, b"").is_err());
    }

    #[test]
    fn test_aad_mismatch_fails() {
        let key = test_key();
        let blob = seal(&key, b"payload", b"record-7").unwrap();

        assert!(open(&key, &blob, b"record-7").is_ok());
        assert!(open(&key, &blob, b"record-8").is_err());
        assert!(open(&key, &blob, b"").is_err());
    }

    #[test]
    fn test_truncated_blob_rejected() {
        let key = test_key();
        let err = open(&key, &[0u8; IV_LEN + TAG_LEN - 1], b"").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidEnvelope { .. }));
    }

    #[test]
    fn test_envelope_serde_round_trip() {
        let envelope = EncryptedEnvelope {
            data: BASE64.encode([0u8; IV_LEN + TAG_LEN + 4]),
            key_id: "pii".to_string(),
            key_version: 2,
            algorithm: ALGORITHM.to_string(),
            timestamp: OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""keyId":"pii""#));
        assert!(json.contains(r#""keyVersion":2"#));

        let parsed: EncryptedEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.key_id, "pii");
        assert!(parsed.decode().is_ok());
    }

    #[test]
    fn test_envelope_rejects_unknown_algorithm() {
        let envelope = EncryptedEnvelope {
            data: BASE64.encode([0u8; 64]),
            key_id: "pii".to_string(),
            key_version: 1,
            algorithm: "aes-128-cbc".to_string(),
            timestamp: OffsetDateTime::now_utc(),
        };

        assert!(matches!(
            envelope.decode(),
            Err(CryptoError::InvalidEnvelope { .. })
        ));
    }
}
