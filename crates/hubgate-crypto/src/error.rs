//! Encryption error types.

/// Errors that can occur during encryption, decryption, or key
/// lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// No key material exists for the requested key id (or version).
    #[error("Encryption key not found: {key_id}")]
    KeyNotFound {
        /// The missing key id.
        key_id: String,
    },

    /// A key with this id already exists and is active.
    #[error("Encryption key already exists: {key_id}")]
    KeyAlreadyExists {
        /// The conflicting key id.
        key_id: String,
    },

    /// Encryption failed.
    #[error("Encryption failed: {message}")]
    EncryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// Decryption failed. This includes authentication-tag mismatches;
    /// no partial plaintext is ever returned.
    #[error("Decryption failed: {message}")]
    DecryptionFailed {
        /// Description of the failure.
        message: String,
    },

    /// The envelope is malformed (bad base64, truncated, unknown
    /// algorithm).
    #[error("Invalid envelope: {message}")]
    InvalidEnvelope {
        /// Description of the problem.
        message: String,
    },

    /// A key rotation failed. Rotation failures are logged and retried
    /// on the next timer tick; they never abort rotation of other keys.
    #[error("Key rotation failed for '{key_id}': {message}")]
    KeyRotation {
        /// The key that failed to rotate.
        key_id: String,
        /// Description of the failure.
        message: String,
    },

    /// Key store file I/O failed.
    #[error("Key store I/O error: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
    },

    /// Key metadata could not be serialized or deserialized.
    #[error("Metadata error: {message}")]
    Metadata {
        /// Description of the failure.
        message: String,
    },
}

impl CryptoError {
    /// Creates a new `KeyNotFound` error.
    #[must_use]
    pub fn key_not_found(key_id: impl Into<String>) -> Self {
        Self::KeyNotFound {
            key_id: key_id.into(),
        }
    }

    /// Creates a new `KeyAlreadyExists` error.
    #[must_use]
    pub fn key_already_exists(key_id: impl Into<String>) -> Self {
        Self::KeyAlreadyExists {
            key_id: key_id.into(),
        }
    }

    /// Creates a new `EncryptionFailed` error.
    #[must_use]
    pub fn encryption_failed(message: impl Into<String>) -> Self {
        Self::EncryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `DecryptionFailed` error.
    #[must_use]
    pub fn decryption_failed(message: impl Into<String>) -> Self {
        Self::DecryptionFailed {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidEnvelope` error.
    #[must_use]
    pub fn invalid_envelope(message: impl Into<String>) -> Self {
        Self::InvalidEnvelope {
            message: message.into(),
        }
    }

    /// Creates a new `KeyRotation` error.
    #[must_use]
    pub fn key_rotation(key_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::KeyRotation {
            key_id: key_id.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error means the ciphertext failed
    /// authentication or could not be recovered.
    #[must_use]
    pub fn is_decryption_error(&self) -> bool {
        matches!(
            self,
            Self::DecryptionFailed { .. } | Self::InvalidEnvelope { .. }
        )
    }

    /// Returns `true` if this is a key lifecycle error.
    #[must_use]
    pub fn is_key_error(&self) -> bool {
        matches!(
            self,
            Self::KeyNotFound { .. } | Self::KeyAlreadyExists { .. } | Self::KeyRotation { .. }
        )
    }
}

impl From<std::io::Error> for CryptoError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        Self::Metadata {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CryptoError::key_not_found("pii");
        assert_eq!(err.to_string(), "Encryption key not found: pii");

        let err = CryptoError::key_rotation("pii", "disk full");
        assert_eq!(err.to_string(), "Key rotation failed for 'pii': disk full");
    }

    #[test]
    fn test_error_predicates() {
        assert!(CryptoError::decryption_failed("tag mismatch").is_decryption_error());
        assert!(CryptoError::invalid_envelope("truncated").is_decryption_error());
        assert!(!CryptoError::key_not_found("x").is_decryption_error());

        assert!(CryptoError::key_not_found("x").is_key_error());
        assert!(CryptoError::key_rotation("x", "y").is_key_error());
        assert!(!CryptoError::encryption_failed("z").is_key_error());
    }
}
