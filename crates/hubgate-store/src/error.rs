//! Storage error types.

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The storage backend failed or is unreachable.
    #[error("Backend error: {message}")]
    Backend {
        /// Description of the backend failure.
        message: String,
    },

    /// A stored value could not be serialized or deserialized.
    #[error("Serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// The stored value has an unexpected shape (e.g. a counter key
    /// holding non-counter bytes).
    #[error("Corrupt value for key '{key}'")]
    CorruptValue {
        /// The key whose value is corrupt.
        key: String,
    },
}

impl StorageError {
    /// Creates a new `Backend` error.
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Creates a new `Serialization` error.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Creates a new `CorruptValue` error.
    #[must_use]
    pub fn corrupt_value(key: impl Into<String>) -> Self {
        Self::CorruptValue { key: key.into() }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::backend("connection refused");
        assert_eq!(err.to_string(), "Backend error: connection refused");

        let err = StorageError::corrupt_value("ratelimit:count:ip:1.2.3.4");
        assert_eq!(
            err.to_string(),
            "Corrupt value for key 'ratelimit:count:ip:1.2.3.4'"
        );
    }
}
