//! Authentication and authorization error types.
//!
//! Client-facing failures are deliberately coarse: bad credentials and
//! bad MFA codes collapse into `AuthenticationFailed`, and every way a
//! token can be unusable (expired, bad signature, revoked, dead session)
//! collapses into `TokenInvalid`. The precise cause goes to the audit
//! log, never to the caller.

use std::fmt;
use std::time::Duration;

use hubgate_store::{RateLimitError, StorageError};

/// Errors that can occur during authentication and authorization
/// operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Credentials or MFA code rejected. Generic by design: the client
    /// cannot distinguish an unknown user from a wrong password.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Client-safe description.
        message: String,
    },

    /// The token is expired, revoked, malformed, badly signed, or bound
    /// to an inactive session. Collapsed into one client-facing error to
    /// avoid leaking internal state.
    #[error("Token is invalid")]
    TokenInvalid {
        /// Internal description (audit log only, not serialized).
        message: String,
    },

    /// Too many attempts; retry after the given duration.
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// How long the caller should wait.
        retry_after: Duration,
    },

    /// The request is malformed or contains disallowed input.
    #[error("Validation failed: {message}")]
    Validation {
        /// Description of the problem.
        message: String,
    },

    /// The client credentials are invalid or the client is not
    /// registered/active (OAuth2 `invalid_client`).
    #[error("Invalid client: {message}")]
    InvalidClient {
        /// Description of why the client is invalid.
        message: String,
    },

    /// The authorization grant or refresh token is invalid, expired,
    /// consumed, or bound to another client (OAuth2 `invalid_grant`).
    #[error("Invalid grant: {message}")]
    InvalidGrant {
        /// Description of why the grant is invalid.
        message: String,
    },

    /// The requested scope is invalid or malformed (OAuth2
    /// `invalid_scope`).
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of why the scope is invalid.
        message: String,
    },

    /// The resource owner denied the authorization request (OAuth2
    /// `access_denied`).
    #[error("Access denied: {message}")]
    AccessDenied {
        /// Description of the denial.
        message: String,
    },

    /// The grant type is not supported (OAuth2
    /// `unsupported_grant_type`).
    #[error("Unsupported grant type: {grant_type}")]
    UnsupportedGrantType {
        /// The unsupported grant type.
        grant_type: String,
    },

    /// The response type is not supported (OAuth2
    /// `unsupported_response_type`).
    #[error("Unsupported response type: {response_type}")]
    UnsupportedResponseType {
        /// The unsupported response type.
        response_type: String,
    },

    /// The shared store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },

    /// An unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `AuthenticationFailed` error.
    #[must_use]
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed {
            message: message.into(),
        }
    }

    /// Creates a new `TokenInvalid` error.
    #[must_use]
    pub fn token_invalid(message: impl Into<String>) -> Self {
        Self::TokenInvalid {
            message: message.into(),
        }
    }

    /// Creates a new `Validation` error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidClient` error.
    #[must_use]
    pub fn invalid_client(message: impl Into<String>) -> Self {
        Self::InvalidClient {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidGrant` error.
    #[must_use]
    pub fn invalid_grant(message: impl Into<String>) -> Self {
        Self::InvalidGrant {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `AccessDenied` error.
    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::AccessDenied {
            message: message.into(),
        }
    }

    /// Creates a new `UnsupportedGrantType` error.
    #[must_use]
    pub fn unsupported_grant_type(grant_type: impl Into<String>) -> Self {
        Self::UnsupportedGrantType {
            grant_type: grant_type.into(),
        }
    }

    /// Creates a new `UnsupportedResponseType` error.
    #[must_use]
    pub fn unsupported_response_type(response_type: impl Into<String>) -> Self {
        Self::UnsupportedResponseType {
            response_type: response_type.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Creates a new `Internal` error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns `true` if this is a client error (4xx category).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage { .. } | Self::Internal { .. })
    }

    /// Returns the error category for logging/monitoring purposes.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::AuthenticationFailed { .. } => ErrorCategory::Authentication,
            Self::TokenInvalid { .. } => ErrorCategory::Token,
            Self::RateLimited { .. } => ErrorCategory::RateLimit,
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::InvalidClient { .. }
            | Self::InvalidGrant { .. }
            | Self::InvalidScope { .. }
            | Self::AccessDenied { .. }
            | Self::UnsupportedGrantType { .. }
            | Self::UnsupportedResponseType { .. } => ErrorCategory::Grant,
            Self::Storage { .. } => ErrorCategory::Infrastructure,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the OAuth 2.0 wire error code for this error.
    ///
    /// Grant errors are a wire contract and must survive verbatim.
    #[must_use]
    pub fn oauth_error_code(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed { .. } => "access_denied",
            Self::TokenInvalid { .. } => "invalid_token",
            Self::RateLimited { .. } => "temporarily_unavailable",
            Self::Validation { .. } => "invalid_request",
            Self::InvalidClient { .. } => "invalid_client",
            Self::InvalidGrant { .. } => "invalid_grant",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::AccessDenied { .. } => "access_denied",
            Self::UnsupportedGrantType { .. } => "unsupported_grant_type",
            Self::UnsupportedResponseType { .. } => "unsupported_response_type",
            Self::Storage { .. } | Self::Internal { .. } => "server_error",
        }
    }

    /// Retry-after hint for `RateLimited` errors.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        Self::storage(err.to_string())
    }
}

impl From<RateLimitError> for AuthError {
    fn from(err: RateLimitError) -> Self {
        match err {
            RateLimitError::Exceeded { retry_after } => Self::RateLimited { retry_after },
            RateLimitError::Storage(err) => err.into(),
        }
    }
}

/// Categories of authentication/authorization errors for logging and
/// monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Identity verification failures.
    Authentication,
    /// Token validation failures.
    Token,
    /// Rate limiting rejections.
    RateLimit,
    /// Request validation failures.
    Validation,
    /// OAuth 2.0 grant failures.
    Grant,
    /// Storage/backend failures.
    Infrastructure,
    /// Internal server errors.
    Internal,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authentication => write!(f, "authentication"),
            Self::Token => write!(f, "token"),
            Self::RateLimit => write!(f, "rate_limit"),
            Self::Validation => write!(f, "validation"),
            Self::Grant => write!(f, "grant"),
            Self::Infrastructure => write!(f, "infrastructure"),
            Self::Internal => write!(f, "internal"),
        }
    }
}
