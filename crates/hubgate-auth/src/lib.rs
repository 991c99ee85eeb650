//! # hubgate-auth
//!
//! Authentication and authorization core for Hubgate.
//!
//! This crate provides:
//! - A JWT authentication service: login with optional TOTP MFA,
//!   access/refresh token pairs, verification, refresh, and revocation
//!   with cascading session invalidation
//! - An OAuth 2.0 authorization server: client registration,
//!   authorization-code flow with PKCE (S256 only), client-credentials
//!   and refresh-token grants, introspection, and revocation
//! - Axum HTTP handlers for the wire surface and a Bearer
//!   authentication middleware for downstream collaborators
//!
//! All cross-process state (sessions, blacklists, OAuth2 records,
//! rate-limiter counters) lives behind the `hubgate-store` key-value
//! abstraction, keeping the services stateless and horizontally
//! scalable.
//!
//! ## Modules
//!
//! - [`config`] - Service configuration
//! - [`error`] - The `AuthError` taxonomy
//! - [`types`] - Users, sessions, and token claims
//! - [`storage`] - User repository and typed stores over the shared KV store
//! - [`token`] - HS512 JWT signing and verification
//! - [`mfa`] - TOTP enrollment and verification
//! - [`service`] - The JWT authentication service
//! - [`oauth`] - The OAuth 2.0 provider
//! - [`http`] - Axum handlers
//! - [`middleware`] - Bearer authentication middleware

pub mod config;
pub mod error;
pub mod http;
pub mod mfa;
pub mod middleware;
pub mod oauth;
pub mod service;
pub mod storage;
pub mod token;
pub mod types;

pub use config::{AuthConfig, OAuth2Config};
pub use error::{AuthError, ErrorCategory};
pub use mfa::MfaEnrollment;
pub use middleware::{AuthContext, require_auth};
pub use oauth::provider::OAuth2Provider;
pub use service::{AuthOutcome, JwtAuthService, TokenPair};
pub use storage::{
    InMemoryUserRepository, RevocationKeying, RevocationStore, SessionStore, UserRepository,
};
pub use types::claims::{TokenClaims, TokenType};
pub use types::session::Session;
pub use types::user::{Role, SafeUser, User};

/// Type alias for authentication/authorization results.
pub type AuthResult<T> = Result<T, AuthError>;
