//! OAuth 2.0 authorization server.
//!
//! Implements the authorization-code flow with PKCE (S256 only), the
//! client-credentials and refresh-token grants, token introspection,
//! and revocation. Parameter names follow the OAuth2 wire vocabulary
//! exactly.

pub mod client;
pub mod pkce;
pub mod provider;
pub mod records;
pub mod scopes;
pub mod token;

pub use client::{ClientRegistration, GrantType, OAuth2Client, RegisteredClient};
pub use provider::{ConsentOutcome, OAuth2Provider};
pub use token::{
    AuthorizeRequest, ConsentPayload, IntrospectionResponse, TokenError, TokenErrorCode,
    TokenRequest, TokenResponse, TokenTypeHint,
};
