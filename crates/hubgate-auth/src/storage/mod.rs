//! Storage capabilities for the authentication service.
//!
//! - [`UserRepository`] - injected, read-only access to the external
//!   user store
//! - [`SessionStore`] - TTL-bound session records over the shared
//!   key-value store
//! - [`RevocationStore`] - the token blacklist, with a named keying
//!   strategy so both revocation designs (token-id keyed and
//!   raw-token keyed) coexist without merging semantics

pub mod revocation;
pub mod session;
pub mod user;

pub use revocation::{RevocationKeying, RevocationStore};
pub use session::SessionStore;
pub use user::{InMemoryUserRepository, UserRepository};
