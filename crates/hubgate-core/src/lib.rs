//! # hubgate-core
//!
//! Shared leaf crate for the Hubgate identity and data-protection core.
//!
//! This crate provides:
//! - Request metadata types ([`ClientInfo`], [`RequestIdentity`]) shared
//!   between the authentication service and the security middleware
//! - Security event audit logging ([`audit`])
//!
//! It deliberately has no dependency on any other Hubgate crate so that
//! the auth service and the middleware pipeline can cooperate through
//! these types without depending on each other.

pub mod audit;
pub mod types;

pub use audit::{AuditEvent, audit_event};
pub use types::{ClientInfo, RequestIdentity};
