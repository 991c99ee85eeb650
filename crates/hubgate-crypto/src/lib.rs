//! # hubgate-crypto
//!
//! Data encryption service and key lifecycle management for the Hubgate
//! identity and data-protection core.
//!
//! This crate provides:
//! - A master key, generated once and persisted with owner-only access,
//!   under which all per-purpose keys are encrypted before storage
//! - A key manager with versioned rotation: rotating a key archives the
//!   previous version under a derived id and never deletes it while
//!   ciphertexts may still reference it
//! - AES-256-GCM field-level encryption with self-describing envelopes
//! - PII envelope encryption with per-field sentinels, GDPR-style
//!   pseudonymization, and true forgetting via key purging
//! - A background rotation task that retires aging keys independently of
//!   request traffic
//!
//! Decryption fails closed: an authentication-tag mismatch never yields
//! partial output.

pub mod envelope;
pub mod error;
pub mod keys;
pub mod master;
pub mod service;

pub use envelope::EncryptedEnvelope;
pub use error::CryptoError;
pub use keys::{KeyManager, KeyMetadata, KeyStatus};
pub use master::MasterKey;
pub use service::{CryptoConfig, DataEncryptionService, EncryptionStatsSnapshot};

/// Type alias for crypto results.
pub type CryptoResult<T> = Result<T, CryptoError>;
