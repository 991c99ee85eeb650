//! Token revocation store.
//!
//! The system carries two revocation designs on purpose: the
//! authentication service blacklists by the token pair's `tokenId`
//! claim (revoking a pair kills both tokens at once), while the OAuth2
//! provider blacklists access tokens by the raw token string. Rather
//! than silently merging the two, both live behind this store under a
//! named [`RevocationKeying`] strategy.
//!
//! Entries are TTL-bound to the revoked token's remaining lifetime, so
//! the blacklist never outgrows the set of tokens that could still
//! verify. A blacklisted token must fail verification regardless of its
//! signature or expiry validity.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};

use hubgate_store::KeyValueStore;

use crate::AuthResult;

/// How revocation entries are keyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevocationKeying {
    /// Keyed by the `tokenId` claim shared by a token pair.
    TokenId,
    /// Keyed by the raw token string (hashed before storage).
    RawToken,
}

impl RevocationKeying {
    /// Key namespace for this strategy.
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::TokenId => "jti",
            Self::RawToken => "token",
        }
    }
}

/// Blacklist of revoked tokens over the shared store.
#[derive(Clone)]
pub struct RevocationStore {
    store: Arc<dyn KeyValueStore>,
    keying: RevocationKeying,
}

impl RevocationStore {
    /// Creates a revocation store with the given keying strategy.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, keying: RevocationKeying) -> Self {
        Self { store, keying }
    }

    /// The keying strategy in use.
    #[must_use]
    pub fn keying(&self) -> RevocationKeying {
        self.keying
    }

    fn key(&self, value: &str) -> String {
        let id = match self.keying {
            RevocationKeying::TokenId => value.to_string(),
            // Raw tokens are long and sensitive; store a digest instead.
            RevocationKeying::RawToken => hex::encode(Sha256::digest(value.as_bytes())),
        };
        format!("blacklist:{}:{}", self.keying.namespace(), id)
    }

    /// Marks a token revoked for `ttl` (its remaining lifetime).
    ///
    /// A zero TTL is a no-op: the token is already expired and can never
    /// verify again.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn revoke(&self, value: &str, ttl: Duration) -> AuthResult<()> {
        if ttl.is_zero() {
            return Ok(());
        }
        self.store
            .put(&self.key(value), b"revoked".to_vec(), Some(ttl))
            .await?;
        Ok(())
    }

    /// Returns `true` if the token is on the blacklist.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn is_revoked(&self, value: &str) -> AuthResult<bool> {
        Ok(self.store.exists(&self.key(value)).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubgate_store::MemoryStore;

    #[tokio::test]
    async fn test_revoke_and_check_by_token_id() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let revocations = RevocationStore::new(store, RevocationKeying::TokenId);

        assert!(!revocations.is_revoked("tid-1").await.unwrap());
        revocations
            .revoke("tid-1", Duration::from_secs(900))
            .await
            .unwrap();
        assert!(revocations.is_revoked("tid-1").await.unwrap());
        assert!(!revocations.is_revoked("tid-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_keying_strategies_are_isolated() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let by_id = RevocationStore::new(store.clone(), RevocationKeying::TokenId);
        let by_token = RevocationStore::new(store, RevocationKeying::RawToken);

        by_id.revoke("value", Duration::from_secs(60)).await.unwrap();
        assert!(by_id.is_revoked("value").await.unwrap());
        // The same value under the other strategy is a different entry.
        assert!(!by_token.is_revoked("value").await.unwrap());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_noop() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let revocations = RevocationStore::new(store, RevocationKeying::TokenId);

        revocations.revoke("tid-1", Duration::ZERO).await.unwrap();
        assert!(!revocations.is_revoked("tid-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_expired_entries_fall_off() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let revocations = RevocationStore::new(store, RevocationKeying::RawToken);

        revocations
            .revoke("raw.jwt.token", Duration::from_nanos(1))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!revocations.is_revoked("raw.jwt.token").await.unwrap());
    }
}
