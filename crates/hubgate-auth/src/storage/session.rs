//! Session store over the shared key-value store.
//!
//! Sessions are TTL-bound: the record's store TTL always matches the
//! session's fixed deadline, so touching a session (updating
//! `last_used`) rewrites it with the *remaining* lifetime and never
//! extends expiry.

use std::sync::Arc;
use std::time::Duration;

use hubgate_store::{KeyValueStore, KeyValueStoreExt};

use crate::AuthResult;
use crate::types::session::Session;

/// Typed session operations over the shared store.
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
    lifetime: Duration,
}

impl SessionStore {
    /// Creates a session store.
    ///
    /// `lifetime` is the fixed session lifetime (the refresh token TTL).
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>, lifetime: Duration) -> Self {
        Self { store, lifetime }
    }

    fn key(session_id: &str) -> String {
        format!("session:{session_id}")
    }

    /// The configured session lifetime.
    #[must_use]
    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Persists a new session with the full lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn create(&self, session: &Session) -> AuthResult<()> {
        self.store
            .put_json(&Self::key(&session.session_id), session, Some(self.lifetime))
            .await?;
        Ok(())
    }

    /// Reads a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn get(&self, session_id: &str) -> AuthResult<Option<Session>> {
        Ok(self.store.get_json(&Self::key(session_id)).await?)
    }

    /// Updates `last_used` without extending the fixed deadline.
    ///
    /// Missing sessions are ignored (the caller has already decided the
    /// token is valid or not).
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn touch(&self, session_id: &str) -> AuthResult<()> {
        if let Some(mut session) = self.get(session_id).await? {
            session.touch();
            self.rewrite(&session).await?;
        }
        Ok(())
    }

    /// Deactivates a session. Terminal: the record is rewritten with
    /// `is_active = false` and its remaining TTL, never reactivated.
    ///
    /// Returns `true` if a session was found and deactivated.
    ///
    /// # Errors
    ///
    /// Returns an error if the store fails.
    pub async fn deactivate(&self, session_id: &str) -> AuthResult<bool> {
        match self.get(session_id).await? {
            Some(mut session) => {
                session.deactivate();
                self.rewrite(&session).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Rewrites a session with its remaining lifetime.
    async fn rewrite(&self, session: &Session) -> AuthResult<()> {
        self.store
            .put_json(
                &Self::key(&session.session_id),
                session,
                Some(session.remaining()),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hubgate_core::ClientInfo;
    use hubgate_store::MemoryStore;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(604_800))
    }

    fn session(store: &SessionStore) -> Session {
        Session::new(
            "user-1",
            "token-1",
            &ClientInfo::from_ip("10.0.0.1"),
            store.lifetime(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let sessions = store();
        let session = session(&sessions);
        sessions.create(&session).await.unwrap();

        let read = sessions.get(&session.session_id).await.unwrap().unwrap();
        assert_eq!(read.user_id, "user-1");
        assert!(read.is_active);
    }

    #[tokio::test]
    async fn test_touch_updates_last_used_only() {
        let sessions = store();
        let session = session(&sessions);
        sessions.create(&session).await.unwrap();

        sessions.touch(&session.session_id).await.unwrap();
        let read = sessions.get(&session.session_id).await.unwrap().unwrap();
        assert!(read.last_used >= session.last_used);
        assert_eq!(read.expires_at, session.expires_at);
    }

    #[tokio::test]
    async fn test_deactivate_is_persisted() {
        let sessions = store();
        let session = session(&sessions);
        sessions.create(&session).await.unwrap();

        assert!(sessions.deactivate(&session.session_id).await.unwrap());
        let read = sessions.get(&session.session_id).await.unwrap().unwrap();
        assert!(!read.is_active);

        // Deactivating an unknown session reports false.
        assert!(!sessions.deactivate("missing").await.unwrap());
    }
}
