//! Session records.
//!
//! A session is created when a token pair is issued and lives in the
//! shared store with TTL equal to the refresh token lifetime. Its
//! lifecycle is CREATED → ACTIVE (touched on each verified use) →
//! DEACTIVATED, which is terminal: a deactivated session is never
//! reactivated, and every token bound to it fails verification.
//!
//! `last_used` tracks activity without extending expiry (a "sliding"
//! timestamp over a fixed deadline).

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use hubgate_core::ClientInfo;

/// A session bound to one issued token pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Session id shared by the access and refresh token of one pair.
    pub session_id: String,

    /// The user this session belongs to.
    pub user_id: String,

    /// Token id of the pair that created the session.
    pub token_id: String,

    /// IP the session was established from.
    pub ip: String,

    /// User agent at login, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Last verified use. Updated on every successful token
    /// verification; never extends `expires_at`.
    #[serde(with = "time::serde::rfc3339")]
    pub last_used: OffsetDateTime,

    /// Fixed expiry deadline (refresh token lifetime from creation).
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// `false` once the session is deactivated. Terminal.
    pub is_active: bool,
}

impl Session {
    /// Creates a new active session.
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        token_id: impl Into<String>,
        client: &ClientInfo,
        lifetime: std::time::Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            session_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            token_id: token_id.into(),
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
            created_at: now,
            last_used: now,
            expires_at: now + lifetime,
            is_active: true,
        }
    }

    /// Marks the session as used now. Does not extend expiry.
    pub fn touch(&mut self) {
        self.last_used = OffsetDateTime::now_utc();
    }

    /// Deactivates the session. Terminal.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }

    /// Returns `true` if the fixed deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }

    /// Remaining time until the fixed deadline.
    #[must_use]
    pub fn remaining(&self) -> std::time::Duration {
        let seconds = (self.expires_at - OffsetDateTime::now_utc()).whole_seconds();
        std::time::Duration::from_secs(seconds.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn session() -> Session {
        Session::new(
            "user-1",
            "token-1",
            &ClientInfo::from_ip("10.0.0.1").with_user_agent("test"),
            Duration::from_secs(604_800),
        )
    }

    #[test]
    fn test_new_session_is_active() {
        let session = session();
        assert!(session.is_active);
        assert!(!session.is_expired());
        assert_eq!(session.created_at, session.last_used);
    }

    #[test]
    fn test_touch_does_not_extend_expiry() {
        let mut session = session();
        let deadline = session.expires_at;

        session.touch();
        assert!(session.last_used >= session.created_at);
        assert_eq!(session.expires_at, deadline);
    }

    #[test]
    fn test_deactivate_is_terminal_flag() {
        let mut session = session();
        session.deactivate();
        assert!(!session.is_active);
    }

    #[test]
    fn test_serde_round_trip() {
        let session = session();
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains(r#""sessionId""#));
        assert!(json.contains(r#""isActive":true"#));

        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.session_id, session.session_id);
        assert_eq!(parsed.user_id, "user-1");
    }
}
