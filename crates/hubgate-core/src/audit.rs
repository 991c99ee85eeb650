//! Security event audit logging.
//!
//! Every security-relevant event (login success/failure, MFA challenges,
//! token lifecycle, revocations, blocked requests) is emitted as a
//! structured [`tracing`] event under the `audit` target with
//! actor/ip/timestamp fields. Subscribers can route that target to a
//! dedicated sink.
//!
//! Audit logging is fire-and-forget: it never blocks and never fails the
//! request path. If no subscriber is installed the events are dropped,
//! which is the correct behavior for tests.

use serde::Serialize;
use time::OffsetDateTime;

use crate::types::ClientInfo;

/// A security event to be audit-logged.
///
/// The event type is a stable snake_case name (e.g.
/// `authentication_failed`, `token_revoked`) so log pipelines can filter
/// on it. Details carry the event-specific context, such as the precise
/// failure reason that is deliberately *not* surfaced to the client.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Stable snake_case event name.
    pub event: &'static str,

    /// Acting user id, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    /// Client IP the event originated from, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,

    /// User agent, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Event-specific detail fields.
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub details: serde_json::Value,

    /// When the event occurred.
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl AuditEvent {
    /// Creates a new audit event with the current timestamp.
    #[must_use]
    pub fn new(event: &'static str) -> Self {
        Self {
            event,
            actor: None,
            ip: None,
            user_agent: None,
            details: serde_json::Value::Null,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Sets the acting user.
    #[must_use]
    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    /// Attaches client connection metadata.
    #[must_use]
    pub fn client(mut self, info: &ClientInfo) -> Self {
        self.ip = Some(info.ip.clone());
        self.user_agent = info.user_agent.clone();
        self
    }

    /// Sets the client IP directly.
    #[must_use]
    pub fn ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Attaches event-specific details.
    #[must_use]
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    /// Emits the event. Never blocks, never fails.
    pub fn emit(self) {
        audit_event(&self);
    }
}

/// Emits an audit event under the `audit` tracing target.
pub fn audit_event(event: &AuditEvent) {
    let details = if event.details.is_null() {
        String::new()
    } else {
        event.details.to_string()
    };

    tracing::info!(
        target: "audit",
        event = event.event,
        actor = event.actor.as_deref().unwrap_or("-"),
        ip = event.ip.as_deref().unwrap_or("-"),
        user_agent = event.user_agent.as_deref().unwrap_or("-"),
        timestamp = %event.timestamp,
        %details,
        "security event"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_builder() {
        let info = ClientInfo::from_ip("198.51.100.2").with_user_agent("test-agent");
        let event = AuditEvent::new("authentication_failed")
            .actor("user-1")
            .client(&info)
            .details(json!({ "reason": "invalid_password" }));

        assert_eq!(event.event, "authentication_failed");
        assert_eq!(event.actor.as_deref(), Some("user-1"));
        assert_eq!(event.ip.as_deref(), Some("198.51.100.2"));
        assert_eq!(event.user_agent.as_deref(), Some("test-agent"));
        assert_eq!(event.details["reason"], "invalid_password");
    }

    #[test]
    fn test_emit_without_subscriber_does_not_panic() {
        AuditEvent::new("token_revoked").actor("user-2").emit();
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let event = AuditEvent::new("mfa_required");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("mfa_required"));
        assert!(!json.contains("actor"));
        assert!(!json.contains("user_agent"));
        assert!(!json.contains("details"));
    }
}
