//! Lifecycle and audit event types.
//!
//! Sessions report lifecycle transitions to the manager over an unbounded
//! channel; the manager reacts (idempotent registry removal) and forwards a
//! sanitized audit record to the configured sink. Delivery of `Closed` is
//! at-least-once: both an explicit `close()` and the channel's own close
//! notification emit it.

use chrono::Utc;
use serde::Serialize;

/// Internal session-to-manager lifecycle notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub session_id: String,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEventKind {
    Closed,
    TimedOut,
    Error { message: String },
}

impl SessionEvent {
    pub fn closed(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            kind: SessionEventKind::Closed,
        }
    }

    pub fn timed_out(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            kind: SessionEventKind::TimedOut,
        }
    }

    pub fn error(session_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            kind: SessionEventKind::Error {
                message: message.into(),
            },
        }
    }
}

/// Externally visible audit record, emitted after sanitization.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    SessionCreated {
        session_id: String,
        host: String,
        username: String,
        port: u16,
        private_key_path: String,
        at: String,
    },
    SessionClosed {
        session_id: String,
        at: String,
    },
    SessionTimedOut {
        session_id: String,
        at: String,
    },
    SessionError {
        session_id: String,
        message: String,
        at: String,
    },
    CommandDispatched {
        session_id: Option<String>,
        host: String,
        username: String,
        command: Option<String>,
        at: String,
    },
    CommandCompleted {
        session_id: Option<String>,
        host: String,
        username: String,
        command: Option<String>,
        exit_code: Option<i32>,
        stdout: Option<String>,
        stderr: Option<String>,
        error: Option<String>,
        at: String,
    },
}

/// RFC3339 timestamp for event records.
pub fn event_timestamp() -> String {
    Utc::now().to_rfc3339()
}

impl From<SessionEvent> for AuditEvent {
    fn from(event: SessionEvent) -> Self {
        let at = event_timestamp();
        match event.kind {
            SessionEventKind::Closed => AuditEvent::SessionClosed {
                session_id: event.session_id,
                at,
            },
            SessionEventKind::TimedOut => AuditEvent::SessionTimedOut {
                session_id: event.session_id,
                at,
            },
            SessionEventKind::Error { message } => AuditEvent::SessionError {
                session_id: event.session_id,
                message,
                at,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod constructors {
        use super::*;

        #[test]
        fn test_closed_event_shape() {
            let ev = SessionEvent::closed("s1");
            assert_eq!(ev.session_id, "s1");
            assert_eq!(ev.kind, SessionEventKind::Closed);
        }

        #[test]
        fn test_error_event_carries_message() {
            let ev = SessionEvent::error("s1", "channel reset");
            assert_eq!(
                ev.kind,
                SessionEventKind::Error {
                    message: "channel reset".into()
                }
            );
        }
    }

    mod audit_conversion {
        use super::*;

        #[test]
        fn test_closed_converts() {
            let audit = AuditEvent::from(SessionEvent::closed("s1"));
            let json = serde_json::to_value(&audit).unwrap();
            assert_eq!(
                json.get("event").and_then(|v| v.as_str()),
                Some("session_closed")
            );
            assert_eq!(json.get("session_id").and_then(|v| v.as_str()), Some("s1"));
        }

        #[test]
        fn test_timed_out_converts() {
            let audit = AuditEvent::from(SessionEvent::timed_out("s2"));
            let json = serde_json::to_value(&audit).unwrap();
            assert_eq!(
                json.get("event").and_then(|v| v.as_str()),
                Some("session_timed_out")
            );
        }

        #[test]
        fn test_serialized_tag_casing() {
            let audit = AuditEvent::SessionCreated {
                session_id: "s1".into(),
                host: "db01".into(),
                username: "ops".into(),
                port: 22,
                private_key_path: "id_ed25519".into(),
                at: event_timestamp(),
            };
            let json = serde_json::to_value(&audit).unwrap();
            assert_eq!(
                json.get("event").and_then(|v| v.as_str()),
                Some("session_created")
            );
        }
    }
}
