//! Structured error taxonomy for the session engine.
//!
//! Every failure surfaced by the pool, the sessions, or the manager is one
//! of these kinds. Transport-level variants carry the underlying cause as
//! text; local variants name the offending argument or identifier.
//!
//! # Fatality
//!
//! - `CommandTimeout` is fatal to a single command; the session keeps
//!   running and the next queued command is dispatched.
//! - `ConnectionTimeout`, `ConnectionFailed`, `ShellFailure` and
//!   `StreamError` are fatal to the affected session or connection attempt.
//! - Everything else fails only the call that triggered it.

use std::time::Duration;

use thiserror::Error;

/// Failure kinds carried across the session engine.
#[derive(Debug, Error)]
pub enum SshToolError {
    /// Caller passed an argument the engine cannot act on. Not retried.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The named session does not exist (never created, or already closed).
    #[error("session '{0}' not found")]
    NotFound(String),

    /// A session with this identifier is already registered.
    #[error("session '{0}' already exists")]
    Duplicate(String),

    /// A configured cap (sessions or pooled connections) is exhausted.
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// The command was rejected by the configured allow/deny policy or by a
    /// session-level command filter.
    #[error("command denied by policy: {0}")]
    PolicyDenied(String),

    /// The private key file could not be read or parsed.
    #[error("cannot load private key '{path}': {cause}")]
    KeyUnavailable { path: String, cause: String },

    /// The SSH handshake did not complete within the configured deadline.
    #[error("connection to {target} timed out after {timeout:?}")]
    ConnectionTimeout { target: String, timeout: Duration },

    /// The SSH handshake or authentication failed.
    #[error("connection to {target} failed: {cause}")]
    ConnectionFailed { target: String, cause: String },

    /// Opening the interactive shell on an established transport failed.
    #[error("failed to open shell: {0}")]
    ShellFailure(String),

    /// The shell channel errored while a session was using it.
    #[error("channel stream error: {0}")]
    StreamError(String),

    /// No framed completion arrived within the per-command deadline.
    #[error("command timed out after {timeout:?}")]
    CommandTimeout { timeout: Duration },

    /// The call was dispatched against a session that is no longer active.
    #[error("session '{0}' is not active")]
    SessionInactive(String),
}

impl SshToolError {
    /// Short machine-readable kind tag, used in audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Duplicate(_) => "duplicate",
            Self::LimitExceeded(_) => "limit_exceeded",
            Self::PolicyDenied(_) => "policy_denied",
            Self::KeyUnavailable { .. } => "key_unavailable",
            Self::ConnectionTimeout { .. } => "connection_timeout",
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::ShellFailure(_) => "shell_failure",
            Self::StreamError(_) => "stream_error",
            Self::CommandTimeout { .. } => "command_timeout",
            Self::SessionInactive(_) => "session_inactive",
        }
    }
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, SshToolError>;

#[cfg(test)]
mod tests {
    use super::*;

    mod display {
        use super::*;

        #[test]
        fn test_invalid_argument_names_the_argument() {
            let err = SshToolError::InvalidArgument("port must be 1..=65535".into());
            assert_eq!(err.to_string(), "invalid argument: port must be 1..=65535");
        }

        #[test]
        fn test_not_found_names_the_session() {
            let err = SshToolError::NotFound("deploy-1".into());
            assert!(err.to_string().contains("deploy-1"));
        }

        #[test]
        fn test_command_timeout_includes_duration() {
            let err = SshToolError::CommandTimeout {
                timeout: Duration::from_millis(50),
            };
            assert!(err.to_string().contains("50ms"));
        }

        #[test]
        fn test_key_unavailable_includes_path_and_cause() {
            let err = SshToolError::KeyUnavailable {
                path: "/home/ops/.ssh/id_ed25519".into(),
                cause: "No such file or directory".into(),
            };
            let msg = err.to_string();
            assert!(msg.contains("/home/ops/.ssh/id_ed25519"));
            assert!(msg.contains("No such file"));
        }
    }

    mod kind_tags {
        use super::*;

        #[test]
        fn test_kind_tags_are_distinct() {
            let errors = [
                SshToolError::InvalidArgument(String::new()),
                SshToolError::NotFound(String::new()),
                SshToolError::Duplicate(String::new()),
                SshToolError::LimitExceeded(String::new()),
                SshToolError::PolicyDenied(String::new()),
                SshToolError::KeyUnavailable {
                    path: String::new(),
                    cause: String::new(),
                },
                SshToolError::ConnectionTimeout {
                    target: String::new(),
                    timeout: Duration::ZERO,
                },
                SshToolError::ConnectionFailed {
                    target: String::new(),
                    cause: String::new(),
                },
                SshToolError::ShellFailure(String::new()),
                SshToolError::StreamError(String::new()),
                SshToolError::CommandTimeout {
                    timeout: Duration::ZERO,
                },
                SshToolError::SessionInactive(String::new()),
            ];
            let mut kinds: Vec<&str> = errors.iter().map(|e| e.kind()).collect();
            kinds.sort_unstable();
            kinds.dedup();
            assert_eq!(kinds.len(), 12);
        }
    }
}
