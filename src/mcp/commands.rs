//! MCP tool implementations for SSH session operations.
//!
//! This module provides the wire-facing tools:
//!
//! - `ssh_execute`: one-shot command over an exec channel
//! - `ssh_session_create`: open a persistent shell session
//! - `ssh_session_execute`: run a command inside a session
//! - `ssh_session_list`: list active sessions
//! - `ssh_session_close`: close a session
//! - `ssh_session_output`: read a background session's buffered output
//!
//! Tool names are part of the wire contract. Arguments are validated here
//! at the boundary and re-validated by the engine, which is also reachable
//! as a library.

use std::sync::Arc;
use std::time::Duration;

use poem_mcpserver::{Tools, tool::StructuredContent};
use tracing::info;

use super::config::MAX_TIMEOUT_MS;
use super::error::{Result, SshToolError};
use super::manager::{CreateSessionParams, SessionManager};
use super::shell_format::ShellKind;
use super::types::{
    CommandResult, SessionCloseResponse, SessionInfo, SessionKind, SessionListResponse,
    SessionMode, SessionOutputResponse,
};

/// Largest line count a single output read may request.
const MAX_OUTPUT_LINES: u64 = 50_000;

/// MCP SSH session tools.
pub struct SshTools {
    manager: Arc<SessionManager>,
}

impl SshTools {
    pub fn new(manager: Arc<SessionManager>) -> Self {
        Self { manager }
    }
}

#[Tools]
impl SshTools {
    /// Execute a single command on a remote host over SSH.
    ///
    /// Opens (or reuses) a pooled connection to the host, runs the command
    /// on a one-shot exec channel, and returns stdout, stderr, the exit
    /// code and the delivering signal (if any).
    async fn ssh_execute(
        &self,
        /// Remote host name or address
        host: String,
        /// SSH username
        username: String,
        /// Path to the private key file used for authentication
        private_key_path: String,
        /// Command to execute
        command: String,
        /// SSH port (default: 22)
        port: Option<u16>,
        /// Command timeout in milliseconds (default: 30000, max: 3600000)
        timeout: Option<u64>,
    ) -> std::result::Result<StructuredContent<CommandResult>, String> {
        let port = port.unwrap_or(22);
        let timeout = parse_timeout(timeout).map_err(stringify)?;
        let result = self
            .manager
            .execute_command(&host, &username, &private_key_path, &command, port, timeout)
            .await
            .map_err(stringify)?;
        Ok(StructuredContent(result))
    }

    /// Create a persistent SSH shell session.
    ///
    /// The returned session id addresses the session in all subsequent
    /// calls. Interactive sessions report each command's framed result;
    /// background sessions acknowledge immediately and buffer their
    /// output for `ssh_session_output`. Raw mode skips framing entirely:
    /// completion is timer-based and the reported exit code is always 0.
    #[allow(clippy::too_many_arguments)]
    async fn ssh_session_create(
        &self,
        /// Unique identifier for the new session
        session_id: String,
        /// Remote host name or address
        host: String,
        /// SSH username
        username: String,
        /// Path to the private key file used for authentication
        private_key_path: String,
        /// Session type: "interactive" or "background"
        session_type: String,
        /// SSH port (default: 22)
        port: Option<u16>,
        /// Output handling mode: "normal" (framed) or "raw" (default: normal)
        mode: Option<String>,
        /// Remote shell dialect: "bash", "sh", "powershell" or "cmd" (default: bash)
        shell_type: Option<String>,
        /// Session inactivity timeout in milliseconds (default: 600000)
        timeout: Option<u64>,
    ) -> std::result::Result<StructuredContent<SessionInfo>, String> {
        let params = CreateSessionParams {
            session_id,
            host,
            username,
            key_path: private_key_path,
            kind: SessionKind::parse(&session_type).map_err(stringify)?,
            port: port.unwrap_or(22),
            mode: mode
                .as_deref()
                .map(SessionMode::parse)
                .transpose()
                .map_err(stringify)?
                .unwrap_or(SessionMode::Normal),
            shell: shell_type
                .as_deref()
                .map(ShellKind::parse)
                .transpose()
                .map_err(stringify)?
                .unwrap_or(ShellKind::Bash),
            session_timeout: parse_timeout(timeout).map_err(stringify)?,
        };
        let session = self.manager.create_session(params).await.map_err(stringify)?;
        info!("session '{}' created via tool call", session.id());
        let snapshot = session.snapshot().await;
        Ok(StructuredContent(SessionInfo::from(&snapshot)))
    }

    /// Execute a command inside an existing session.
    ///
    /// Interactive sessions block until the command completes or times
    /// out. Background sessions return an acknowledgment immediately.
    async fn ssh_session_execute(
        &self,
        /// Session id returned by ssh_session_create
        session_id: String,
        /// Command to execute
        command: String,
        /// Command timeout in milliseconds (default: 30000, max: 3600000)
        timeout: Option<u64>,
    ) -> std::result::Result<StructuredContent<CommandResult>, String> {
        let timeout = parse_timeout(timeout).map_err(stringify)?;
        let result = self
            .manager
            .execute_in_session(&session_id, &command, timeout, None)
            .await
            .map_err(stringify)?;
        Ok(StructuredContent(result))
    }

    /// List all active sessions in creation order.
    async fn ssh_session_list(
        &self,
    ) -> std::result::Result<StructuredContent<SessionListResponse>, String> {
        let snapshots = self.manager.list_sessions().await;
        let sessions: Vec<SessionInfo> = snapshots.iter().map(SessionInfo::from).collect();
        let count = sessions.len();
        Ok(StructuredContent(SessionListResponse { sessions, count }))
    }

    /// Close a session and release its channel.
    ///
    /// Returns success=false when no session with that id exists.
    async fn ssh_session_close(
        &self,
        /// Session id to close
        session_id: String,
    ) -> std::result::Result<StructuredContent<SessionCloseResponse>, String> {
        let success = self.manager.close_session(&session_id).await;
        Ok(StructuredContent(SessionCloseResponse { success }))
    }

    /// Read buffered output from a background session.
    ///
    /// Returns the most recent `lines` buffered chunks (all of them when
    /// unspecified). Set `clear` to truncate the buffer after reading.
    async fn ssh_session_output(
        &self,
        /// Session id to read from
        session_id: String,
        /// Number of trailing entries to return (1..=50000)
        lines: Option<u64>,
        /// Clear the buffer after reading (default: false)
        clear: Option<bool>,
    ) -> std::result::Result<StructuredContent<SessionOutputResponse>, String> {
        let lines = parse_lines(lines).map_err(stringify)?;
        let output = self
            .manager
            .get_session_output(&session_id, lines, clear.unwrap_or(false))
            .await
            .map_err(stringify)?;
        Ok(StructuredContent(SessionOutputResponse { output }))
    }
}

fn parse_timeout(timeout_ms: Option<u64>) -> Result<Option<Duration>> {
    match timeout_ms {
        None => Ok(None),
        Some(0) => Err(SshToolError::InvalidArgument(
            "timeout must be greater than zero".into(),
        )),
        Some(ms) if ms > MAX_TIMEOUT_MS => Err(SshToolError::InvalidArgument(format!(
            "timeout must not exceed {MAX_TIMEOUT_MS} ms"
        ))),
        Some(ms) => Ok(Some(Duration::from_millis(ms))),
    }
}

fn parse_lines(lines: Option<u64>) -> Result<Option<usize>> {
    match lines {
        None => Ok(None),
        Some(0) => Err(SshToolError::InvalidArgument(
            "lines must be at least 1".into(),
        )),
        Some(n) if n > MAX_OUTPUT_LINES => Err(SshToolError::InvalidArgument(format!(
            "lines must not exceed {MAX_OUTPUT_LINES}"
        ))),
        Some(n) => Ok(Some(n as usize)),
    }
}

fn stringify(err: SshToolError) -> String {
    err.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    mod timeout_bounds {
        use super::*;

        #[test]
        fn test_unset_passes_through() {
            assert_eq!(parse_timeout(None).unwrap(), None);
        }

        #[test]
        fn test_zero_rejected() {
            assert!(parse_timeout(Some(0)).is_err());
        }

        #[test]
        fn test_one_hour_is_the_ceiling() {
            assert!(parse_timeout(Some(MAX_TIMEOUT_MS)).is_ok());
            assert!(parse_timeout(Some(MAX_TIMEOUT_MS + 1)).is_err());
        }

        #[test]
        fn test_value_converts_to_duration() {
            assert_eq!(
                parse_timeout(Some(1_500)).unwrap(),
                Some(Duration::from_millis(1_500))
            );
        }
    }

    mod line_bounds {
        use super::*;

        #[test]
        fn test_unset_passes_through() {
            assert_eq!(parse_lines(None).unwrap(), None);
        }

        #[test]
        fn test_zero_rejected() {
            assert!(parse_lines(Some(0)).is_err());
        }

        #[test]
        fn test_cap_enforced() {
            assert_eq!(parse_lines(Some(MAX_OUTPUT_LINES)).unwrap(), Some(50_000));
            assert!(parse_lines(Some(MAX_OUTPUT_LINES + 1)).is_err());
        }
    }
}
