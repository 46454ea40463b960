//! Model and wire types for the session engine.
//!
//! Wire-facing types implement `Serialize`, `Deserialize` and `JsonSchema`
//! so the tool layer can expose them directly. `SessionSnapshot` is the
//! engine-side deep copy of a live session's state; `SessionInfo` is the
//! minimized view exported to callers (no environment variables, history
//! or working directory).

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::error::{Result, SshToolError};
use super::shell_format::ShellKind;

/// Whether callers wait for each command or fire-and-forget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Callers suspend until each command's framed result is available.
    Interactive,
    /// Callers return on enqueue; output is observable only via the buffer.
    Background,
}

impl SessionKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "interactive" => Ok(Self::Interactive),
            "background" => Ok(Self::Background),
            other => Err(SshToolError::InvalidArgument(format!(
                "unknown session type '{other}' (expected interactive or background)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Interactive => "interactive",
            Self::Background => "background",
        }
    }
}

/// Whether commands are delimiter-framed or written verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    /// Commands are wrapped with markers; results carry real exit codes.
    Normal,
    /// The session is a byte pipe; completion is timer-based and the exit
    /// code is unknowable (reported as 0).
    Raw,
}

impl SessionMode {
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "normal" => Ok(Self::Normal),
            "raw" => Ok(Self::Raw),
            other => Err(SshToolError::InvalidArgument(format!(
                "unknown session mode '{other}' (expected normal or raw)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Raw => "raw",
        }
    }
}

/// The remote endpoint a session or one-shot command targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionTarget {
    pub host: String,
    pub username: String,
    pub port: u16,
}

impl std::fmt::Display for SessionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Outcome of one executed command.
///
/// `exit_code` is `None` only for raw-mode completions and abnormal
/// termination (a delivering signal populates `signal` instead).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub signal: Option<String>,
}

/// Full deep-copied snapshot of a session's state.
///
/// Mutating a snapshot never affects the live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub session_id: String,
    pub host: String,
    pub username: String,
    pub port: u16,
    pub kind: SessionKind,
    pub mode: SessionMode,
    pub shell: ShellKind,
    pub created_at: String,
    pub last_activity: String,
    pub is_active: bool,
    pub command_history: Vec<String>,
    pub environment_vars: HashMap<String, String>,
    pub working_directory: String,
}

/// Caller-facing session view. Environment variables, command history and
/// the working directory stay inside the engine.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionInfo {
    pub session_id: String,
    pub host: String,
    pub username: String,
    pub port: u16,
    #[serde(rename = "type")]
    pub kind: SessionKind,
    pub mode: SessionMode,
    pub shell: ShellKind,
    pub created_at: String,
    pub last_activity: String,
    pub is_active: bool,
}

impl From<&SessionSnapshot> for SessionInfo {
    fn from(snap: &SessionSnapshot) -> Self {
        Self {
            session_id: snap.session_id.clone(),
            host: snap.host.clone(),
            username: snap.username.clone(),
            port: snap.port,
            kind: snap.kind,
            mode: snap.mode,
            shell: snap.shell,
            created_at: snap.created_at.clone(),
            last_activity: snap.last_activity.clone(),
            is_active: snap.is_active,
        }
    }
}

/// Response for `ssh_session_list`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
    pub count: usize,
}

/// Response for `ssh_session_close`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionCloseResponse {
    pub success: bool,
}

/// Response for `ssh_session_output`.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SessionOutputResponse {
    pub output: Vec<String>,
}
