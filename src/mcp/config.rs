//! Engine configuration with environment-variable resolution.
//!
//! Values resolve with a two-tier priority: environment variable, then
//! built-in default. Every numeric knob has a documented bound and
//! `validate()` rejects configurations outside it; the engine also
//! re-checks per-call arguments so it stays safe as a library.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_COMMAND_TIMEOUT_MS` | 30000 | Per-command timeout |
//! | `SSH_SESSION_TIMEOUT_MS` | 600000 | Session inactivity timeout |
//! | `SSH_CONNECT_TIMEOUT_MS` | 30000 | Handshake ready timeout |
//! | `SSH_KEEP_ALIVE_INTERVAL_MS` | 30000 | Idle keep-alive period |
//! | `SSH_BUFFER_MAX_SIZE` | 10000 | Background buffer entry cap |
//! | `SSH_BUFFER_TRIM_TO` | 5000 | Entries kept after a trim |
//! | `SSH_MAX_SESSIONS` | 10 | Concurrent session cap |
//! | `SSH_MAX_CONNECTIONS` | 5 | Pooled transport cap |
//! | `SSH_ALLOWED_COMMANDS` | (unset) | Comma-separated allow regexes |
//! | `SSH_BLOCKED_COMMANDS` | (unset) | Comma-separated deny regexes |
//! | `SSH_LOG_COMMANDS` | false | Include command text in audit events |
//! | `SSH_LOG_RESPONSES` | false | Include captured output in audit events |
//! | `SSH_LOG_MAX_RESPONSE_LENGTH` | 1024 | Captured output truncation cap |

use std::env;
use std::time::Duration;

use super::error::{Result, SshToolError};

/// Default per-command timeout in milliseconds.
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 30_000;

/// Default session inactivity timeout in milliseconds.
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 600_000;

/// Default SSH handshake ready timeout in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 30_000;

/// Default idle keep-alive period in milliseconds.
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 30_000;

/// Bounded wait for a single transport or session to close.
pub const FORCE_CLOSE_MS: u64 = 3_000;

/// Bounded wait per session during full shutdown.
pub const SESSION_CLOSE_MS: u64 = 5_000;

/// Upper bound for any configurable timeout (one hour).
pub const MAX_TIMEOUT_MS: u64 = 3_600_000;

/// Upper bound for buffer entry counts.
pub const MAX_BUFFER_ENTRIES: usize = 100_000;

/// Concurrent session cap bounds.
pub const MAX_SESSIONS_LIMIT: usize = 100;

const DEFAULT_MAX_SESSIONS: usize = 10;
const DEFAULT_MAX_CONNECTIONS: usize = 5;
const DEFAULT_MAX_RESPONSE_LENGTH: usize = 1024;

fn env_u64(var: &str, default: u64) -> u64 {
    if let Ok(raw) = env::var(var)
        && let Ok(value) = raw.parse::<u64>()
    {
        return value;
    }
    default
}

fn env_usize(var: &str, default: usize) -> usize {
    if let Ok(raw) = env::var(var)
        && let Ok(value) = raw.parse::<usize>()
    {
        return value;
    }
    default
}

fn env_bool(var: &str, default: bool) -> bool {
    match env::var(var) {
        Ok(raw) => raw.eq_ignore_ascii_case("true") || raw == "1",
        Err(_) => default,
    }
}

fn env_list(var: &str) -> Vec<String> {
    env::var(var)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Timeout knobs, all bounded by [`MAX_TIMEOUT_MS`].
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub command: Duration,
    pub session: Duration,
    pub connect: Duration,
    pub keep_alive: Duration,
    pub force_close: Duration,
    pub session_close: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            command: Duration::from_millis(DEFAULT_COMMAND_TIMEOUT_MS),
            session: Duration::from_millis(DEFAULT_SESSION_TIMEOUT_MS),
            connect: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            keep_alive: Duration::from_millis(DEFAULT_KEEP_ALIVE_INTERVAL_MS),
            force_close: Duration::from_millis(FORCE_CLOSE_MS),
            session_close: Duration::from_millis(SESSION_CLOSE_MS),
        }
    }
}

/// Background buffer bounds.
#[derive(Debug, Clone)]
pub struct BufferConfig {
    pub max_size: usize,
    pub trim_to: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            max_size: super::buffer::DEFAULT_MAX_SIZE,
            trim_to: super::buffer::DEFAULT_TRIM_TO,
        }
    }
}

/// Command policy and resource caps.
#[derive(Debug, Clone, Default)]
pub struct SecurityConfig {
    /// When non-empty, a command must match at least one of these.
    pub allowed_commands: Vec<String>,
    /// When non-empty, a command must match none of these. The allow list
    /// wins when both apply to the same command.
    pub blocked_commands: Vec<String>,
    pub max_sessions: usize,
    pub max_connections: usize,
}

/// Audit event verbosity and redaction.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Include (redacted) command text in audit events.
    pub include_commands: bool,
    /// Include captured stdout/stderr in audit events.
    pub include_responses: bool,
    /// Truncation cap applied to captured output.
    pub max_response_length: usize,
    /// Extra redaction patterns; invalid ones are skipped at compile time.
    pub redact_patterns: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            include_commands: false,
            include_responses: false,
            max_response_length: DEFAULT_MAX_RESPONSE_LENGTH,
            redact_patterns: Vec::new(),
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub timeouts: TimeoutConfig,
    pub buffers: BufferConfig,
    pub security: SecurityConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeouts: TimeoutConfig::default(),
            buffers: BufferConfig::default(),
            security: SecurityConfig {
                allowed_commands: Vec::new(),
                blocked_commands: Vec::new(),
                max_sessions: DEFAULT_MAX_SESSIONS,
                max_connections: DEFAULT_MAX_CONNECTIONS,
            },
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Resolve the configuration from the environment, falling back to
    /// defaults for unset or unparseable variables.
    pub fn from_env() -> Self {
        Self {
            timeouts: TimeoutConfig {
                command: Duration::from_millis(env_u64(
                    "SSH_COMMAND_TIMEOUT_MS",
                    DEFAULT_COMMAND_TIMEOUT_MS,
                )),
                session: Duration::from_millis(env_u64(
                    "SSH_SESSION_TIMEOUT_MS",
                    DEFAULT_SESSION_TIMEOUT_MS,
                )),
                connect: Duration::from_millis(env_u64(
                    "SSH_CONNECT_TIMEOUT_MS",
                    DEFAULT_CONNECT_TIMEOUT_MS,
                )),
                keep_alive: Duration::from_millis(env_u64(
                    "SSH_KEEP_ALIVE_INTERVAL_MS",
                    DEFAULT_KEEP_ALIVE_INTERVAL_MS,
                )),
                force_close: Duration::from_millis(FORCE_CLOSE_MS),
                session_close: Duration::from_millis(SESSION_CLOSE_MS),
            },
            buffers: BufferConfig {
                max_size: env_usize("SSH_BUFFER_MAX_SIZE", super::buffer::DEFAULT_MAX_SIZE),
                trim_to: env_usize("SSH_BUFFER_TRIM_TO", super::buffer::DEFAULT_TRIM_TO),
            },
            security: SecurityConfig {
                allowed_commands: env_list("SSH_ALLOWED_COMMANDS"),
                blocked_commands: env_list("SSH_BLOCKED_COMMANDS"),
                max_sessions: env_usize("SSH_MAX_SESSIONS", DEFAULT_MAX_SESSIONS),
                max_connections: env_usize("SSH_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS),
            },
            logging: LoggingConfig {
                include_commands: env_bool("SSH_LOG_COMMANDS", false),
                include_responses: env_bool("SSH_LOG_RESPONSES", false),
                max_response_length: env_usize(
                    "SSH_LOG_MAX_RESPONSE_LENGTH",
                    DEFAULT_MAX_RESPONSE_LENGTH,
                ),
                redact_patterns: env_list("SSH_REDACT_PATTERNS"),
            },
        }
    }

    /// Reject configurations outside documented bounds.
    pub fn validate(&self) -> Result<()> {
        for (name, timeout) in [
            ("command timeout", self.timeouts.command),
            ("session timeout", self.timeouts.session),
            ("connect timeout", self.timeouts.connect),
            ("keep-alive interval", self.timeouts.keep_alive),
        ] {
            validate_timeout(name, timeout)?;
        }
        if self.buffers.max_size == 0 || self.buffers.max_size > MAX_BUFFER_ENTRIES {
            return Err(SshToolError::InvalidArgument(format!(
                "buffer max size must be 1..={MAX_BUFFER_ENTRIES}"
            )));
        }
        if self.buffers.trim_to == 0 || self.buffers.trim_to > self.buffers.max_size {
            return Err(SshToolError::InvalidArgument(
                "buffer trim target must be 1..=max size".into(),
            ));
        }
        if self.security.max_sessions == 0 || self.security.max_sessions > MAX_SESSIONS_LIMIT {
            return Err(SshToolError::InvalidArgument(format!(
                "max sessions must be 1..={MAX_SESSIONS_LIMIT}"
            )));
        }
        if self.security.max_connections == 0 {
            return Err(SshToolError::InvalidArgument(
                "max connections must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Shared timeout bound check used by every exec surface.
pub fn validate_timeout(name: &str, timeout: Duration) -> Result<()> {
    if timeout.is_zero() {
        return Err(SshToolError::InvalidArgument(format!(
            "{name} must be greater than zero"
        )));
    }
    if timeout > Duration::from_millis(MAX_TIMEOUT_MS) {
        return Err(SshToolError::InvalidArgument(format!(
            "{name} must not exceed {MAX_TIMEOUT_MS} ms"
        )));
    }
    Ok(())
}

/// Port zero is the only representable out-of-range value for a `u16`.
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(SshToolError::InvalidArgument(
            "port must be in 1..=65535".into(),
        ));
    }
    Ok(())
}
