//! Allow/deny command policy.
//!
//! The manager consults the policy before dispatching any command, on both
//! the one-shot and in-session paths. A non-empty allow list requires a
//! match; a non-empty deny list forbids one; when both lists match the same
//! command, the allow list decides.

use regex::Regex;

use super::config::SecurityConfig;
use super::error::{Result, SshToolError};

/// Compiled allow/deny lists.
#[derive(Debug, Default)]
pub struct CommandPolicy {
    allowed: Vec<Regex>,
    blocked: Vec<Regex>,
}

impl CommandPolicy {
    /// Compile the configured pattern lists. A pattern that fails to
    /// compile is a configuration bug, not something to skip silently.
    pub fn from_config(security: &SecurityConfig) -> Result<Self> {
        Ok(Self {
            allowed: compile_list("allowed command", &security.allowed_commands)?,
            blocked: compile_list("blocked command", &security.blocked_commands)?,
        })
    }

    /// Check a command against the policy.
    pub fn check(&self, command: &str) -> Result<()> {
        if !self.allowed.is_empty() {
            if self.allowed.iter().any(|re| re.is_match(command)) {
                return Ok(());
            }
            return Err(SshToolError::PolicyDenied(format!(
                "command does not match any allowed pattern: {command}"
            )));
        }
        if self.blocked.iter().any(|re| re.is_match(command)) {
            return Err(SshToolError::PolicyDenied(format!(
                "command matches a blocked pattern: {command}"
            )));
        }
        Ok(())
    }

    /// Whether any pattern is configured at all.
    pub fn is_restrictive(&self) -> bool {
        !self.allowed.is_empty() || !self.blocked.is_empty()
    }
}

fn compile_list(what: &str, patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| {
                SshToolError::InvalidArgument(format!("invalid {what} pattern '{p}': {e}"))
            })
        })
        .collect()
}
