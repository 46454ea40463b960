//! Per-shell command wrapping and exit-code recovery.
//!
//! Interactive shell channels carry a single unstructured text stream, so a
//! command's own output and its exit status have to be recovered by
//! bracketing the command between unique markers. Each remote shell dialect
//! needs its own bracketing syntax and its own idle no-op:
//!
//! - `bash` / `sh` use `echo` and `$?`
//! - `powershell` uses `Write-Output` and `$LASTEXITCODE`
//! - `cmd` uses `echo` and `%ERRORLEVEL%`, with a redirected probe that
//!   forces `ERRORLEVEL` evaluation before the terminating marker
//!
//! The exit code is recovered by matching `<end-marker>:(digits)` against
//! accumulated output.

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::error::{Result, SshToolError};

/// Remote shell dialect a session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ShellKind {
    Bash,
    Sh,
    #[serde(rename = "powershell")]
    PowerShell,
    Cmd,
}

impl ShellKind {
    /// Parse a wire-level shell name. Unknown names are rejected.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "bash" => Ok(Self::Bash),
            "sh" => Ok(Self::Sh),
            "powershell" => Ok(Self::PowerShell),
            "cmd" => Ok(Self::Cmd),
            other => Err(SshToolError::InvalidArgument(format!(
                "unknown shell type '{other}' (expected bash, sh, powershell or cmd)"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bash => "bash",
            Self::Sh => "sh",
            Self::PowerShell => "powershell",
            Self::Cmd => "cmd",
        }
    }

    /// Wrap a user command so the shell emits a start marker, the command's
    /// own output, and an end marker carrying the exit status.
    pub fn wrap_command(&self, command: &str, start: &str, end: &str) -> Result<String> {
        if command.trim().is_empty() {
            return Err(SshToolError::InvalidArgument(
                "command must not be empty".into(),
            ));
        }
        if start.is_empty() || end.is_empty() {
            return Err(SshToolError::InvalidArgument(
                "delimiter markers must not be empty".into(),
            ));
        }

        Ok(match self {
            Self::Bash | Self::Sh => {
                format!("echo \"{start}\"; {command}; echo \"{end}:$?\"")
            }
            Self::PowerShell => {
                format!("Write-Output \"{start}\"; {command}; Write-Output \"{end}:$LASTEXITCODE\"")
            }
            // The redirected echo forces ERRORLEVEL evaluation before the
            // terminating marker is printed.
            Self::Cmd => {
                format!(
                    "echo {start} & {command} & echo %ERRORLEVEL% > NUL & echo {end}:%ERRORLEVEL%"
                )
            }
        })
    }

    /// A line that is a no-op in this shell, written while a session idles
    /// to defeat intermediary idle-timeouts.
    pub fn keep_alive(&self) -> &'static str {
        match self {
            Self::Bash | Self::Sh => "\n",
            Self::PowerShell => "Write-Output \"\"\n",
            Self::Cmd => "echo.\n",
        }
    }

    /// Compile the pattern that recovers the exit code for `end`.
    pub fn exit_code_pattern(&self, end: &str) -> Result<Regex> {
        if end.is_empty() {
            return Err(SshToolError::InvalidArgument(
                "delimiter markers must not be empty".into(),
            ));
        }
        Regex::new(&format!(r"{}:(\d+)", regex::escape(end)))
            .map_err(|e| SshToolError::InvalidArgument(format!("bad delimiter marker: {e}")))
    }

    /// Apply the exit-code pattern to accumulated output. Returns the first
    /// captured code, or `None` if the end marker has not appeared yet.
    pub fn extract_exit_code(&self, output: &str, end: &str) -> Result<Option<i32>> {
        let re = self.exit_code_pattern(end)?;
        Ok(re
            .captures(output)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<i32>().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod parsing {
        use super::*;

        #[test]
        fn test_known_shells_parse() {
            assert_eq!(ShellKind::parse("bash").unwrap(), ShellKind::Bash);
            assert_eq!(ShellKind::parse("sh").unwrap(), ShellKind::Sh);
            assert_eq!(ShellKind::parse("powershell").unwrap(), ShellKind::PowerShell);
            assert_eq!(ShellKind::parse("cmd").unwrap(), ShellKind::Cmd);
        }

        #[test]
        fn test_unknown_shell_is_rejected() {
            let err = ShellKind::parse("zsh").unwrap_err();
            assert!(matches!(err, SshToolError::InvalidArgument(_)));
        }

        #[test]
        fn test_round_trips_through_as_str() {
            for kind in [
                ShellKind::Bash,
                ShellKind::Sh,
                ShellKind::PowerShell,
                ShellKind::Cmd,
            ] {
                assert_eq!(ShellKind::parse(kind.as_str()).unwrap(), kind);
            }
        }
    }

    mod wrapping {
        use super::*;

        #[test]
        fn test_bash_wrap_shape() {
            let wrapped = ShellKind::Bash.wrap_command("echo hi", "S1", "E1").unwrap();
            assert_eq!(wrapped, "echo \"S1\"; echo hi; echo \"E1:$?\"");
        }

        #[test]
        fn test_sh_wraps_like_bash() {
            let bash = ShellKind::Bash.wrap_command("ls", "S", "E").unwrap();
            let sh = ShellKind::Sh.wrap_command("ls", "S", "E").unwrap();
            assert_eq!(bash, sh);
        }

        #[test]
        fn test_powershell_wrap_shape() {
            let wrapped = ShellKind::PowerShell
                .wrap_command("Get-Process", "S1", "E1")
                .unwrap();
            assert_eq!(
                wrapped,
                "Write-Output \"S1\"; Get-Process; Write-Output \"E1:$LASTEXITCODE\""
            );
        }

        #[test]
        fn test_cmd_wrap_forces_errorlevel_evaluation() {
            let wrapped = ShellKind::Cmd.wrap_command("dir", "S1", "E1").unwrap();
            assert_eq!(
                wrapped,
                "echo S1 & dir & echo %ERRORLEVEL% > NUL & echo E1:%ERRORLEVEL%"
            );
        }

        #[test]
        fn test_empty_command_is_rejected() {
            for kind in [ShellKind::Bash, ShellKind::PowerShell, ShellKind::Cmd] {
                let err = kind.wrap_command("", "S", "E").unwrap_err();
                assert!(matches!(err, SshToolError::InvalidArgument(_)));
            }
        }

        #[test]
        fn test_whitespace_only_command_is_rejected() {
            let err = ShellKind::Bash.wrap_command("   ", "S", "E").unwrap_err();
            assert!(matches!(err, SshToolError::InvalidArgument(_)));
        }

        #[test]
        fn test_empty_markers_are_rejected() {
            assert!(ShellKind::Bash.wrap_command("ls", "", "E").is_err());
            assert!(ShellKind::Bash.wrap_command("ls", "S", "").is_err());
        }
    }

    mod keep_alive {
        use super::*;

        #[test]
        fn test_bash_keep_alive_is_bare_newline() {
            assert_eq!(ShellKind::Bash.keep_alive(), "\n");
            assert_eq!(ShellKind::Sh.keep_alive(), "\n");
        }

        #[test]
        fn test_powershell_keep_alive() {
            assert_eq!(ShellKind::PowerShell.keep_alive(), "Write-Output \"\"\n");
        }

        #[test]
        fn test_cmd_keep_alive() {
            assert_eq!(ShellKind::Cmd.keep_alive(), "echo.\n");
        }
    }

    mod exit_codes {
        use super::*;

        #[test]
        fn test_extracts_zero() {
            let code = ShellKind::Bash
                .extract_exit_code("S1\nhi\nE1:0\n", "E1")
                .unwrap();
            assert_eq!(code, Some(0));
        }

        #[test]
        fn test_extracts_nonzero() {
            let code = ShellKind::Bash.extract_exit_code("E1:127\n", "E1").unwrap();
            assert_eq!(code, Some(127));
        }

        #[test]
        fn test_absent_marker_yields_none() {
            let code = ShellKind::Bash
                .extract_exit_code("no markers here", "E1")
                .unwrap();
            assert_eq!(code, None);
        }

        #[test]
        fn test_marker_without_code_yields_none() {
            // The echoed command text contains "E1:$?" before the shell
            // expands it; the digit requirement must skip it.
            let code = ShellKind::Bash
                .extract_exit_code("echo \"E1:$?\"\n", "E1")
                .unwrap();
            assert_eq!(code, None);
        }

        #[test]
        fn test_marker_with_regex_metacharacters() {
            let code = ShellKind::Bash
                .extract_exit_code("X.Y+Z:42\n", "X.Y+Z")
                .unwrap();
            assert_eq!(code, Some(42));
        }

        #[test]
        fn test_first_code_wins() {
            let code = ShellKind::Bash
                .extract_exit_code("E1:3\ngarbage\nE1:9\n", "E1")
                .unwrap();
            assert_eq!(code, Some(3));
        }

        #[test]
        fn test_empty_marker_is_rejected() {
            assert!(ShellKind::Bash.extract_exit_code("anything", "").is_err());
        }
    }
}
