//! Delimiter-framed output recovery for one in-flight command.
//!
//! A `CommandFramer` accumulates the raw chunks a shell channel produces
//! while one wrapped command runs, and reports completion once the end
//! marker with an exit code shows up. The extracted stdout is the text
//! strictly between the last start-marker occurrence and the end marker,
//! with a single blank edge line removed on each side (the newline the
//! marker echoes leave behind).
//!
//! The framer refuses to resolve when an exit code is visible but no start
//! marker precedes it: a truncated command echo could otherwise yield a
//! bogus empty result. More data, or the per-command timer, decides.

use regex::Regex;

use super::error::Result;
use super::shell_format::ShellKind;

/// Completed framed output for a single command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedOutput {
    pub stdout: String,
    pub exit_code: i32,
}

/// Incremental parser for one wrapped command's output.
#[derive(Debug)]
pub struct CommandFramer {
    start: String,
    exit_re: Regex,
    accumulated: String,
}

impl CommandFramer {
    /// Build a framer for the given marker pair. The exit-code pattern is
    /// compiled once per dispatched command.
    pub fn new(shell: ShellKind, start: &str, end: &str) -> Result<Self> {
        let exit_re = shell.exit_code_pattern(end)?;
        Ok(Self {
            start: start.to_string(),
            exit_re,
            accumulated: String::new(),
        })
    }

    /// Append a chunk and try to complete the frame.
    pub fn feed(&mut self, chunk: &str) -> Option<FramedOutput> {
        self.accumulated.push_str(chunk);
        self.try_complete()
    }

    /// Everything received so far for this command.
    pub fn accumulated(&self) -> &str {
        &self.accumulated
    }

    fn try_complete(&self) -> Option<FramedOutput> {
        let caps = self.exit_re.captures(&self.accumulated)?;
        let code_match = caps.get(0)?;
        let exit_code: i32 = caps.get(1)?.as_str().parse().ok()?;

        // The start marker must precede the exit-code marker. rfind bounds
        // the search to text before the code so echo ordering cannot pair
        // a late start with an earlier end.
        let before_end = &self.accumulated[..code_match.start()];
        let start_pos = before_end.rfind(&self.start)?;

        let body = &before_end[start_pos + self.start.len()..];
        Some(FramedOutput {
            stdout: trim_blank_edges(body).to_string(),
            exit_code,
        })
    }
}

/// Strip one leading and one trailing blank line, if present.
fn trim_blank_edges(s: &str) -> &str {
    let mut out = s;
    if let Some(idx) = out.find('\n')
        && out[..idx].trim().is_empty()
    {
        out = &out[idx + 1..];
    }
    if let Some(idx) = out.rfind('\n')
        && out[idx + 1..].trim().is_empty()
    {
        out = &out[..idx];
        out = out.strip_suffix('\r').unwrap_or(out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framer(start: &str, end: &str) -> CommandFramer {
        CommandFramer::new(ShellKind::Bash, start, end).unwrap()
    }

    mod completion {
        use super::*;

        #[test]
        fn test_bash_echo_frame() {
            let mut f = framer("S1", "E1");
            let out = f.feed("S1\nhi\nE1:0\n").unwrap();
            assert_eq!(out.stdout, "hi");
            assert_eq!(out.exit_code, 0);
        }

        #[test]
        fn test_nonzero_exit_with_empty_body() {
            let mut f = framer("S1", "E1");
            let out = f.feed("S1\nE1:1\n").unwrap();
            assert_eq!(out.stdout, "");
            assert_eq!(out.exit_code, 1);
        }

        #[test]
        fn test_powershell_crlf_frame() {
            let mut f = framer("S1", "E1");
            let out = f
                .feed("S1\r\nGet-Item : Cannot find path 'missing'\r\nE1:1\r\n")
                .unwrap();
            assert_eq!(out.stdout, "Get-Item : Cannot find path 'missing'");
            assert_eq!(out.exit_code, 1);
        }

        #[test]
        fn test_cmd_frame_with_trailing_space_on_marker_line() {
            // cmd's echo leaves a space before the & separator.
            let mut f = framer("S1", "E1");
            let out = f.feed("S1 \r\nFile Not Found\r\nE1:1\r\n").unwrap();
            assert_eq!(out.exit_code, 1);
            assert!(out.stdout.contains("File Not Found"));
        }

        #[test]
        fn test_chunked_arrival() {
            let mut f = framer("S1", "E1");
            assert!(f.feed("S1\nli").is_none());
            assert!(f.feed("ne one\nline two\n").is_none());
            let out = f.feed("E1:0\n").unwrap();
            assert_eq!(out.stdout, "line one\nline two");
        }

        #[test]
        fn test_multiline_body_preserved() {
            let mut f = framer("S1", "E1");
            let out = f.feed("S1\na\nb\nc\nE1:0\n").unwrap();
            assert_eq!(out.stdout, "a\nb\nc");
        }
    }

    mod tie_breaks {
        use super::*;

        #[test]
        fn test_exit_code_without_start_marker_does_not_resolve() {
            let mut f = framer("S1", "E1");
            assert!(f.feed("E1:0\n").is_none());
        }

        #[test]
        fn test_resolves_once_start_arrives_before_a_later_code() {
            let mut f = framer("S1", "E1");
            assert!(f.feed("E1:").is_none());
            // A code never materialized for the stray prefix; a full frame
            // later completes normally.
            let out = f.feed("\nS1\nok\nE1:0\n").unwrap();
            assert_eq!(out.stdout, "ok");
            assert_eq!(out.exit_code, 0);
        }

        #[test]
        fn test_last_start_occurrence_wins() {
            // The wrapped command echo contains the start marker once, the
            // marker output contains it again; the body is measured from
            // the later occurrence.
            let mut f = framer("S1", "E1");
            let out = f.feed("echo \"S1\"; true; echo \"E1:$?\"\nS1\nE1:0\n").unwrap();
            assert_eq!(out.stdout, "");
            assert_eq!(out.exit_code, 0);
        }

        #[test]
        fn test_unexpanded_echo_text_is_not_a_code() {
            let mut f = framer("S1", "E1");
            assert!(f.feed("echo \"S1\"; false; echo \"E1:$?\"\n").is_none());
        }
    }

    mod accumulation {
        use super::*;

        #[test]
        fn test_accumulated_keeps_raw_text() {
            let mut f = framer("S1", "E1");
            f.feed("abc");
            f.feed("def");
            assert_eq!(f.accumulated(), "abcdef");
        }
    }

    mod blank_edges {
        use super::*;

        #[test]
        fn test_trims_single_blank_line_each_side() {
            assert_eq!(trim_blank_edges("\nhi\n"), "hi");
            assert_eq!(trim_blank_edges("\r\nhi\r\n"), "hi");
        }

        #[test]
        fn test_keeps_interior_blank_lines() {
            assert_eq!(trim_blank_edges("\na\n\nb\n"), "a\n\nb");
        }

        #[test]
        fn test_whitespace_only_edge_line_counts_as_blank() {
            assert_eq!(trim_blank_edges(" \r\nbody\r\n"), "body");
        }

        #[test]
        fn test_non_blank_edges_untouched() {
            assert_eq!(trim_blank_edges("a\nb"), "a\nb");
        }

        #[test]
        fn test_empty_input() {
            assert_eq!(trim_blank_edges(""), "");
            assert_eq!(trim_blank_edges("\n"), "");
        }
    }
}
