//! Persistent SSH shell sessions exposed as MCP tools.
//!
//! The engine owns long-lived interactive shells over SSH and gives
//! callers stable session identities, command-by-command output framing,
//! and bounded background capture across bash, sh, PowerShell and cmd
//! remotes. The tool surface is served over stdio as line-delimited JSON.

pub mod mcp;
