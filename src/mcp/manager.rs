//! Session manager: registry, policy, one-shot exec, API facade.
//!
//! The manager owns the connection pool and the session registry, applies
//! the configured command policy on every dispatch path, and fans session
//! lifecycle events out to an optional audit sink after sanitization.
//!
//! One-shot execution uses the SSH `exec` primitive on a short-lived
//! channel: no delimiter framing, no queue, stderr separated. Session
//! execution delegates to the per-session queue.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use russh::ChannelMsg;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::config::{EngineConfig, validate_port, validate_timeout};
use super::error::{Result, SshToolError};
use super::events::{AuditEvent, SessionEvent, event_timestamp};
use super::policy::CommandPolicy;
use super::pool::{ConnectionPool, pool_config};
use super::registry::{DashMapSessionRegistry, SessionRegistry};
use super::sanitize::Sanitizer;
use super::session::{PersistentSession, SessionSettings, SessionStatus};
use super::shell_format::ShellKind;
use super::types::{CommandResult, SessionKind, SessionMode, SessionSnapshot, SessionTarget};

/// Parameters for `create_session`.
#[derive(Debug, Clone)]
pub struct CreateSessionParams {
    pub session_id: String,
    pub host: String,
    pub username: String,
    pub key_path: String,
    pub kind: SessionKind,
    pub port: u16,
    pub mode: SessionMode,
    pub shell: ShellKind,
    /// Overrides the configured inactivity timeout when set.
    pub session_timeout: Option<Duration>,
}

/// Facade over the pool, the registry and the policy.
pub struct SessionManager {
    config: EngineConfig,
    pool: ConnectionPool,
    registry: Arc<DashMapSessionRegistry>,
    policy: CommandPolicy,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
    sanitizer: Arc<Sanitizer>,
    audit_tx: Option<mpsc::UnboundedSender<AuditEvent>>,
}

impl SessionManager {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_audit_sink(config, None)
    }

    /// Build the manager, validating the configuration and compiling the
    /// policy. Lifecycle events are forwarded to `audit_tx` (sanitized)
    /// when a sink is provided.
    ///
    /// Must be called within a Tokio runtime: the event loop task is
    /// spawned here.
    pub fn with_audit_sink(
        config: EngineConfig,
        audit_tx: Option<mpsc::UnboundedSender<AuditEvent>>,
    ) -> Result<Self> {
        config.validate()?;
        let policy = CommandPolicy::from_config(&config.security)?;
        let pool = ConnectionPool::new(pool_config(
            config.security.max_connections,
            config.timeouts.connect,
            config.timeouts.force_close,
            config.timeouts.keep_alive,
        )?);
        let registry = Arc::new(DashMapSessionRegistry::new());
        let sanitizer = Arc::new(Sanitizer::new(&config.logging));
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        spawn_event_loop(
            registry.clone(),
            events_rx,
            sanitizer.clone(),
            audit_tx.clone(),
        );

        Ok(Self {
            config,
            pool,
            registry,
            policy,
            events_tx,
            sanitizer,
            audit_tx,
        })
    }

    /// One-shot command over a short-lived `exec` channel.
    pub async fn execute_command(
        &self,
        host: &str,
        username: &str,
        key_path: &str,
        command: &str,
        port: u16,
        timeout: Option<Duration>,
    ) -> Result<CommandResult> {
        if command.trim().is_empty() {
            return Err(SshToolError::InvalidArgument(
                "command must not be empty".into(),
            ));
        }
        let timeout = timeout.unwrap_or(self.config.timeouts.command);
        validate_timeout("command timeout", timeout)?;
        validate_port(port)?;
        self.policy.check(command)?;

        let transport = self
            .pool
            .acquire(host, username, key_path, None, port)
            .await?;

        self.emit_audit(AuditEvent::CommandDispatched {
            session_id: None,
            host: host.to_string(),
            username: username.to_string(),
            command: Some(command.to_string()),
            at: event_timestamp(),
        });

        let outcome = exec_once(&transport, command, timeout).await;

        self.emit_audit(AuditEvent::CommandCompleted {
            session_id: None,
            host: host.to_string(),
            username: username.to_string(),
            command: Some(command.to_string()),
            exit_code: outcome.as_ref().ok().and_then(|r| r.exit_code),
            stdout: outcome.as_ref().ok().map(|r| r.stdout.clone()),
            stderr: outcome.as_ref().ok().map(|r| r.stderr.clone()),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            at: event_timestamp(),
        });

        outcome
    }

    /// Create, initialize and register a persistent session.
    pub async fn create_session(
        &self,
        params: CreateSessionParams,
    ) -> Result<Arc<PersistentSession>> {
        if params.session_id.trim().is_empty() {
            return Err(SshToolError::InvalidArgument(
                "session id must not be empty".into(),
            ));
        }
        validate_port(params.port)?;
        if self.registry.contains(&params.session_id) {
            return Err(SshToolError::Duplicate(params.session_id));
        }
        if self.registry.len() >= self.config.security.max_sessions {
            return Err(SshToolError::LimitExceeded(format!(
                "session limit reached ({} sessions)",
                self.config.security.max_sessions
            )));
        }

        let transport = self
            .pool
            .acquire(
                &params.host,
                &params.username,
                &params.key_path,
                None,
                params.port,
            )
            .await?;

        let settings = SessionSettings {
            id: params.session_id.clone(),
            target: SessionTarget {
                host: params.host.clone(),
                username: params.username.clone(),
                port: params.port,
            },
            kind: params.kind,
            mode: params.mode,
            shell: params.shell,
            command_timeout: self.config.timeouts.command,
            session_timeout: params.session_timeout.unwrap_or(self.config.timeouts.session),
            keep_alive_interval: self.config.timeouts.keep_alive,
            buffer: self.config.buffers.clone(),
        };
        let session = PersistentSession::new(settings, transport, self.events_tx.clone())?;

        if let Err(e) = session.initialize().await {
            session.close().await;
            return Err(e);
        }

        if !self.registry.try_insert(session.clone()) {
            // A concurrent create with the same id won the race.
            session.close().await;
            return Err(SshToolError::Duplicate(params.session_id));
        }

        info!(
            "created {} session '{}' on {}",
            params.kind.as_str(),
            session.id(),
            session.target()
        );
        self.emit_audit(AuditEvent::SessionCreated {
            session_id: params.session_id,
            host: params.host,
            username: params.username,
            port: params.port,
            private_key_path: params.key_path,
            at: event_timestamp(),
        });

        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<PersistentSession>> {
        self.registry.get(session_id)
    }

    /// Deep-copied snapshots of every registered session, in insertion
    /// order.
    pub async fn list_sessions(&self) -> Vec<SessionSnapshot> {
        let mut snapshots = Vec::new();
        for session in self.registry.list() {
            snapshots.push(session.snapshot().await);
        }
        snapshots
    }

    /// Execute a command inside a registered session.
    pub async fn execute_in_session(
        &self,
        session_id: &str,
        command: &str,
        timeout: Option<Duration>,
        raw: Option<bool>,
    ) -> Result<CommandResult> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| SshToolError::NotFound(session_id.to_string()))?;
        self.policy.check(command)?;

        let target = session.target().clone();
        self.emit_audit(AuditEvent::CommandDispatched {
            session_id: Some(session_id.to_string()),
            host: target.host.clone(),
            username: target.username.clone(),
            command: Some(command.to_string()),
            at: event_timestamp(),
        });

        let outcome = session.execute_command(command, timeout, raw).await;

        self.emit_audit(AuditEvent::CommandCompleted {
            session_id: Some(session_id.to_string()),
            host: target.host,
            username: target.username,
            command: Some(command.to_string()),
            exit_code: outcome.as_ref().ok().and_then(|r| r.exit_code),
            stdout: outcome.as_ref().ok().map(|r| r.stdout.clone()),
            stderr: outcome.as_ref().ok().map(|r| r.stderr.clone()),
            error: outcome.as_ref().err().map(|e| e.to_string()),
            at: event_timestamp(),
        });

        outcome
    }

    /// Copy out a session's buffered background output.
    pub async fn get_session_output(
        &self,
        session_id: &str,
        lines: Option<usize>,
        clear: bool,
    ) -> Result<Vec<String>> {
        let session = self
            .registry
            .get(session_id)
            .ok_or_else(|| SshToolError::NotFound(session_id.to_string()))?;
        session.buffered_output(lines, clear).await
    }

    /// Close one session with a bounded wait. Returns whether the session
    /// existed at call time.
    pub async fn close_session(&self, session_id: &str) -> bool {
        let Some(session) = self.registry.get(session_id) else {
            return false;
        };
        let mut status = session.status();
        session.close().await;
        let waited = tokio::time::timeout(
            self.config.timeouts.force_close,
            status.wait_for(|s| *s == SessionStatus::Closed),
        )
        .await;
        if waited.is_err() {
            warn!("session '{}' did not confirm close in time", session_id);
        }
        self.registry.remove(session_id);
        debug!("session '{}' closed and removed", session_id);
        true
    }

    /// Close every session (bounded wait per session), then tear down the
    /// pool. Both the registry and the pool end up empty regardless of
    /// stragglers.
    pub async fn close_all(&self) {
        let sessions = self.registry.list();
        info!("closing {} sessions", sessions.len());
        let close_timeout = self.config.timeouts.session_close;
        join_all(sessions.iter().map(|session| async move {
            let mut status = session.status();
            session.close().await;
            let _ = tokio::time::timeout(
                close_timeout,
                status.wait_for(|s| *s == SessionStatus::Closed),
            )
            .await;
        }))
        .await;
        for session in sessions {
            self.registry.remove(session.id());
        }
        for leftover in self.registry.list() {
            self.registry.remove(leftover.id());
        }
        self.pool.disconnect_all().await;
    }

    /// Number of pooled transports.
    pub async fn connection_count(&self) -> usize {
        self.pool.count().await
    }

    fn emit_audit(&self, event: AuditEvent) {
        if let Some(tx) = &self.audit_tx {
            let _ = tx.send(self.sanitizer.sanitize(event));
        }
    }
}

/// Run one command over a fresh exec channel and collect the outcome.
async fn exec_once(
    transport: &super::pool::Transport,
    command: &str,
    timeout: Duration,
) -> Result<CommandResult> {
    let mut channel = transport.open_channel().await?;
    channel
        .exec(true, command)
        .await
        .map_err(|e| SshToolError::StreamError(format!("failed to start command: {e}")))?;

    let mut stdout = Vec::with_capacity(4096);
    let mut stderr = Vec::with_capacity(1024);
    let mut exit_code: Option<i32> = None;
    let mut signal: Option<String> = None;

    let collected = tokio::time::timeout(timeout, async {
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => stdout.extend_from_slice(&data),
                Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                    stderr.extend_from_slice(&data)
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    exit_code = Some(exit_status as i32)
                }
                Some(ChannelMsg::ExitSignal { signal_name, .. }) => {
                    signal = Some(format!("{signal_name:?}"))
                }
                Some(ChannelMsg::Eof) => {
                    if exit_code.is_some() || signal.is_some() {
                        break;
                    }
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
    })
    .await;

    // Close gracefully either way so the transport stays usable.
    let _ = channel.close().await;

    if collected.is_err() {
        return Err(SshToolError::CommandTimeout { timeout });
    }

    // A delivering signal means there is no meaningful exit code.
    if signal.is_some() {
        exit_code = None;
    }

    Ok(CommandResult {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
        signal,
    })
}

fn spawn_event_loop(
    registry: Arc<DashMapSessionRegistry>,
    mut events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    sanitizer: Arc<Sanitizer>,
    audit_tx: Option<mpsc::UnboundedSender<AuditEvent>>,
) {
    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            // Removal is idempotent: an explicit close may already have
            // taken the entry out.
            if registry.remove(&event.session_id).is_some() {
                debug!(
                    "session '{}' removed from registry by lifecycle event",
                    event.session_id
                );
            }
            if let Some(tx) = &audit_tx {
                let _ = tx.send(sanitizer.sanitize(AuditEvent::from(event)));
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::config::SecurityConfig;

    fn manager() -> SessionManager {
        SessionManager::new(EngineConfig::default()).unwrap()
    }

    fn manager_with_policy(allowed: &[&str], blocked: &[&str]) -> SessionManager {
        let mut config = EngineConfig::default();
        config.security = SecurityConfig {
            allowed_commands: allowed.iter().map(|s| s.to_string()).collect(),
            blocked_commands: blocked.iter().map(|s| s.to_string()).collect(),
            max_sessions: 10,
            max_connections: 5,
        };
        SessionManager::new(config).unwrap()
    }

    fn create_params(id: &str, port: u16) -> CreateSessionParams {
        CreateSessionParams {
            session_id: id.to_string(),
            host: "db01".into(),
            username: "ops".into(),
            key_path: "/nonexistent/id_ed25519".into(),
            kind: SessionKind::Interactive,
            port,
            mode: SessionMode::Normal,
            shell: ShellKind::Bash,
            session_timeout: None,
        }
    }

    mod construction {
        use super::*;

        #[tokio::test]
        async fn test_default_config_builds() {
            let m = manager();
            assert_eq!(m.connection_count().await, 0);
            assert!(m.list_sessions().await.is_empty());
        }

        #[tokio::test]
        async fn test_invalid_policy_pattern_rejected() {
            let mut config = EngineConfig::default();
            config.security.blocked_commands = vec!["([broken".into()];
            assert!(matches!(
                SessionManager::new(config),
                Err(SshToolError::InvalidArgument(_))
            ));
        }

        #[tokio::test]
        async fn test_invalid_config_bounds_rejected() {
            let mut config = EngineConfig::default();
            config.security.max_sessions = 0;
            assert!(SessionManager::new(config).is_err());
        }
    }

    mod lookups {
        use super::*;

        #[tokio::test]
        async fn test_get_session_missing_is_none() {
            assert!(manager().get_session("missing").is_none());
        }

        #[tokio::test]
        async fn test_execute_in_missing_session_is_not_found() {
            let err = manager()
                .execute_in_session("missing", "uptime", None, None)
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::NotFound(_)));
        }

        #[tokio::test]
        async fn test_output_of_missing_session_is_not_found() {
            let err = manager()
                .get_session_output("missing", None, false)
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::NotFound(_)));
        }

        #[tokio::test]
        async fn test_close_missing_session_returns_false() {
            assert!(!manager().close_session("missing").await);
        }
    }

    mod validation {
        use super::*;

        #[tokio::test]
        async fn test_create_session_port_zero_rejected_before_dialing() {
            let err = manager().create_session(create_params("s1", 0)).await.unwrap_err();
            assert!(matches!(err, SshToolError::InvalidArgument(_)));
        }

        #[tokio::test]
        async fn test_create_session_empty_id_rejected() {
            let err = manager()
                .create_session(create_params("  ", 22))
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::InvalidArgument(_)));
        }

        #[tokio::test]
        async fn test_create_session_missing_key_is_key_unavailable() {
            let err = manager()
                .create_session(create_params("s1", 22))
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::KeyUnavailable { .. }));
        }

        #[tokio::test]
        async fn test_one_shot_empty_command_rejected() {
            let err = manager()
                .execute_command("db01", "ops", "/keys/id", "  ", 22, None)
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::InvalidArgument(_)));
        }

        #[tokio::test]
        async fn test_one_shot_zero_timeout_rejected() {
            let err = manager()
                .execute_command(
                    "db01",
                    "ops",
                    "/keys/id",
                    "uptime",
                    22,
                    Some(Duration::ZERO),
                )
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::InvalidArgument(_)));
        }
    }

    mod policy_application {
        use super::*;

        #[tokio::test]
        async fn test_blocked_command_denied_before_dialing() {
            let m = manager_with_policy(&[], &["^rm\\s"]);
            let err = m
                .execute_command("db01", "ops", "/keys/id", "rm -rf /", 22, None)
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::PolicyDenied(_)));
        }

        #[tokio::test]
        async fn test_unlisted_command_denied_when_allow_list_set() {
            let m = manager_with_policy(&["^ls"], &[]);
            let err = m
                .execute_command("db01", "ops", "/keys/id", "whoami", 22, None)
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::PolicyDenied(_)));
        }

        #[tokio::test]
        async fn test_allow_wins_over_block_then_fails_on_key() {
            // Policy passes (allow beats block); the next failure is the
            // missing key, proving the command was dispatched past policy.
            let m = manager_with_policy(&["^ls"], &["^ls"]);
            let err = m
                .execute_command("db01", "ops", "/nonexistent/key", "ls -la", 22, None)
                .await
                .unwrap_err();
            assert!(matches!(err, SshToolError::KeyUnavailable { .. }));
        }
    }
}
