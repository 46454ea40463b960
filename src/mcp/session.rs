//! Persistent interactive shell sessions.
//!
//! A `PersistentSession` owns exactly one `shell` channel on a pooled
//! transport and linearizes command execution over it: commands queue in
//! FIFO order, at most one is in flight, and its output is recovered by
//! delimiter framing (or accumulated verbatim in raw mode). Background
//! sessions additionally capture every inbound chunk in a bounded buffer.
//!
//! # Task model
//!
//! Each session runs three tasks, all torn down by one cancellation token:
//!
//! - the reader, sole consumer of the channel's inbound messages,
//! - the keep-alive ticker, which writes a shell no-op only while the
//!   session is idle (never while a command is in flight),
//! - the inactivity watch, which closes the session after the configured
//!   quiet period.
//!
//! The session state lock is the linearization point: dispatch and
//! keep-alive both hold it while writing, so their writes cannot
//! interleave on the channel.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use russh::{ChannelMsg, ChannelReadHalf, ChannelWriteHalf, client};
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::buffer::BoundedBuffer;
use super::config::{BufferConfig, validate_port, validate_timeout};
use super::error::{Result, SshToolError};
use super::events::SessionEvent;
use super::framing::CommandFramer;
use super::pool::Transport;
use super::shell_format::ShellKind;
use super::types::{CommandResult, SessionKind, SessionMode, SessionSnapshot, SessionTarget};

/// Delay after opening the shell before the session reports ready, letting
/// the remote flush its banner and prompt.
const SHELL_SETTLE: Duration = Duration::from_millis(500);

/// Lifecycle stage observable through the status watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Created,
    Active,
    Closed,
}

/// Per-session knobs, derived from the engine configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub id: String,
    pub target: SessionTarget,
    pub kind: SessionKind,
    pub mode: SessionMode,
    pub shell: ShellKind,
    pub command_timeout: Duration,
    pub session_timeout: Duration,
    pub keep_alive_interval: Duration,
    pub buffer: BufferConfig,
}

/// Caller-installed predicate consulted before any command is enqueued.
pub type CommandFilter = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Write handle for the shell channel, kept separate from the read half so
/// the reader task never contends with writers.
pub struct ChannelWriter {
    write_half: ChannelWriteHalf<client::Msg>,
}

impl ChannelWriter {
    pub fn new(write_half: ChannelWriteHalf<client::Msg>) -> Self {
        Self { write_half }
    }

    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.write_half
            .data(data)
            .await
            .map_err(|e| SshToolError::StreamError(format!("failed to write to shell: {e}")))
    }

    pub async fn close(&self) -> Result<()> {
        self.write_half
            .close()
            .await
            .map_err(|e| SshToolError::StreamError(format!("failed to close shell channel: {e}")))
    }
}

/// How a dispatched command's inbound bytes are interpreted.
enum Capture {
    /// Verbatim accumulation; the per-command timer decides completion.
    Raw { accumulated: String },
    /// Delimiter framing; the end marker decides completion.
    Framed(CommandFramer),
}

/// A queued request, not yet dispatched to the channel.
struct QueuedCommand {
    id: String,
    command: String,
    raw: bool,
    timeout: Duration,
    responder: Option<oneshot::Sender<Result<CommandResult>>>,
}

/// The single in-flight command.
struct InFlight {
    id: String,
    timeout: Duration,
    capture: Capture,
    responder: Option<oneshot::Sender<Result<CommandResult>>>,
}

struct SessionState {
    initialized: bool,
    shut_down: bool,
    is_active: bool,
    last_activity: DateTime<Utc>,
    command_history: Vec<String>,
    // Reserved in the model; the engine never populates or consults them.
    environment_vars: HashMap<String, String>,
    working_directory: String,
    buffer: BoundedBuffer,
    queue: VecDeque<QueuedCommand>,
    current: Option<InFlight>,
}

enum ShutdownReason {
    Requested,
    ChannelClosed,
    TimedOut,
    Error(String),
}

/// A long-lived wrapper around one shell channel.
pub struct PersistentSession {
    id: String,
    target: SessionTarget,
    kind: SessionKind,
    mode: SessionMode,
    shell: ShellKind,
    command_timeout: Duration,
    session_timeout: Duration,
    keep_alive_interval: Duration,
    delimiter_stem: String,
    created_at: DateTime<Utc>,
    transport: Arc<Transport>,
    state: Mutex<SessionState>,
    writer: Mutex<Option<ChannelWriter>>,
    command_filter: StdMutex<Option<CommandFilter>>,
    cancel: CancellationToken,
    activity_tx: watch::Sender<tokio::time::Instant>,
    activity_rx: watch::Receiver<tokio::time::Instant>,
    status_tx: watch::Sender<SessionStatus>,
    status_rx: watch::Receiver<SessionStatus>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl std::fmt::Debug for PersistentSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentSession")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("mode", &self.mode)
            .finish()
    }
}

impl PersistentSession {
    pub fn new(
        settings: SessionSettings,
        transport: Arc<Transport>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Arc<Self>> {
        validate_settings(&settings)?;
        let now = Utc::now();
        let (activity_tx, activity_rx) = watch::channel(tokio::time::Instant::now());
        let (status_tx, status_rx) = watch::channel(SessionStatus::Created);
        Ok(Arc::new(Self {
            id: settings.id,
            target: settings.target,
            kind: settings.kind,
            mode: settings.mode,
            shell: settings.shell,
            command_timeout: settings.command_timeout,
            session_timeout: settings.session_timeout,
            keep_alive_interval: settings.keep_alive_interval,
            delimiter_stem: delimiter_stem(),
            created_at: now,
            transport,
            state: Mutex::new(SessionState {
                initialized: false,
                shut_down: false,
                is_active: false,
                last_activity: now,
                command_history: Vec::new(),
                environment_vars: HashMap::new(),
                working_directory: String::new(),
                buffer: BoundedBuffer::new(settings.buffer.max_size, settings.buffer.trim_to),
                queue: VecDeque::new(),
                current: None,
            }),
            writer: Mutex::new(None),
            command_filter: StdMutex::new(None),
            cancel: CancellationToken::new(),
            activity_tx,
            activity_rx,
            status_tx,
            status_rx,
            events,
        }))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn target(&self) -> &SessionTarget {
        &self.target
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Observe lifecycle transitions; used by the manager for bounded
    /// close waits.
    pub fn status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Install a predicate consulted before each command is enqueued. A
    /// rejecting predicate fails the call without touching the channel or
    /// the history.
    pub fn set_command_filter(&self, filter: CommandFilter) {
        if let Ok(mut slot) = self.command_filter.lock() {
            *slot = Some(filter);
        }
    }

    /// Open the shell channel, start the session tasks, and report ready
    /// after the settle delay. Calling twice is a no-op.
    pub async fn initialize(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock().await;
            if state.initialized {
                return Ok(());
            }
            state.initialized = true;
        }

        let mut channel = self
            .transport
            .open_channel()
            .await
            .map_err(|e| SshToolError::ShellFailure(e.to_string()))?;
        channel
            .request_shell(true)
            .await
            .map_err(|e| SshToolError::ShellFailure(e.to_string()))?;
        let (read_half, write_half) = channel.split();

        *self.writer.lock().await = Some(ChannelWriter::new(write_half));
        {
            let mut state = self.state.lock().await;
            state.is_active = true;
        }
        let _ = self.status_tx.send(SessionStatus::Active);

        tokio::spawn(Self::run_reader(self.clone(), read_half));
        tokio::spawn(Self::run_keep_alive(self.clone()));
        tokio::spawn(Self::run_inactivity_watch(self.clone()));

        tokio::time::sleep(SHELL_SETTLE).await;
        info!("session '{}' ready on {}", self.id, self.target);
        Ok(())
    }

    /// Submit a command.
    ///
    /// Interactive sessions suspend the caller until the framed result,
    /// the per-command timeout, or session termination. Background
    /// sessions return a synthetic acknowledgment immediately; the real
    /// output lands in the buffer. Raw dispatch (session mode or explicit
    /// override) resolves on timer expiry with the bytes accumulated so
    /// far and an exit code of 0, since the true code is unknowable.
    pub async fn execute_command(
        self: &Arc<Self>,
        command: &str,
        timeout: Option<Duration>,
        raw_override: Option<bool>,
    ) -> Result<CommandResult> {
        if command.trim().is_empty() {
            return Err(SshToolError::InvalidArgument(
                "command must not be empty".into(),
            ));
        }
        let timeout = timeout.unwrap_or(self.command_timeout);
        validate_timeout("command timeout", timeout)?;

        let filter = self
            .command_filter
            .lock()
            .ok()
            .and_then(|slot| (*slot).clone());
        if let Some(filter) = filter
            && !filter(command)
        {
            return Err(SshToolError::PolicyDenied(format!(
                "command rejected by session filter: {command}"
            )));
        }

        let raw = raw_override.unwrap_or(false) || self.mode == SessionMode::Raw;
        let id = Uuid::new_v4().simple().to_string();

        let mut state = self.state.lock().await;
        if !state.is_active {
            return Err(SshToolError::SessionInactive(self.id.clone()));
        }
        state.command_history.push(command.to_string());
        state.last_activity = Utc::now();
        let _ = self.activity_tx.send(tokio::time::Instant::now());

        match self.kind {
            SessionKind::Background => {
                state.queue.push_back(QueuedCommand {
                    id,
                    command: command.to_string(),
                    raw,
                    timeout,
                    responder: None,
                });
                self.pump(&mut state).await;
                Ok(CommandResult {
                    stdout: format!(
                        "Command '{command}' queued in background session '{}'",
                        self.id
                    ),
                    stderr: String::new(),
                    exit_code: Some(0),
                    signal: None,
                })
            }
            SessionKind::Interactive => {
                let (tx, rx) = oneshot::channel();
                state.queue.push_back(QueuedCommand {
                    id,
                    command: command.to_string(),
                    raw,
                    timeout,
                    responder: Some(tx),
                });
                self.pump(&mut state).await;
                drop(state);
                match rx.await {
                    Ok(outcome) => outcome,
                    // The sender only drops unresolved if the session dies
                    // without draining, which close() prevents; report the
                    // session as gone either way.
                    Err(_) => Err(SshToolError::SessionInactive(self.id.clone())),
                }
            }
        }
    }

    /// Copy out buffered background output. `clear` truncates after the
    /// copy.
    pub async fn buffered_output(&self, lines: Option<usize>, clear: bool) -> Result<Vec<String>> {
        let mut state = self.state.lock().await;
        let copied = state.buffer.tail(lines)?;
        if clear {
            state.buffer.clear();
        }
        Ok(copied)
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.is_active
    }

    /// Deep-copied snapshot of the session's state.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.lock().await;
        SessionSnapshot {
            session_id: self.id.clone(),
            host: self.target.host.clone(),
            username: self.target.username.clone(),
            port: self.target.port,
            kind: self.kind,
            mode: self.mode,
            shell: self.shell,
            created_at: self.created_at.to_rfc3339(),
            last_activity: state.last_activity.to_rfc3339(),
            is_active: state.is_active,
            command_history: state.command_history.clone(),
            environment_vars: state.environment_vars.clone(),
            working_directory: state.working_directory.clone(),
        }
    }

    /// Stop the session: cancel the timers, fail everything pending, end
    /// the channel, and notify the manager. Idempotent.
    pub async fn close(&self) {
        self.shutdown(ShutdownReason::Requested).await;
    }

    async fn shutdown(&self, reason: ShutdownReason) {
        {
            let mut state = self.state.lock().await;
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.is_active = false;
            if let Some(inflight) = state.current.take()
                && let Some(tx) = inflight.responder
            {
                let _ = tx.send(Err(SshToolError::SessionInactive(self.id.clone())));
            }
            for queued in state.queue.drain(..) {
                if let Some(tx) = queued.responder {
                    let _ = tx.send(Err(SshToolError::SessionInactive(self.id.clone())));
                }
            }
        }

        self.cancel.cancel();
        if let Some(writer) = self.writer.lock().await.take() {
            let _ = writer.close().await;
        }

        match reason {
            ShutdownReason::Requested => debug!("session '{}' closed on request", self.id),
            ShutdownReason::ChannelClosed => {
                debug!("session '{}' channel closed by peer", self.id)
            }
            ShutdownReason::TimedOut => {
                let _ = self.events.send(SessionEvent::timed_out(&self.id));
            }
            ShutdownReason::Error(message) => {
                warn!("session '{}' failed: {}", self.id, message);
                let _ = self.events.send(SessionEvent::error(&self.id, message));
            }
        }
        let _ = self.events.send(SessionEvent::closed(&self.id));
        let _ = self.status_tx.send(SessionStatus::Closed);
    }

    /// Dispatch queued commands until one is in flight or the queue is
    /// empty. Requests that fail to dispatch are resolved with the error
    /// and the next request is tried.
    async fn pump(self: &Arc<Self>, state: &mut SessionState) {
        while state.current.is_none() {
            let Some(request) = state.queue.pop_front() else {
                return;
            };
            if self.dispatch(state, request).await {
                return;
            }
        }
    }

    /// Write one request to the channel and promote it to in-flight.
    /// Returns false when the request was resolved with an error instead.
    ///
    /// Returns a boxed future (rather than `async fn`) to break the
    /// `dispatch` -> spawned timer -> `expire_command` -> `pump` ->
    /// `dispatch` opaque-type cycle that otherwise defeats the compiler's
    /// auto-trait (`Send`) inference for recursive async functions.
    fn dispatch<'a>(
        self: &'a Arc<Self>,
        state: &'a mut SessionState,
        request: QueuedCommand,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = bool> + Send + 'a>> {
        Box::pin(async move {
        let QueuedCommand {
            id,
            command,
            raw,
            timeout,
            responder,
        } = request;

        let (wire, capture) = if raw {
            (
                format!("{command}\n"),
                Capture::Raw {
                    accumulated: String::new(),
                },
            )
        } else {
            let (start, end) = command_markers(&self.delimiter_stem, &id);
            let wrapped = match self.shell.wrap_command(&command, &start, &end) {
                Ok(wrapped) => wrapped,
                Err(e) => {
                    if let Some(tx) = responder {
                        let _ = tx.send(Err(e));
                    }
                    return false;
                }
            };
            let framer = match CommandFramer::new(self.shell, &start, &end) {
                Ok(framer) => framer,
                Err(e) => {
                    if let Some(tx) = responder {
                        let _ = tx.send(Err(e));
                    }
                    return false;
                }
            };
            (format!("{wrapped}\n"), Capture::Framed(framer))
        };

        let write_result = {
            let writer = self.writer.lock().await;
            match writer.as_ref() {
                Some(writer) => writer.write(wire.as_bytes()).await,
                None => Err(SshToolError::SessionInactive(self.id.clone())),
            }
        };
        if let Err(e) = write_result {
            let cause = e.to_string();
            warn!("session '{}' dispatch failed: {}", self.id, cause);
            if let Some(tx) = responder {
                let _ = tx.send(Err(e));
            }
            // The channel is unusable; tear the session down once the
            // state lock is released.
            let session = self.clone();
            tokio::spawn(async move {
                session.shutdown(ShutdownReason::Error(cause)).await;
            });
            return false;
        }

        debug!("session '{}' dispatched command {}", self.id, id);
        state.current = Some(InFlight {
            id: id.clone(),
            timeout,
            capture,
            responder,
        });

        // The per-command timer is armed at dispatch, not at enqueue.
        let session = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = session.cancel.cancelled() => {}
                _ = tokio::time::sleep(timeout) => session.expire_command(id).await,
            }
        });
        true
        })
    }

    /// Per-command timer expiry. A stale timer whose command already
    /// completed finds a different (or no) in-flight id and does nothing.
    async fn expire_command(self: &Arc<Self>, command_id: String) {
        let mut state = self.state.lock().await;
        let expired = match state.current.take() {
            Some(inflight) if inflight.id == command_id => inflight,
            other => {
                state.current = other;
                return;
            }
        };
        let InFlight {
            timeout,
            capture,
            responder,
            ..
        } = expired;
        let outcome = match capture {
            // Raw completion is timer-based and the exit code unknowable.
            Capture::Raw { accumulated } => Ok(CommandResult {
                stdout: accumulated,
                stderr: String::new(),
                exit_code: Some(0),
                signal: None,
            }),
            Capture::Framed(_) => {
                warn!(
                    "session '{}' command {} timed out after {:?}",
                    self.id, command_id, timeout
                );
                Err(SshToolError::CommandTimeout { timeout })
            }
        };
        if let Some(tx) = responder {
            let _ = tx.send(outcome);
        }
        self.pump(&mut state).await;
    }

    /// Sole consumer of the channel's inbound stream.
    async fn run_reader(session: Arc<Self>, mut read_half: ChannelReadHalf) {
        loop {
            tokio::select! {
                _ = session.cancel.cancelled() => break,
                msg = read_half.wait() => match msg {
                    Some(ChannelMsg::Data { data }) => session.consume_chunk(&data).await,
                    // Extended stream 1 is stderr; it is folded into the
                    // same accumulator as stdout.
                    Some(ChannelMsg::ExtendedData { data, ext }) if ext == 1 => {
                        session.consume_chunk(&data).await
                    }
                    Some(ChannelMsg::Close) | None => {
                        session.shutdown(ShutdownReason::ChannelClosed).await;
                        break;
                    }
                    Some(_) => {}
                }
            }
        }
    }

    async fn consume_chunk(self: &Arc<Self>, bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes).into_owned();
        let mut state = self.state.lock().await;

        if self.kind == SessionKind::Background {
            state.buffer.push(text.clone());
        }

        let completed = match state.current.as_mut() {
            Some(inflight) => match &mut inflight.capture {
                Capture::Raw { accumulated } => {
                    accumulated.push_str(&text);
                    None
                }
                Capture::Framed(framer) => framer.feed(&text),
            },
            None => None,
        };

        if let Some(framed) = completed
            && let Some(inflight) = state.current.take()
        {
            debug!(
                "session '{}' command {} completed with exit code {}",
                self.id, inflight.id, framed.exit_code
            );
            if let Some(tx) = inflight.responder {
                let _ = tx.send(Ok(CommandResult {
                    stdout: framed.stdout,
                    stderr: String::new(),
                    exit_code: Some(framed.exit_code),
                    signal: None,
                }));
            }
            self.pump(&mut state).await;
        }
    }

    /// Idle keep-alive writer. Holding the state lock across the write
    /// keeps it from ever interleaving with a dispatched command.
    async fn run_keep_alive(session: Arc<Self>) {
        let mut ticker = tokio::time::interval(session.keep_alive_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = session.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let state = session.state.lock().await;
                    if !state.is_active || !state.queue.is_empty() || state.current.is_some() {
                        continue;
                    }
                    let writer = session.writer.lock().await;
                    if let Some(writer) = writer.as_ref()
                        && let Err(e) = writer.write(session.shell.keep_alive().as_bytes()).await
                    {
                        warn!("session '{}' keep-alive write failed: {}", session.id, e);
                    }
                }
            }
        }
    }

    /// Closes the session after the configured quiet period with no
    /// command submissions.
    async fn run_inactivity_watch(session: Arc<Self>) {
        let mut activity = session.activity_rx.clone();
        loop {
            let deadline = *activity.borrow() + session.session_timeout;
            tokio::select! {
                _ = session.cancel.cancelled() => return,
                changed = activity.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    info!(
                        "session '{}' idle for {:?}, closing",
                        session.id, session.session_timeout
                    );
                    session.shutdown(ShutdownReason::TimedOut).await;
                    return;
                }
            }
        }
    }
}

/// Marker pair bracketing one command's output.
fn command_markers(stem: &str, command_id: &str) -> (String, String) {
    (
        format!("{stem}_START_{command_id}"),
        format!("{stem}_END_{command_id}"),
    )
}

/// Per-session random delimiter stem. The random tail makes it
/// impractical for user output to synthesize a marker collision.
fn delimiter_stem() -> String {
    format!("__SSH_MCP_{}", Uuid::new_v4().simple())
}

fn validate_settings(settings: &SessionSettings) -> Result<()> {
    if settings.id.trim().is_empty() {
        return Err(SshToolError::InvalidArgument(
            "session id must not be empty".into(),
        ));
    }
    if settings.target.host.trim().is_empty() {
        return Err(SshToolError::InvalidArgument("host must not be empty".into()));
    }
    if settings.target.username.trim().is_empty() {
        return Err(SshToolError::InvalidArgument(
            "username must not be empty".into(),
        ));
    }
    validate_port(settings.target.port)?;
    validate_timeout("command timeout", settings.command_timeout)?;
    validate_timeout("session timeout", settings.session_timeout)?;
    validate_timeout("keep-alive interval", settings.keep_alive_interval)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(id: &str, port: u16) -> SessionSettings {
        SessionSettings {
            id: id.to_string(),
            target: SessionTarget {
                host: "db01".into(),
                username: "ops".into(),
                port,
            },
            kind: SessionKind::Interactive,
            mode: SessionMode::Normal,
            shell: ShellKind::Bash,
            command_timeout: Duration::from_secs(30),
            session_timeout: Duration::from_secs(600),
            keep_alive_interval: Duration::from_secs(30),
            buffer: BufferConfig::default(),
        }
    }

    mod settings_validation {
        use super::*;

        #[test]
        fn test_valid_settings_pass() {
            assert!(validate_settings(&settings("s1", 22)).is_ok());
        }

        #[test]
        fn test_empty_id_rejected() {
            assert!(matches!(
                validate_settings(&settings("  ", 22)),
                Err(SshToolError::InvalidArgument(_))
            ));
        }

        #[test]
        fn test_port_zero_rejected() {
            assert!(validate_settings(&settings("s1", 0)).is_err());
        }

        #[test]
        fn test_zero_command_timeout_rejected() {
            let mut s = settings("s1", 22);
            s.command_timeout = Duration::ZERO;
            assert!(validate_settings(&s).is_err());
        }

        #[test]
        fn test_oversized_session_timeout_rejected() {
            let mut s = settings("s1", 22);
            s.session_timeout = Duration::from_secs(2 * 3600);
            assert!(validate_settings(&s).is_err());
        }
    }

    mod delimiters {
        use super::*;

        #[test]
        fn test_stem_has_long_random_tail() {
            let stem = delimiter_stem();
            let tail = stem.strip_prefix("__SSH_MCP_").expect("stem prefix");
            assert!(tail.len() >= 9);
        }

        #[test]
        fn test_stems_are_unique_per_session() {
            assert_ne!(delimiter_stem(), delimiter_stem());
        }

        #[test]
        fn test_marker_pair_embeds_command_id() {
            let (start, end) = command_markers("STEM", "cmd42");
            assert_eq!(start, "STEM_START_cmd42");
            assert_eq!(end, "STEM_END_cmd42");
            assert_ne!(start, end);
        }

        #[test]
        fn test_markers_survive_wrap_and_extract() {
            let stem = delimiter_stem();
            let (start, end) = command_markers(&stem, "c1");
            let wrapped = ShellKind::Bash.wrap_command("true", &start, &end).unwrap();
            assert!(wrapped.contains(&start));
            assert!(wrapped.contains(&end));

            let injected = format!("{start}\n{end}:0\n");
            let mut framer = CommandFramer::new(ShellKind::Bash, &start, &end).unwrap();
            let framed = framer.feed(&injected).expect("frame completes");
            assert_eq!(framed.exit_code, 0);
            assert_eq!(framed.stdout, "");
        }
    }
}
