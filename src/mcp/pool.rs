//! Keyed, reusable SSH transports.
//!
//! The pool amortizes handshake cost: every `(username, host, port)`
//! triple maps to at most one live transport, and sessions to the same
//! target share it, each opening their own channel. Transports are owned
//! exclusively by the pool; callers only ever receive channels derived
//! from them.
//!
//! # Concurrency
//!
//! Callers with different keys acquire concurrently. Callers with the same
//! key coalesce on a per-key guard so a burst of requests cannot race into
//! opening two transports to the same target. The cap is re-checked under
//! the entries lock at insert time, so the entry count never exceeds it.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use russh::{Disconnect, client, keys};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::auth::{AuthStrategy, KeyAuth};
use super::config::{validate_port, validate_timeout};
use super::error::{Result, SshToolError};

/// Identity of one reusable transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub username: String,
    pub host: String,
    pub port: u16,
}

impl std::fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Client handler that accepts all host keys, similar to
/// `StrictHostKeyChecking=no`. Production deployments should verify
/// against known_hosts instead.
pub struct ClientHandler;

impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &keys::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        Ok(true)
    }
}

/// One pooled, authenticated SSH connection.
///
/// The handle never leaves the pool; sessions receive channels opened on
/// it. `connected` flips to false the moment a disconnect is observed and
/// the entry is evicted on the next acquire for its key.
pub struct Transport {
    key: ConnectionKey,
    handle: client::Handle<ClientHandler>,
    connected: AtomicBool,
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("key", &self.key)
            .field("connected", &self.connected)
            .finish()
    }
}

impl Transport {
    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    /// Liveness as currently known: neither explicitly marked down nor
    /// observed closed by the protocol layer.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst) && !self.handle.is_closed()
    }

    pub fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Open a fresh channel on this transport. Used for both interactive
    /// shells and one-shot exec.
    pub async fn open_channel(&self) -> Result<russh::Channel<client::Msg>> {
        self.handle.channel_open_session().await.map_err(|e| {
            self.mark_disconnected();
            SshToolError::StreamError(format!("failed to open channel on {}: {e}", self.key))
        })
    }

    async fn disconnect(&self, deadline: Duration) {
        self.mark_disconnected();
        let farewell = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "English");
        if tokio::time::timeout(deadline, farewell).await.is_err() {
            warn!("disconnect of {} exceeded {:?}", self.key, deadline);
        }
    }
}

/// Knobs the pool needs from the engine configuration.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of simultaneously pooled transports.
    pub max_connections: usize,
    /// SSH handshake ready timeout.
    pub connect_timeout: Duration,
    /// Bounded wait for each transport during tear-down.
    pub force_close: Duration,
    /// Protocol-level keepalive period.
    pub keepalive_interval: Duration,
}

/// Keyed registry of live transports.
pub struct ConnectionPool {
    config: PoolConfig,
    entries: Mutex<HashMap<ConnectionKey, Arc<Transport>>>,
    connect_guards: Mutex<HashMap<ConnectionKey, Arc<Mutex<()>>>>,
}

impl ConnectionPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
            connect_guards: Mutex::new(HashMap::new()),
        }
    }

    /// Hand out a ready transport for the target, reusing a live one when
    /// present, otherwise opening a new connection subject to the cap.
    pub async fn acquire(
        &self,
        host: &str,
        username: &str,
        key_path: &str,
        passphrase: Option<&str>,
        port: u16,
    ) -> Result<Arc<Transport>> {
        let key = validated_key(host, username, key_path, port)?;

        // Same-key callers serialize here; distinct keys proceed.
        let guard = {
            let mut guards = self.connect_guards.lock().await;
            guards.entry(key.clone()).or_default().clone()
        };
        let _held = guard.lock().await;

        {
            let mut entries = self.entries.lock().await;
            if let Some(existing) = entries.get(&key) {
                if existing.is_connected() {
                    debug!("reusing pooled transport for {}", key);
                    return Ok(existing.clone());
                }
                info!("evicting dead transport for {}", key);
                entries.remove(&key);
            }
            if entries.len() >= self.config.max_connections {
                return Err(SshToolError::LimitExceeded(format!(
                    "connection pool is full ({} transports)",
                    self.config.max_connections
                )));
            }
        }

        let transport = self.connect(&key, key_path, passphrase).await?;

        let mut entries = self.entries.lock().await;
        if entries.len() >= self.config.max_connections {
            // Another key won the last slot while we were handshaking.
            transport.disconnect(self.config.force_close).await;
            return Err(SshToolError::LimitExceeded(format!(
                "connection pool is full ({} transports)",
                self.config.max_connections
            )));
        }
        entries.insert(key, transport.clone());
        Ok(transport)
    }

    async fn connect(
        &self,
        key: &ConnectionKey,
        key_path: &str,
        passphrase: Option<&str>,
    ) -> Result<Arc<Transport>> {
        // Key file problems surface before any network traffic.
        let auth = KeyAuth::load(key_path, passphrase)?;

        let config = Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(self.config.keepalive_interval),
            keepalive_max: 3,
            ..Default::default()
        });

        info!("opening SSH transport to {}", key);
        let connect_future = client::connect(
            config,
            (key.host.as_str(), key.port),
            ClientHandler,
        );
        let mut handle = tokio::time::timeout(self.config.connect_timeout, connect_future)
            .await
            .map_err(|_| SshToolError::ConnectionTimeout {
                target: key.to_string(),
                timeout: self.config.connect_timeout,
            })?
            .map_err(|e| SshToolError::ConnectionFailed {
                target: key.to_string(),
                cause: e.to_string(),
            })?;

        let authenticated = auth.authenticate(&mut handle, &key.username).await?;
        if !authenticated {
            return Err(SshToolError::ConnectionFailed {
                target: key.to_string(),
                cause: format!("{} authentication rejected by server", auth.name()),
            });
        }

        Ok(Arc::new(Transport {
            key: key.clone(),
            handle,
            connected: AtomicBool::new(true),
        }))
    }

    /// Close every transport, each bounded by the force-close deadline,
    /// and clear the registry unconditionally.
    pub async fn disconnect_all(&self) {
        let drained: Vec<Arc<Transport>> = {
            let mut entries = self.entries.lock().await;
            entries.drain().map(|(_, t)| t).collect()
        };
        info!("disconnecting {} pooled transports", drained.len());
        for transport in drained {
            transport.disconnect(self.config.force_close).await;
        }
        self.connect_guards.lock().await.clear();
    }

    /// Number of pooled entries, live or pending eviction.
    pub async fn count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

fn validated_key(host: &str, username: &str, key_path: &str, port: u16) -> Result<ConnectionKey> {
    if host.trim().is_empty() {
        return Err(SshToolError::InvalidArgument("host must not be empty".into()));
    }
    if username.trim().is_empty() {
        return Err(SshToolError::InvalidArgument(
            "username must not be empty".into(),
        ));
    }
    if key_path.trim().is_empty() {
        return Err(SshToolError::InvalidArgument(
            "private key path must not be empty".into(),
        ));
    }
    validate_port(port)?;
    Ok(ConnectionKey {
        username: username.to_string(),
        host: host.to_string(),
        port,
    })
}

/// Build a pool configuration from engine timeouts and caps, re-checking
/// bounds so the pool stays safe as a library entry point.
pub fn pool_config(
    max_connections: usize,
    connect_timeout: Duration,
    force_close: Duration,
    keepalive_interval: Duration,
) -> Result<PoolConfig> {
    if max_connections == 0 {
        return Err(SshToolError::InvalidArgument(
            "max connections must be at least 1".into(),
        ));
    }
    validate_timeout("connect timeout", connect_timeout)?;
    Ok(PoolConfig {
        max_connections,
        connect_timeout,
        force_close,
        keepalive_interval,
    })
}
