//! Key-based SSH authentication.
//!
//! Authentication is behind a small strategy trait so the pool never
//! hard-codes a credential source. The only shipped strategy loads a
//! private key file; the key is read eagerly at construction so a missing
//! or unreadable file fails before any network traffic.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use russh::{client, keys};
use tracing::debug;

use super::error::{Result, SshToolError};
use super::pool::ClientHandler;

/// Trait for SSH authentication strategies.
///
/// Implementations must be thread-safe (`Send + Sync`) for use across
/// async tasks.
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    /// Attempt to authenticate with the SSH server.
    ///
    /// Returns `Ok(true)` on success, `Ok(false)` when the server rejects
    /// the credential, `Err` on protocol-level failure.
    async fn authenticate(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        username: &str,
    ) -> Result<bool>;

    /// Strategy name, for logging.
    fn name(&self) -> &'static str;
}

/// Private key file authentication strategy.
#[derive(Debug)]
pub struct KeyAuth {
    key_path: PathBuf,
    key: keys::PrivateKey,
}

impl KeyAuth {
    /// Read and parse the private key. A missing, unreadable or malformed
    /// key surfaces as `KeyUnavailable` before any handshake starts.
    pub fn load(key_path: impl Into<PathBuf>, passphrase: Option<&str>) -> Result<Self> {
        let key_path = key_path.into();
        let key = keys::load_secret_key(Path::new(&key_path), passphrase).map_err(|e| {
            SshToolError::KeyUnavailable {
                path: key_path.display().to_string(),
                cause: e.to_string(),
            }
        })?;
        Ok(Self { key_path, key })
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }
}

#[async_trait]
impl AuthStrategy for KeyAuth {
    async fn authenticate(
        &self,
        handle: &mut client::Handle<ClientHandler>,
        username: &str,
    ) -> Result<bool> {
        // For RSA keys, use the best hash algorithm the server supports.
        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .ok()
            .flatten()
            .flatten();
        debug!("RSA hash algorithm for key auth: {:?}", hash_alg);

        let key_with_hash = keys::PrivateKeyWithHashAlg::new(Arc::new(self.key.clone()), hash_alg);

        let result = handle
            .authenticate_publickey(username, key_with_hash)
            .await
            .map_err(|e| SshToolError::ConnectionFailed {
                target: username.to_string(),
                cause: format!("key authentication failed: {e}"),
            })?;

        Ok(result.success())
    }

    fn name(&self) -> &'static str {
        "key"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_file_is_key_unavailable() {
        let err = KeyAuth::load("/nonexistent/path/id_ed25519", None).unwrap_err();
        match err {
            SshToolError::KeyUnavailable { path, .. } => {
                assert_eq!(path, "/nonexistent/path/id_ed25519");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_malformed_key_is_key_unavailable() {
        let dir = std::env::temp_dir();
        let path = dir.join("ssh-session-mcp-bad-key");
        std::fs::write(&path, "not a private key").unwrap();
        let err = KeyAuth::load(&path, None).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, SshToolError::KeyUnavailable { .. }));
    }
}
