//! Credential storage for the session's token pair
//!
//! `CredentialStore` is an opaque async key-value store. A missing key is
//! `None`, never an error, and a store that cannot be read behaves as an
//! empty one. Two implementations ship here:
//!
//! - `FileCredentialStore` keeps a JSON object on disk. All writes use
//!   atomic temp-file + rename, and a tokio Mutex serializes them.
//! - `MemoryCredentialStore` keeps everything in process.
//!
//! `SessionCredentials` layers the token-pair view on top: both tokens are
//! written with one `set_many` and removed with one `delete_many`, so a
//! reader never sees a new access token next to a stale refresh token.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;

use common::Secret;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};
use crate::error::{Error, Result};

/// The session's access/refresh token pair. Both values are redacted in
/// Debug output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: Secret::new(access.into()),
            refresh: Secret::new(refresh.into()),
        }
    }
}

/// Async key-value secret store.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn CredentialStore>`).
pub trait CredentialStore: Send + Sync {
    /// Read a value. Absent, empty, or unreadable entries are `None`.
    fn get<'a>(&'a self, key: &'a str)
    -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>>;

    /// Write a value, replacing any previous one.
    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Remove a value. Removing a missing key succeeds.
    fn delete<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;

    /// Write several values as one unit.
    ///
    /// The default writes them one at a time; stores that can do better
    /// should override it.
    fn set_many<'a>(
        &'a self,
        entries: &'a [(&'a str, &'a str)],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            for (key, value) in entries {
                self.set(key, value).await?;
            }
            Ok(())
        })
    }

    /// Remove several values as one unit.
    fn delete_many<'a>(
        &'a self,
        keys: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            for key in keys {
                self.delete(key).await?;
            }
            Ok(())
        })
    }
}

/// In-process store. Contents do not survive a restart.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    state: Mutex<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.get(key).filter(|v| !v.is_empty()).cloned()
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.state
                .lock()
                .await
                .insert(key.to_string(), value.to_string());
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.state.lock().await.remove(key);
            Ok(())
        })
    }

    fn set_many<'a>(
        &'a self,
        entries: &'a [(&'a str, &'a str)],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for (key, value) in entries {
                state.insert(key.to_string(), value.to_string());
            }
            Ok(())
        })
    }

    fn delete_many<'a>(
        &'a self,
        keys: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            for key in keys {
                state.remove(*key);
            }
            Ok(())
        })
    }
}

/// File-backed store holding a flat JSON object of string values.
///
/// The in-memory map is the source of truth while the process runs. Every
/// mutation is applied to a copy, persisted, and only then swapped in, so a
/// failed write leaves memory matching disk.
pub struct FileCredentialStore {
    path: PathBuf,
    state: Mutex<HashMap<String, String>>,
}

impl FileCredentialStore {
    /// Load the store from `path`.
    ///
    /// A missing file is created as `{}`. A file that cannot be read or
    /// parsed is logged and treated as empty; it is only overwritten by the
    /// next successful write.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => match serde_json::from_str::<HashMap<String, String>>(&contents) {
                Ok(entries) => {
                    info!(path = %path.display(), entries = entries.len(), "loaded credential store");
                    entries
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "credential file is corrupt, treating as empty");
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "credential file not found, starting with empty store");
                let empty = HashMap::new();
                write_atomic(&path, &empty).await?;
                empty
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "credential file unreadable, treating as empty");
                HashMap::new()
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn get<'a>(
        &'a self,
        key: &'a str,
    ) -> Pin<Box<dyn Future<Output = Option<String>> + Send + 'a>> {
        Box::pin(async move {
            let state = self.state.lock().await;
            state.get(key).filter(|v| !v.is_empty()).cloned()
        })
    }

    fn set<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            next.insert(key.to_string(), value.to_string());
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key, "stored credential");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            if !state.contains_key(key) {
                return Ok(());
            }
            let mut next = state.clone();
            next.remove(key);
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(key, "removed credential");
            Ok(())
        })
    }

    fn set_many<'a>(
        &'a self,
        entries: &'a [(&'a str, &'a str)],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            for (key, value) in entries {
                next.insert(key.to_string(), value.to_string());
            }
            write_atomic(&self.path, &next).await?;
            *state = next;
            debug!(entries = entries.len(), "stored credentials");
            Ok(())
        })
    }

    fn delete_many<'a>(
        &'a self,
        keys: &'a [&'a str],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            let mut next = state.clone();
            for key in keys {
                next.remove(*key);
            }
            let removed = state.len() - next.len();
            if removed > 0 {
                write_atomic(&self.path, &next).await?;
                *state = next;
                debug!(removed, "removed credentials");
            }
            Ok(())
        })
    }
}

/// Write the store to a file atomically.
///
/// Writes to a temporary file in the same directory, then renames it over
/// the target. Sets file permissions to 0600 (owner read/write only) since
/// the file contains session tokens.
async fn write_atomic(path: &Path, data: &HashMap<String, String>) -> Result<()> {
    let json = serde_json::to_string_pretty(data)
        .map_err(|e| Error::CredentialParse(format!("serializing credentials: {e}")))?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::Storage("credential path has no parent directory".into()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("credentials");

    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, json.as_bytes())
        .await
        .map_err(|e| Error::Storage(format!("writing temp credential file: {e}")))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        tokio::fs::set_permissions(&tmp_path, perms)
            .await
            .map_err(|e| Error::Storage(format!("setting credential file permissions: {e}")))?;
    }

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| Error::Storage(format!("renaming temp credential file: {e}")))?;

    debug!(path = %path.display(), "persisted credentials");
    Ok(())
}

/// Token-pair view over a shared `CredentialStore`.
#[derive(Clone)]
pub struct SessionCredentials {
    store: Arc<dyn CredentialStore>,
}

impl SessionCredentials {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// The current access token, if one is stored.
    pub async fn access_token(&self) -> Option<Secret<String>> {
        self.store.get(ACCESS_TOKEN_KEY).await.map(Secret::new)
    }

    /// The current refresh token, if one is stored.
    pub async fn refresh_token(&self) -> Option<Secret<String>> {
        self.store.get(REFRESH_TOKEN_KEY).await.map(Secret::new)
    }

    /// Both tokens, or `None` unless both are present.
    pub async fn load(&self) -> Option<TokenPair> {
        let access = self.access_token().await?;
        let refresh = self.refresh_token().await?;
        Some(TokenPair { access, refresh })
    }

    /// Persist both tokens in one write.
    pub async fn store(&self, pair: &TokenPair) -> Result<()> {
        self.store
            .set_many(&[
                (ACCESS_TOKEN_KEY, pair.access.expose().as_str()),
                (REFRESH_TOKEN_KEY, pair.refresh.expose().as_str()),
            ])
            .await
    }

    /// Remove both tokens in one write.
    pub async fn clear(&self) -> Result<()> {
        self.store
            .delete_many(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY])
            .await
    }

    /// Whether both tokens are present.
    pub async fn is_signed_in(&self) -> bool {
        self.load().await.is_some()
    }
}
