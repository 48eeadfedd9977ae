//! Infrastructure implementations of the persisted-state ports.
//!
//! `StateManager` stores the last session record and `DiskConfigCache` the
//! evaluated configuration. Both write atomically (temp file + rename).

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::{CachedDocument, ConfigCache, SessionLogStore};
use crate::domain::session::SessionLog;
use crate::infra::fs::write_atomic;

pub const CONFIG_CACHE_FILE: &str = "config-cache.json";

/// Session record manager. Implements `SessionLogStore`.
pub struct StateManager {
    path: PathBuf,
}

impl StateManager {
    /// Create a state manager for `path` (normally `<state_dir>/last-session.json`).
    #[must_use]
    pub fn with_path(path: PathBuf) -> Self {
        Self { path }
    }

    /// Blocking load, run by `load_async` on the blocking pool.
    fn load_sync(&self) -> Result<Option<SessionLog>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading session record {}", self.path.display()))?;
        let log = serde_json::from_str(&content)
            .with_context(|| format!("parsing session record {}", self.path.display()))?;
        Ok(Some(log))
    }

    fn save_sync(&self, log: &SessionLog) -> Result<()> {
        let content = serde_json::to_string_pretty(log).context("serializing session record")?;
        write_atomic(&self.path, content.as_bytes(), 0o600)
    }
}

impl SessionLogStore for StateManager {
    async fn load_async(&self) -> Result<Option<SessionLog>> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || StateManager::with_path(path).load_sync())
            .await
            .context("session load task panicked")?
    }

    async fn save_async(&self, log: &SessionLog) -> Result<()> {
        let path = self.path.clone();
        let log = log.clone();
        tokio::task::spawn_blocking(move || StateManager::with_path(path).save_sync(&log))
            .await
            .context("session save task panicked")?
    }
}

/// Evaluated-config cache under the cache directory.
pub struct DiskConfigCache {
    path: PathBuf,
}

impl DiskConfigCache {
    #[must_use]
    pub fn in_dir(cache_dir: &std::path::Path) -> Self {
        Self { path: cache_dir.join(CONFIG_CACHE_FILE) }
    }
}

impl ConfigCache for DiskConfigCache {
    fn load(&self) -> Option<CachedDocument> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(path = %self.path.display(), "ignoring unreadable config cache: {e}");
                None
            }
        }
    }

    fn store(&self, entry: &CachedDocument) -> Result<()> {
        let content = serde_json::to_string(entry).context("serializing config cache")?;
        write_atomic(&self.path, content.as_bytes(), 0o600)
    }
}
