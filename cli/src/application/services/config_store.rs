//! Application service: configuration store.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Evaluation and the on-disk cache are routed through injected ports.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::application::ports::{CachedDocument, ConfigCache, ConfigEvaluator};
use crate::domain::catalog::{BundleSettings, SYSTEM_DIR};
use crate::domain::config::{ConfigDocument, ConfigScalar, SourceSignature};
use crate::domain::error::ConfigError;

/// Environment variable naming an explicit configuration source.
pub const CONFIG_ENV: &str = "BLACKBERETS_CONFIG";

struct CacheEntry {
    signature: SourceSignature,
    document: Arc<ConfigDocument>,
}

/// Typed, defaulting lookups over one configuration source.
///
/// The document is evaluated lazily and re-evaluated only when the source's
/// modification signature changes. Every failure degrades to defaults and is
/// logged once per store.
pub struct ConfigStore<E, C> {
    source: Option<PathBuf>,
    evaluator: E,
    cache: C,
    entry: RwLock<Option<CacheEntry>>,
    warned: AtomicBool,
}

impl<E: ConfigEvaluator, C: ConfigCache> ConfigStore<E, C> {
    pub fn new(source: Option<PathBuf>, evaluator: E, cache: C) -> Self {
        Self {
            source,
            evaluator,
            cache,
            entry: RwLock::new(None),
            warned: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Resolve `path`, falling back to `default`. Never fails.
    pub async fn resolve<T: ConfigScalar>(&self, path: &str, default: T) -> T {
        self.document().await.get(path, default)
    }

    /// Resolve every bundle setting against the current document.
    pub async fn settings(&self, home: &Path, cwd: &Path) -> BundleSettings {
        let document = self.document().await;
        BundleSettings::from_document(document.as_ref(), home, cwd)
    }

    /// The current document, evaluating the source if it changed.
    pub async fn document(&self) -> Arc<ConfigDocument> {
        let Some(source) = self.source.as_deref() else {
            self.warn_once(&ConfigError::Unavailable {
                reason: "no configuration source found; using defaults".into(),
            });
            return Arc::new(ConfigDocument::empty());
        };

        let signature = match self.evaluator.signature(source) {
            Ok(signature) => signature,
            Err(e) => {
                self.warn_once(&ConfigError::Unavailable { reason: format!("{e:#}") });
                return Arc::new(ConfigDocument::empty());
            }
        };

        if let Some(document) = self.cached(signature) {
            return document;
        }

        if let Some(entry) = self.cache.load()
            && entry.source == source
            && entry.signature == signature
        {
            tracing::debug!(source = %source.display(), "configuration loaded from disk cache");
            return self.replace(signature, ConfigDocument::new(entry.document));
        }

        tracing::debug!(source = %source.display(), "evaluating configuration");
        match self.evaluator.evaluate(source).await {
            Ok(value) => {
                let entry = CachedDocument {
                    source: source.to_path_buf(),
                    signature,
                    document: value.clone(),
                };
                if let Err(e) = self.cache.store(&entry) {
                    tracing::debug!("config cache not written: {e:#}");
                }
                self.replace(signature, ConfigDocument::new(value))
            }
            Err(e) => {
                self.warn_once(&ConfigError::Unavailable { reason: format!("{e:#}") });
                Arc::new(ConfigDocument::empty())
            }
        }
    }

    fn cached(&self, signature: SourceSignature) -> Option<Arc<ConfigDocument>> {
        let guard = self.entry.read().ok()?;
        guard
            .as_ref()
            .filter(|e| e.signature == signature)
            .map(|e| Arc::clone(&e.document))
    }

    fn replace(&self, signature: SourceSignature, document: ConfigDocument) -> Arc<ConfigDocument> {
        let document = Arc::new(document);
        if let Ok(mut guard) = self.entry.write() {
            *guard = Some(CacheEntry {
                signature,
                document: Arc::clone(&document),
            });
        }
        document
    }

    fn warn_once(&self, err: &ConfigError) {
        if !self.warned.swap(true, Ordering::Relaxed) {
            tracing::warn!("{err}");
        }
    }
}

/// Pick the configuration source.
///
/// An explicit flag or environment value is used as given; otherwise the
/// first existing well-known location wins.
#[must_use]
pub fn discover_source(
    explicit: Option<&Path>,
    env_value: Option<&str>,
    cwd: &Path,
    home: Option<&Path>,
    exists: impl Fn(&Path) -> bool,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(value) = env_value.filter(|v| !v.trim().is_empty()) {
        return Some(PathBuf::from(value));
    }
    let mut candidates = vec![cwd.join("configuration.nix"), cwd.join("config.yaml")];
    if let Some(home) = home {
        candidates.push(home.join(".config/blackberets/configuration.nix"));
    }
    candidates.push(Path::new(SYSTEM_DIR).join("configuration.nix"));
    candidates.into_iter().find(|p| exists(p))
}
