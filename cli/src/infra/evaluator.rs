//! Configuration evaluation: implements `ConfigEvaluator`.
//!
//! One evaluator per source, chosen by extension: `.nix` goes through
//! `nix eval`, `.json` and `.yaml`/`.yml` are parsed in process.

use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};

use anyhow::{Context, Result};

use crate::application::ports::{CommandRunner, ConfigEvaluator, combined_output};
use crate::domain::config::SourceSignature;
use crate::domain::error::ConfigError;

const NIX_EVAL_TIMEOUT: Duration = Duration::from_secs(20);

enum SourceKind {
    Nix,
    Json,
    Yaml,
}

fn kind_of(source: &Path) -> Option<SourceKind> {
    match source.extension()?.to_str()? {
        "nix" => Some(SourceKind::Nix),
        "json" => Some(SourceKind::Json),
        "yaml" | "yml" => Some(SourceKind::Yaml),
        _ => None,
    }
}

/// Production evaluator. `nix` is located on `PATH` at evaluation time.
pub struct SourceEvaluator<R> {
    runner: R,
}

impl<R: CommandRunner> SourceEvaluator<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    async fn eval_nix(&self, source: &Path) -> Result<serde_json::Value> {
        if which::which("nix").is_err() {
            return Err(ConfigError::NoEvaluator { path: source.to_path_buf() }.into());
        }
        let file = source.to_string_lossy();
        let out = self
            .runner
            .run_with_timeout(
                "nix",
                &["eval", "--extra-experimental-features", "nix-command", "--json", "--file", &file],
                NIX_EVAL_TIMEOUT,
            )
            .await?;
        if !out.status.success() {
            anyhow::bail!("nix eval of {} failed: {}", source.display(), combined_output(&out));
        }
        serde_json::from_slice(&out.stdout)
            .with_context(|| format!("parsing nix eval output for {}", source.display()))
    }
}

impl<R: CommandRunner> ConfigEvaluator for SourceEvaluator<R> {
    fn signature(&self, source: &Path) -> Result<SourceSignature> {
        let meta = std::fs::metadata(source)
            .with_context(|| format!("reading metadata of {}", source.display()))?;
        let modified = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .unwrap_or_default();
        Ok(SourceSignature {
            modified_secs: modified.as_secs(),
            modified_nanos: modified.subsec_nanos(),
            len: meta.len(),
        })
    }

    async fn evaluate(&self, source: &Path) -> Result<serde_json::Value> {
        match kind_of(source) {
            Some(SourceKind::Nix) => self.eval_nix(source).await,
            Some(SourceKind::Json) => {
                let text = tokio::fs::read_to_string(source)
                    .await
                    .with_context(|| format!("reading {}", source.display()))?;
                serde_json::from_str(&text).with_context(|| format!("parsing {}", source.display()))
            }
            Some(SourceKind::Yaml) => {
                let text = tokio::fs::read_to_string(source)
                    .await
                    .with_context(|| format!("reading {}", source.display()))?;
                let yaml: serde_yaml::Value = serde_yaml::from_str(&text)
                    .with_context(|| format!("parsing {}", source.display()))?;
                serde_json::to_value(yaml)
                    .with_context(|| format!("normalizing {}", source.display()))
            }
            None => Err(ConfigError::NoEvaluator { path: source.to_path_buf() }.into()),
        }
    }
}
