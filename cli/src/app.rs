//! Per-invocation state handed to every command handler.
//!
//! `AppContext` bundles the output context, the lazily evaluated
//! configuration and the host command runner. Commands borrow it and build
//! their infra adapters on top of `runner`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::application::services::config_store::{CONFIG_ENV, ConfigStore, discover_source};
use crate::domain::catalog::BundleSettings;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::evaluator::SourceEvaluator;
use crate::infra::state::DiskConfigCache;
use crate::output::{HumanRenderer, JsonRenderer, OutputContext, Renderer, TerminalReporter};

/// Environment variable that answers yes to every prompt.
pub const YES_ENV: &str = "BLACKBERETS_YES";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    /// One JSON document on stdout, nothing else.
    Json,
}

pub struct OutputFlags {
    pub no_color: bool,
    pub quiet: bool,
    pub json: bool,
}

pub struct BehaviourFlags {
    /// `--yes`; `CI` and `BLACKBERETS_YES` have the same effect.
    pub yes: bool,
}

/// Global flags from the command line.
pub struct AppFlags {
    pub output: OutputFlags,
    pub behaviour: BehaviourFlags,
    /// `--config`, which takes precedence over `BLACKBERETS_CONFIG`.
    pub config: Option<PathBuf>,
}

pub type HostConfigStore = ConfigStore<SourceEvaluator<TokioCommandRunner>, DiskConfigCache>;

pub struct AppContext {
    pub output: OutputContext,
    pub mode: OutputMode,
    /// Prompts return their default without asking.
    pub non_interactive: bool,
    pub config: HostConfigStore,
    pub runner: TokioCommandRunner,
    home: PathBuf,
    cwd: PathBuf,
}

impl AppContext {
    /// Build the context for one invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the home or working directory cannot be determined.
    pub fn new(flags: &AppFlags) -> Result<Self> {
        let non_interactive = flags.behaviour.yes
            || std::env::var_os("CI").is_some()
            || std::env::var_os(YES_ENV).is_some();
        let mode = if flags.output.json { OutputMode::Json } else { OutputMode::Human };

        let home = dirs::home_dir().context("cannot determine home directory")?;
        let cwd = std::env::current_dir().context("cannot determine working directory")?;
        let config = config_store(flags.config.as_deref(), &home, &cwd);

        Ok(Self {
            output: OutputContext::new(flags.output.no_color, flags.output.quiet || flags.output.json),
            mode,
            non_interactive,
            config,
            runner: TokioCommandRunner::default(),
            home,
            cwd,
        })
    }

    /// Every bundle setting, resolved against the current configuration.
    pub async fn settings(&self) -> BundleSettings {
        self.config.settings(&self.home, &self.cwd).await
    }

    #[must_use]
    pub fn is_json(&self) -> bool {
        self.mode == OutputMode::Json
    }

    #[must_use]
    pub fn renderer(&self) -> Renderer<'_> {
        match self.mode {
            OutputMode::Human => Renderer::Human(HumanRenderer::new(&self.output)),
            OutputMode::Json => Renderer::Json(JsonRenderer),
        }
    }

    /// Progress sink for application services. Silent in JSON mode.
    #[must_use]
    pub fn terminal_reporter(&self) -> TerminalReporter<'_> {
        TerminalReporter::new(&self.output)
    }

    /// Ask a yes/no question, or return `default` when non-interactive.
    ///
    /// # Errors
    ///
    /// Returns an error if the prompt cannot be shown, e.g. without a TTY.
    pub fn confirm(&self, prompt: &str, default: bool) -> Result<bool> {
        if self.non_interactive {
            return Ok(default);
        }
        dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(default)
            .interact()
            .context("confirmation prompt failed")
    }
}

/// The evaluated-config cache lives under the XDG cache dir, not
/// `install.cacheDir`, which is only known after evaluation.
fn config_store(explicit: Option<&Path>, home: &Path, cwd: &Path) -> HostConfigStore {
    let env_source = std::env::var(CONFIG_ENV).ok();
    let source = discover_source(explicit, env_source.as_deref(), cwd, Some(home), Path::exists);
    tracing::debug!(source = ?source, "configuration source");

    let cache_dir = dirs::cache_dir()
        .unwrap_or_else(|| home.join(".cache"))
        .join("blackberets");
    ConfigStore::new(
        source,
        SourceEvaluator::new(TokioCommandRunner::default()),
        DiskConfigCache::in_dir(&cache_dir),
    )
}
