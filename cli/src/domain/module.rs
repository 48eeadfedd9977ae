//! Module domain types, session outcomes and plan validation.
//!
//! This module is intentionally free of I/O, async, and external layer imports.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::ModuleError;

/// Placeholder expanded to the session working directory.
pub const WORKDIR_TOKEN: &str = "{workdir}";

/// Default bound for a single install or verify invocation.
pub const DEFAULT_ACTION_TIMEOUT: Duration = Duration::from_secs(900);

/// An opaque invocation of an external program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionSpec {
    pub program: String,
    pub args: Vec<String>,
    pub timeout: Duration,
}

impl ActionSpec {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: DEFAULT_ACTION_TIMEOUT,
        }
    }

    /// Run through `sh -c`, for actions that need a pipeline.
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("sh", ["-c".to_string(), script.into()])
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace every `{workdir}` token with `workdir`.
    #[must_use]
    pub fn expand(&self, workdir: &Path) -> Self {
        let dir = workdir.to_string_lossy();
        Self {
            program: self.program.replace(WORKDIR_TOKEN, &dir),
            args: self
                .args
                .iter()
                .map(|a| a.replace(WORKDIR_TOKEN, &dir))
                .collect(),
            timeout: self.timeout,
        }
    }

    /// Human-readable command line for diagnostics.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A file fetched into the working directory before a module installs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub url: String,
    pub file_name: String,
    /// Expected lowercase hex SHA-256, if pinned.
    pub sha256: Option<String>,
}

/// A named unit of installable functionality.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub install: ActionSpec,
    pub verify: Option<ActionSpec>,
    /// Succeeds when the module is already present; the install action is
    /// then not invoked.
    pub installed_check: Option<ActionSpec>,
    pub artifacts: Vec<Artifact>,
    pub required: bool,
    pub depends_on: Vec<String>,
}

impl Module {
    pub fn new(name: impl Into<String>, install: ActionSpec) -> Self {
        Self {
            name: name.into(),
            install,
            verify: None,
            installed_check: None,
            artifacts: Vec::new(),
            required: true,
            depends_on: Vec::new(),
        }
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn verify_with(mut self, verify: ActionSpec) -> Self {
        self.verify = Some(verify);
        self
    }

    #[must_use]
    pub fn installed_when(mut self, check: ActionSpec) -> Self {
        self.installed_check = Some(check);
        self
    }

    #[must_use]
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    #[must_use]
    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }
}

/// Check that names are unique and every dependency is declared.
///
/// # Errors
///
/// Returns the first duplicate name or undeclared dependency found.
pub fn validate_modules(modules: &[Module]) -> Result<(), ModuleError> {
    let mut seen = HashSet::new();
    for module in modules {
        if !seen.insert(module.name.as_str()) {
            return Err(ModuleError::DuplicateModule(module.name.clone()));
        }
    }
    for module in modules {
        if let Some(dep) = module.depends_on.iter().find(|d| !seen.contains(d.as_str())) {
            return Err(ModuleError::UnknownDependency {
                module: module.name.clone(),
                dependency: dep.clone(),
            });
        }
    }
    Ok(())
}

// ── Outcomes ──────────────────────────────────────────────────────────────────

/// Terminal state of a module within one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Installed,
    InstalledWithWarnings,
    Failed,
    Skipped,
}

impl ModuleStatus {
    /// Whether dependents may proceed.
    #[must_use]
    pub fn is_installed(self) -> bool {
        matches!(self, Self::Installed | Self::InstalledWithWarnings)
    }
}

/// One entry of the session's ordered module log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRecord {
    pub name: String,
    pub required: bool,
    pub status: ModuleStatus,
    /// Captured output or skip reason, empty on a clean install.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// Why an install sequence stopped before the end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    RequiredModuleFailed { module: String, output: String },
    RequiredModuleSkipped { module: String, dependency: String },
    InvalidPlan { message: String },
    Cancelled,
    Stage { stage: String, message: String },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequiredModuleFailed { module, output } => {
                write!(f, "required module '{module}' failed")?;
                if !output.trim().is_empty() {
                    write!(f, ":\n{}", output.trim_end())?;
                }
                Ok(())
            }
            Self::RequiredModuleSkipped { module, dependency } => write!(
                f,
                "required module '{module}' could not run: '{dependency}' was not installed"
            ),
            Self::InvalidPlan { message } => write!(f, "invalid module plan: {message}"),
            Self::Cancelled => f.write_str("cancelled by signal"),
            Self::Stage { stage, message } => write!(f, "{stage} failed: {message}"),
        }
    }
}

/// Overall result of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Success,
    PartialSuccess,
    Failed,
}

impl SessionStatus {
    /// Process exit code for this status.
    #[must_use]
    pub fn exit_code(self) -> u8 {
        match self {
            Self::Success | Self::PartialSuccess => 0,
            Self::Failed => 1,
        }
    }
}

/// Counts rendered in every terminal report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub passed: usize,
    pub warned: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Accumulated outcome of one install run, returned by value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionReport {
    pub modules: Vec<ModuleRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub abort: Option<AbortReason>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl SessionReport {
    pub fn record(
        &mut self,
        module: &Module,
        status: ModuleStatus,
        detail: impl Into<String>,
    ) {
        self.modules.push(ModuleRecord {
            name: module.name.clone(),
            required: module.required,
            status,
            detail: detail.into(),
        });
    }

    /// Status recorded for `name`, if the module was reached.
    #[must_use]
    pub fn status_of(&self, name: &str) -> Option<ModuleStatus> {
        self.modules
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.status)
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        if self.abort.is_some() {
            return SessionStatus::Failed;
        }
        let degraded = !self.warnings.is_empty()
            || self.modules.iter().any(|r| {
                matches!(
                    r.status,
                    ModuleStatus::Failed | ModuleStatus::InstalledWithWarnings | ModuleStatus::Skipped
                )
            });
        if degraded {
            SessionStatus::PartialSuccess
        } else {
            SessionStatus::Success
        }
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for record in &self.modules {
            match record.status {
                ModuleStatus::Installed => tally.passed += 1,
                ModuleStatus::InstalledWithWarnings => tally.warned += 1,
                ModuleStatus::Failed => tally.failed += 1,
                ModuleStatus::Skipped => tally.skipped += 1,
            }
        }
        tally
    }
}

/// Result of running verify actions only (`test`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifyRecord {
    pub name: String,
    pub required: bool,
    pub passed: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerifyReport {
    pub modules: Vec<VerifyRecord>,
    /// Runtime diagnostics; never required.
    pub health: Vec<VerifyRecord>,
}

impl VerifyReport {
    /// A required module whose verify action failed.
    #[must_use]
    pub fn required_failures(&self) -> Vec<&VerifyRecord> {
        self.modules
            .iter()
            .filter(|r| r.required && !r.passed)
            .collect()
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for r in self.modules.iter().chain(&self.health) {
            match (r.passed, r.required) {
                (true, _) => tally.passed += 1,
                (false, true) => tally.failed += 1,
                (false, false) => tally.warned += 1,
            }
        }
        tally
    }
}
