//! Teardown plans and their reports.

use std::path::PathBuf;

use serde::Serialize;

use crate::domain::module::{ActionSpec, Tally};

/// A single teardown action. Every variant treats "already absent" as success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TeardownAction {
    /// Run a program; a missing program counts as skipped.
    Run(ActionSpec),
    /// Terminate every process whose command line matches `pattern`.
    StopProcesses { pattern: String },
    RemovePath { path: PathBuf, privileged: bool },
    /// Safety gate before privileged removals. Failure is critical.
    ConfirmPrivilege,
}

impl TeardownAction {
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Run(spec) => format!("run {}", spec.display()),
            Self::StopProcesses { pattern } => format!("stop processes matching '{pattern}'"),
            Self::RemovePath { path, .. } => format!("remove {}", path.display()),
            Self::ConfirmPrivilege => "confirm privilege".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupStep {
    /// Module name for phase 1, a shared label for phase 2.
    pub owner: String,
    pub action: TeardownAction,
}

impl CleanupStep {
    pub fn new(owner: impl Into<String>, action: TeardownAction) -> Self {
        Self { owner: owner.into(), action }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupPlan {
    /// Phase 1, per-module teardown in plan order.
    pub module_steps: Vec<CleanupStep>,
    /// Phase 2, shared-state teardown.
    pub shared_steps: Vec<CleanupStep>,
}

impl CleanupPlan {
    /// Whether any step removes a privileged path.
    #[must_use]
    pub fn needs_privilege(&self) -> bool {
        self.module_steps
            .iter()
            .chain(&self.shared_steps)
            .any(|s| matches!(s.action, TeardownAction::RemovePath { privileged: true, .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Failed(String),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub owner: String,
    pub action: String,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Modules,
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub steps: Vec<StepRecord>,
}

impl PhaseReport {
    #[must_use]
    pub fn new(phase: Phase) -> Self {
        Self { phase, steps: Vec::new() }
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        let mut tally = Tally::default();
        for step in &self.steps {
            match step.outcome {
                StepOutcome::Succeeded => tally.passed += 1,
                StepOutcome::Failed(_) => tally.failed += 1,
                StepOutcome::Skipped(_) => tally.skipped += 1,
            }
        }
        tally
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub modules: PhaseReport,
    pub shared: PhaseReport,
    /// Set when a safety-critical step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub critical_failure: Option<String>,
}

impl Default for CleanupReport {
    fn default() -> Self {
        Self {
            modules: PhaseReport::new(Phase::Modules),
            shared: PhaseReport::new(Phase::Shared),
            critical_failure: None,
        }
    }
}

impl CleanupReport {
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        u8::from(self.critical_failure.is_some())
    }
}
