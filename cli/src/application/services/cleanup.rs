//! Application service: two-phase teardown.
//!
//! Phase 1 walks the per-module steps, phase 2 the shared steps. No step
//! failure stops the loop; only a failed privilege confirmation marks the
//! report critical. Privilege is checked once, before the first privileged
//! removal of either phase.

use std::path::Path;
use std::time::Duration;

use crate::application::ports::{
    CommandRunner, LocalFs, ProcessTable, ProgressReporter, Signal, combined_output,
    program_missing,
};
use crate::application::services::module_installer::run_action;
use crate::application::services::preflight::check_privilege;
use crate::domain::cleanup::{
    CleanupPlan, CleanupReport, CleanupStep, PhaseReport, StepOutcome, StepRecord, TeardownAction,
};
use crate::domain::error::CleanupError;
use crate::domain::module::ActionSpec;

/// Fixed inputs for one cleanup run.
pub struct CleanupOptions<'a> {
    /// Install prefix probed by the privilege gate.
    pub prefix: &'a Path,
    pub stop_grace: Duration,
    pub poll: Duration,
}

impl<'a> CleanupOptions<'a> {
    #[must_use]
    pub fn new(prefix: &'a Path) -> Self {
        Self {
            prefix,
            stop_grace: Duration::from_secs(5),
            poll: Duration::from_millis(200),
        }
    }
}

struct Teardown<'a, R, P, F, Rep> {
    runner: &'a R,
    processes: &'a P,
    fs: &'a F,
    reporter: &'a Rep,
    opts: &'a CleanupOptions<'a>,
    /// `None` until the privilege check has run.
    privileged: Option<bool>,
}

/// Execute `plan`. Running it twice is safe: the second pass finds nothing
/// to remove and reports every step succeeded or skipped.
pub async fn run_cleanup(
    plan: &CleanupPlan,
    runner: &impl CommandRunner,
    processes: &impl ProcessTable,
    fs: &impl LocalFs,
    reporter: &impl ProgressReporter,
    opts: &CleanupOptions<'_>,
) -> CleanupReport {
    let mut teardown = Teardown {
        runner,
        processes,
        fs,
        reporter,
        opts,
        privileged: None,
    };
    let mut report = CleanupReport::default();

    reporter.step("removing installed modules...");
    for step in &plan.module_steps {
        let record = teardown.execute(step, &mut report.critical_failure).await;
        report.modules.steps.push(record);
    }

    reporter.step("removing shared state...");
    for step in &plan.shared_steps {
        let record = teardown.execute(step, &mut report.critical_failure).await;
        report.shared.steps.push(record);
    }

    summarize(reporter, &report.modules, "module teardown");
    summarize(reporter, &report.shared, "shared teardown");
    report
}

fn summarize(reporter: &impl ProgressReporter, phase: &PhaseReport, label: &str) {
    let tally = phase.tally();
    let line = format!(
        "{label}: {} succeeded, {} failed, {} skipped",
        tally.passed, tally.failed, tally.skipped
    );
    if tally.failed == 0 {
        reporter.success(&line);
    } else {
        reporter.warn(&line);
    }
}

impl<R, P, F, Rep> Teardown<'_, R, P, F, Rep>
where
    R: CommandRunner,
    P: ProcessTable,
    F: LocalFs,
    Rep: ProgressReporter,
{
    async fn execute(&mut self, step: &CleanupStep, critical: &mut Option<String>) -> StepRecord {
        let outcome = match &step.action {
            TeardownAction::Run(spec) => self.run(spec).await,
            TeardownAction::StopProcesses { pattern } => self.stop_processes(pattern).await,
            TeardownAction::RemovePath { path, privileged } => {
                self.remove(path, *privileged).await
            }
            TeardownAction::ConfirmPrivilege => {
                let outcome = self.confirm_privilege().await;
                if let StepOutcome::Failed(reason) = &outcome {
                    *critical = Some(reason.clone());
                }
                outcome
            }
        };

        if let StepOutcome::Failed(reason) = &outcome {
            let err = CleanupError::StepFailed {
                step: step.action.describe(),
                reason: reason.clone(),
            };
            tracing::warn!(owner = %step.owner, "{err}");
            self.reporter.warn(&err.to_string());
        }

        StepRecord {
            owner: step.owner.clone(),
            action: step.action.describe(),
            outcome,
        }
    }

    async fn run(&self, spec: &ActionSpec) -> StepOutcome {
        match run_action(self.runner, spec, self.opts.prefix).await {
            Ok(out) if out.status.success() => StepOutcome::Succeeded,
            Ok(out) => StepOutcome::Failed(combined_output(&out)),
            Err(e) if program_missing(&e) => {
                StepOutcome::Skipped(format!("{} is not installed", spec.program))
            }
            Err(e) => StepOutcome::Failed(format!("{e:#}")),
        }
    }

    async fn stop_processes(&self, pattern: &str) -> StepOutcome {
        let pids = match self.processes.find_by_pattern(pattern).await {
            Ok(pids) => pids,
            Err(e) => {
                tracing::debug!(pattern, "process lookup unavailable: {e:#}");
                return StepOutcome::Skipped("process lookup unavailable".into());
            }
        };
        if pids.is_empty() {
            return StepOutcome::Succeeded;
        }

        if let Err(e) = self.processes.signal_matching(pattern, Signal::Term).await {
            tracing::debug!(pattern, "pattern signal failed: {e:#}");
        }

        let deadline = tokio::time::Instant::now() + self.opts.stop_grace;
        let mut alive = pids;
        loop {
            let mut still = Vec::new();
            for pid in alive {
                if self.processes.is_alive(pid).await {
                    still.push(pid);
                }
            }
            alive = still;
            if alive.is_empty() {
                return StepOutcome::Succeeded;
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(self.opts.poll).await;
        }

        tracing::warn!(pattern, ?alive, "processes survived SIGTERM, sending SIGKILL");
        for pid in &alive {
            if let Err(e) = self.processes.signal(*pid, Signal::Kill).await {
                tracing::debug!(pid, "SIGKILL failed: {e:#}");
            }
        }

        let mut survivors = Vec::new();
        for pid in alive {
            if self.processes.is_alive(pid).await {
                survivors.push(pid.to_string());
            }
        }
        if survivors.is_empty() {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed(format!("still running: {}", survivors.join(", ")))
        }
    }

    async fn remove(&mut self, path: &Path, privileged: bool) -> StepOutcome {
        if privileged && !self.has_privilege().await {
            return StepOutcome::Skipped("privilege not confirmed".into());
        }
        match self.fs.remove_path(path) {
            Ok(true) => {
                tracing::debug!(path = %path.display(), "removed");
                StepOutcome::Succeeded
            }
            Ok(false) => {
                tracing::debug!(path = %path.display(), "already absent");
                StepOutcome::Succeeded
            }
            Err(e) => StepOutcome::Failed(format!("{e:#}")),
        }
    }

    async fn has_privilege(&mut self) -> bool {
        if let Some(known) = self.privileged {
            return known;
        }
        let granted = check_privilege(self.runner, self.fs, self.opts.prefix).await == Some(true);
        self.privileged = Some(granted);
        granted
    }

    async fn confirm_privilege(&mut self) -> StepOutcome {
        if self.has_privilege().await {
            StepOutcome::Succeeded
        } else {
            StepOutcome::Failed(
                CleanupError::PrivilegeRequired {
                    path: self.opts.prefix.to_path_buf(),
                }
                .to_string(),
            )
        }
    }
}
