//! Application service: ordered module installation and verification.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! All I/O is routed through injected port traits.

use std::path::Path;
use std::process::Output;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;

use crate::application::ports::{ArtifactFetcher, CommandRunner, ProgressReporter, combined_output};
use crate::application::services::artifacts::fetch_module;
use crate::domain::module::{
    AbortReason, ActionSpec, Module, ModuleStatus, SessionReport, VerifyRecord, VerifyReport,
    validate_modules,
};

/// Cooperative cancellation shared with the signal handler.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Inputs that are fixed for one `install_all` run.
pub struct InstallContext<'a, F> {
    pub workdir: &'a Path,
    pub cancel: &'a CancelFlag,
    /// Downloads a module's artifacts right before its install action.
    pub fetcher: &'a F,
}

/// Run an action with `{workdir}` expanded.
///
/// # Errors
///
/// Returns an error if the program cannot be spawned or times out.
pub async fn run_action(
    runner: &impl CommandRunner,
    spec: &ActionSpec,
    workdir: &Path,
) -> Result<Output> {
    let spec = spec.expand(workdir);
    let args: Vec<&str> = spec.args.iter().map(String::as_str).collect();
    runner
        .run_with_timeout(&spec.program, &args, spec.timeout)
        .await
}

/// Whether a module's installed check reports it present.
pub async fn already_installed(
    runner: &impl CommandRunner,
    module: &Module,
    workdir: &Path,
) -> bool {
    let Some(check) = &module.installed_check else {
        return false;
    };
    matches!(run_action(runner, check, workdir).await, Ok(out) if out.status.success())
}

/// Install `modules` in declared order.
///
/// Required failures abort the sequence; optional failures are recorded and
/// the sequence continues. Every module appears exactly once in the report.
/// A failed download counts as that module's install failure.
pub async fn install_all(
    runner: &impl CommandRunner,
    reporter: &impl ProgressReporter,
    modules: &[Module],
    ctx: &InstallContext<'_, impl ArtifactFetcher>,
) -> SessionReport {
    let mut report = SessionReport::default();

    if let Err(e) = validate_modules(modules) {
        report.abort = Some(AbortReason::InvalidPlan { message: e.to_string() });
        skip_rest(&mut report, modules, "module plan is invalid");
        return report;
    }

    for (index, module) in modules.iter().enumerate() {
        if ctx.cancel.is_cancelled() {
            report.abort = Some(AbortReason::Cancelled);
            skip_rest(&mut report, &modules[index..], "cancelled");
            break;
        }

        if let Some(dep) = module
            .depends_on
            .iter()
            .find(|d| !report.status_of(d).is_some_and(ModuleStatus::is_installed))
        {
            let detail = format!("dependency '{dep}' was not installed");
            report.record(module, ModuleStatus::Skipped, detail.clone());
            if module.required {
                report.abort = Some(AbortReason::RequiredModuleSkipped {
                    module: module.name.clone(),
                    dependency: dep.clone(),
                });
                skip_rest(&mut report, &modules[index + 1..], "a required module was skipped");
                break;
            }
            reporter.warn(&format!("{}: skipped, {detail}", module.name));
            continue;
        }

        reporter.step(&format!("installing {}...", module.name));
        let outcome = install_one(runner, reporter, module, ctx).await;

        match outcome {
            Ok(already) => {
                let (status, detail) = verify_one(runner, reporter, module, ctx.workdir).await;
                if status == ModuleStatus::Installed {
                    let note = if already { " (already present)" } else { "" };
                    reporter.success(&format!("{} installed{note}", module.name));
                }
                report.record(module, status, detail);
            }
            Err(output) if module.required => {
                tracing::error!(module = %module.name, "required module failed");
                report.record(module, ModuleStatus::Failed, output.clone());
                report.abort = Some(AbortReason::RequiredModuleFailed {
                    module: module.name.clone(),
                    output,
                });
                skip_rest(&mut report, &modules[index + 1..], "a required module failed");
                break;
            }
            Err(output) => {
                tracing::warn!(module = %module.name, "optional module failed: {output}");
                reporter.warn(&format!("{} failed (optional), continuing", module.name));
                report.record(module, ModuleStatus::Failed, output);
            }
        }
    }

    report
}

/// `Ok(true)` if already present, `Ok(false)` if freshly installed.
async fn install_one(
    runner: &impl CommandRunner,
    reporter: &impl ProgressReporter,
    module: &Module,
    ctx: &InstallContext<'_, impl ArtifactFetcher>,
) -> Result<bool, String> {
    if already_installed(runner, module, ctx.workdir).await {
        tracing::debug!(module = %module.name, "installed check passed, skipping install");
        return Ok(true);
    }
    fetch_module(ctx.fetcher, reporter, module, ctx.workdir).await?;
    match run_action(runner, &module.install, ctx.workdir).await {
        Ok(out) if out.status.success() => Ok(false),
        Ok(out) => Err(failure_text(&module.install, &out)),
        Err(e) => Err(format!("{e:#}")),
    }
}

async fn verify_one(
    runner: &impl CommandRunner,
    reporter: &impl ProgressReporter,
    module: &Module,
    workdir: &Path,
) -> (ModuleStatus, String) {
    let Some(verify) = &module.verify else {
        return (ModuleStatus::Installed, String::new());
    };
    let detail = match run_action(runner, verify, workdir).await {
        Ok(out) if out.status.success() => return (ModuleStatus::Installed, String::new()),
        Ok(out) => failure_text(verify, &out),
        Err(e) => format!("{e:#}"),
    };
    tracing::warn!(module = %module.name, "verification failed: {detail}");
    reporter.warn(&format!("{} installed but verification failed", module.name));
    (ModuleStatus::InstalledWithWarnings, detail)
}

fn failure_text(spec: &ActionSpec, out: &Output) -> String {
    let code = out
        .status
        .code()
        .map_or_else(|| "signal".to_string(), |c| c.to_string());
    let text = combined_output(out);
    if text.is_empty() {
        format!("`{}` exited with {code}", spec.display())
    } else {
        format!("`{}` exited with {code}:\n{text}", spec.display())
    }
}

fn skip_rest(report: &mut SessionReport, modules: &[Module], reason: &str) {
    for module in modules {
        if report.status_of(&module.name).is_none() {
            report.record(module, ModuleStatus::Skipped, reason);
        }
    }
}

/// Run only verify actions (or installed checks where no verify exists).
pub async fn verify_all(
    runner: &impl CommandRunner,
    reporter: &impl ProgressReporter,
    modules: &[Module],
    workdir: &Path,
) -> VerifyReport {
    let mut report = VerifyReport::default();
    for module in modules {
        let Some(action) = module.verify.as_ref().or(module.installed_check.as_ref()) else {
            continue;
        };
        reporter.step(&format!("verifying {}...", module.name));
        let (passed, detail) = match run_action(runner, action, workdir).await {
            Ok(out) if out.status.success() => (true, String::new()),
            Ok(out) => (false, failure_text(action, &out)),
            Err(e) => (false, format!("{e:#}")),
        };
        if passed {
            reporter.success(&format!("{} ok", module.name));
        } else {
            reporter.warn(&format!("{} failed verification", module.name));
        }
        report.modules.push(VerifyRecord {
            name: module.name.clone(),
            required: module.required,
            passed,
            detail,
        });
    }
    report
}
