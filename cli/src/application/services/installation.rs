//! Application service: the end-to-end install session.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Preflight gates every mutation; the session lock is held by an RAII guard
//! for the whole run and released however the run ends.

use std::path::Path;

use anyhow::Result;
use chrono::Utc;

use crate::application::ports::{
    ArtifactFetcher, CommandRunner, LocalFs, LockProvider, NetworkProbe, ProgressReporter,
    SessionLogStore, ToolLocator,
};
use crate::application::services::configure::apply_configuration;
use crate::application::services::module_installer::{CancelFlag, InstallContext, install_all};
use crate::application::services::preflight::{PreflightPaths, run_preflight};
use crate::domain::catalog::{self, BundleSettings};
use crate::domain::module::{AbortReason, SessionReport};
use crate::domain::preflight::Finding;
use crate::domain::session::{SessionLog, SessionState};

pub struct InstallOptions<'a, P: ProgressReporter> {
    pub reporter: &'a P,
    pub settings: &'a BundleSettings,
    pub cancel: &'a CancelFlag,
    /// Session working directory for downloads. Removed on failure.
    pub workdir: &'a Path,
    /// Checked for free space by preflight.
    pub tmp_dir: &'a Path,
    /// Host-wide lock shared by every install and cleanup session.
    pub session_lock: &'a Path,
}

/// Result of `run_installation`.
#[derive(Debug)]
pub struct InstallOutcome {
    pub state: SessionState,
    pub report: SessionReport,
    pub findings: Vec<Finding>,
}

struct Progress {
    state: SessionState,
}

impl Progress {
    fn advance(&mut self, to: SessionState) {
        debug_assert!(self.state.can_transition(to), "{:?} -> {to:?}", self.state);
        tracing::debug!(from = self.state.label(), to = to.label(), "session state");
        self.state = to;
    }
}

/// Preflight, download, install, configure and verify the bundle.
///
/// Never returns early with the lock held: a failure at any stage ends in
/// `SessionState::Failed` with the reason recorded in the report.
///
/// # Errors
///
/// Returns an error only if persisting the session record fails in a way
/// that should be surfaced; stage failures are reported in the outcome.
#[allow(clippy::too_many_arguments)]
pub async fn run_installation<L: LockProvider>(
    runner: &impl CommandRunner,
    network: &impl NetworkProbe,
    locator: &impl ToolLocator,
    fs: &impl LocalFs,
    fetcher: &impl ArtifactFetcher,
    log_store: &impl SessionLogStore,
    locks: &L,
    opts: InstallOptions<'_, impl ProgressReporter>,
) -> Result<InstallOutcome> {
    let InstallOptions { reporter, settings, cancel, workdir, tmp_dir, session_lock } = opts;
    let mut progress = Progress { state: SessionState::Created };
    let mut report = SessionReport::default();

    let paths = PreflightPaths::from_settings(settings, tmp_dir, session_lock);
    let preflight = run_preflight(&paths, runner, network, locator, fs, locks, reporter).await;
    let findings = preflight.findings.clone();
    for warning in preflight.warnings() {
        reporter.warn(&format!("{}: {}", warning.check, warning.message));
        report.warnings.push(format!("{}: {}", warning.check, warning.message));
    }
    let had_lock = preflight.lock.is_some();

    let _guard = match preflight.into_lock() {
        Ok(guard) => guard,
        Err(e) => {
            report.abort = Some(AbortReason::Stage {
                stage: "preflight".into(),
                message: e.to_string(),
            });
            progress.advance(SessionState::Failed);
            if had_lock {
                persist(log_store, progress.state, &report).await;
            }
            return Ok(InstallOutcome { state: progress.state, report, findings });
        }
    };
    progress.advance(SessionState::PreflightPassed);

    let modules = catalog::modules(settings);

    // Each module's artifacts are fetched right before it installs, so the
    // download stage opens into the install stage.
    progress.advance(SessionState::Downloading);
    progress.advance(SessionState::Installing);
    let ctx = InstallContext { workdir, cancel, fetcher };
    let installed = install_all(runner, reporter, &modules, &ctx).await;
    report.modules = installed.modules;
    report.abort = installed.abort;
    report.warnings.extend(installed.warnings);

    if report.abort.is_none() && cancel.is_cancelled() {
        report.abort = Some(AbortReason::Cancelled);
    }

    if report.abort.is_none() {
        progress.advance(SessionState::Configuring);
        if let Err(e) = apply_configuration(fs, settings, reporter) {
            report.abort = Some(AbortReason::Stage {
                stage: "configure".into(),
                message: format!("{e:#}"),
            });
        }
    }

    if report.abort.is_none() {
        progress.advance(SessionState::Verifying);
        for service in catalog::services(settings) {
            if locator.locate(&service.launch.candidates).is_none() {
                let message = format!(
                    "{}: no binary found among {}",
                    service.name,
                    service.launch.candidates.join(", ")
                );
                reporter.warn(&message);
                report.warnings.push(message);
            }
        }
        progress.advance(SessionState::Completed);
    } else {
        if let Some(reason) = &report.abort {
            tracing::warn!("installation failed: {reason}");
        }
        match fs.remove_path(workdir) {
            Ok(_) => tracing::debug!(workdir = %workdir.display(), "working directory removed"),
            Err(e) => tracing::warn!("could not remove {}: {e:#}", workdir.display()),
        }
        progress.advance(SessionState::Failed);
    }

    persist(log_store, progress.state, &report).await;
    Ok(InstallOutcome { state: progress.state, report, findings })
}

async fn persist(store: &impl SessionLogStore, state: SessionState, report: &SessionReport) {
    let log = SessionLog {
        finished_at: Utc::now(),
        state,
        report: report.clone(),
    };
    if let Err(e) = store.save_async(&log).await {
        tracing::warn!("could not save session record: {e:#}");
    }
}
