//! `blackberets install`: run one installation session end to end.

use std::process::ExitCode;

use anyhow::{Context, Result};

use crate::app::AppContext;
use crate::application::services::installation::{InstallOptions, run_installation};
use crate::application::services::module_installer::CancelFlag;
use crate::infra::fetch::CommandFetcher;
use crate::infra::fs::HostFs;
use crate::infra::locator::PathLocator;
use crate::infra::lock::{FileLocks, session_lock_path};
use crate::infra::network::TokioNetworkProbe;
use crate::infra::state::StateManager;
use crate::output::Renderer;

/// Run `blackberets install`.
///
/// SIGINT and SIGTERM let the running module finish, skip the rest and end
/// the session as failed.
///
/// # Errors
///
/// Returns an error if the working directory cannot be created or the
/// outcome cannot be rendered. Stage failures are part of the outcome.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let settings = app.settings().await;
    let cancel = CancelFlag::new();
    let watcher = tokio::spawn(watch_signals(cancel.clone()));

    let workdir = tempfile::Builder::new()
        .prefix("blackberets-session-")
        .tempdir()
        .context("creating session working directory")?;
    let tmp_dir = std::env::temp_dir();
    let session_lock = session_lock_path();

    let fetcher = CommandFetcher::new(&app.runner);
    let log_store = StateManager::with_path(settings.session_log());
    let reporter = app.terminal_reporter();

    let outcome = run_installation(
        &app.runner,
        &TokioNetworkProbe,
        &PathLocator,
        &HostFs,
        &fetcher,
        &log_store,
        &FileLocks,
        InstallOptions {
            reporter: &reporter,
            settings: &settings,
            cancel: &cancel,
            workdir: workdir.path(),
            tmp_dir: &tmp_dir,
            session_lock: &session_lock,
        },
    )
    .await?;
    watcher.abort();
    drop(reporter);

    match app.renderer() {
        Renderer::Human(r) => r.render_session(&outcome),
        Renderer::Json(r) => r.render_session(&outcome)?,
    }
    Ok(ExitCode::from(outcome.report.status().exit_code()))
}

/// Set `cancel` on the first SIGINT or SIGTERM.
async fn watch_signals(cancel: CancelFlag) {
    wait_for_signal().await;
    tracing::warn!("signal received; finishing the current module before stopping");
    cancel.cancel();
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                () = ctrl_c() => {}
                Some(()) = sigterm.recv() => {}
            }
        }
        Err(e) => {
            tracing::debug!("SIGTERM handler unavailable: {e}");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::debug!("Ctrl-C handler unavailable: {e}");
        std::future::pending::<()>().await;
    }
}
