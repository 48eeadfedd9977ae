//! `blackberets cleanup [--yes]`: two-phase teardown of the bundle.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::ports::{LockAttempt, LockProvider};
use crate::application::services::cleanup::{CleanupOptions, run_cleanup};
use crate::domain::catalog;
use crate::domain::error::SessionError;
use crate::infra::fs::HostFs;
use crate::infra::lock::{FileLocks, session_lock_path};
use crate::infra::process::{HostServices, ProbeChain};
use crate::output::Renderer;

/// Run `blackberets cleanup`.
///
/// Holds the host-wide session lock so a teardown never overlaps an install,
/// whichever state directory either one was configured with.
///
/// # Errors
///
/// Returns an error if the prompt fails, an install session is active, or
/// rendering fails. Step failures are reported, not returned.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let settings = app.settings().await;
    let plan = catalog::cleanup_plan(&settings);

    if !app.non_interactive
        && !app.confirm(
            &format!(
                "Remove the bundle under {} and its state?",
                settings.prefix.display()
            ),
            false,
        )?
    {
        app.output.info("Cancelled.");
        return Ok(ExitCode::SUCCESS);
    }

    let lock_path = session_lock_path();
    let _guard = match FileLocks.try_acquire(&lock_path)? {
        LockAttempt::Acquired(guard) => guard,
        LockAttempt::Held { holder } => {
            return Err(SessionError::LockHeld { path: lock_path, holder }.into());
        }
    };

    let host = HostServices::new(&app.runner, ProbeChain::detect());
    let reporter = app.terminal_reporter();
    let report = run_cleanup(
        &plan,
        &app.runner,
        &host,
        &HostFs,
        &reporter,
        &CleanupOptions::new(&settings.prefix),
    )
    .await;
    drop(reporter);

    match app.renderer() {
        Renderer::Human(r) => r.render_cleanup(&report),
        Renderer::Json(r) => r.render_cleanup(&report)?,
    }
    Ok(ExitCode::from(report.exit_code()))
}
