//! `blackberets test`: run every module's verify action, the LocalAI health
//! checks, and report the service states.

use std::process::ExitCode;

use anyhow::{Context, Result};

use crate::app::AppContext;
use crate::application::services::health::check_localai;
use crate::application::services::module_installer::verify_all;
use crate::commands::{exit_code, lifecycle};
use crate::domain::catalog::{self, LOCALAI_SERVICE};
use crate::infra::fs::HostFs;
use crate::infra::process::{HostServices, ProbeChain};
use crate::output::Renderer;

/// Run `blackberets test`. Exits 1 when a required module fails to verify;
/// health checks only warn.
///
/// # Errors
///
/// Returns an error if the scratch directory cannot be created or rendering
/// fails.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let settings = app.settings().await;
    let modules = catalog::modules(&settings);
    let scratch = tempfile::Builder::new()
        .prefix("blackberets-test-")
        .tempdir()
        .context("creating scratch directory")?;

    let services = catalog::services(&settings);
    let reporter = app.terminal_reporter();
    let mut report = verify_all(&app.runner, &reporter, &modules, scratch.path()).await;
    if let Some(localai) = services.iter().find(|s| s.name == LOCALAI_SERVICE) {
        report.health =
            check_localai(&app.runner, &HostFs, &reporter, &settings.localai, localai).await;
    }
    drop(reporter);

    let host = HostServices::new(&app.runner, ProbeChain::detect());
    let statuses = lifecycle(&host, &settings).status_all(&services).await;

    match app.renderer() {
        Renderer::Human(r) => r.render_verify(&report, &statuses),
        Renderer::Json(r) => r.render_verify(&report, &statuses)?,
    }
    Ok(exit_code(report.required_failures().is_empty()))
}
