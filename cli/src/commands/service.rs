//! `blackberets start [service]` and `blackberets stop [service]`.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::commands::{ServiceArgs, exit_code, lifecycle, select_services};
use crate::infra::process::{HostServices, ProbeChain};
use crate::output::Renderer;

/// Run `blackberets start`.
///
/// # Errors
///
/// Returns an error if the named service is unknown or rendering fails.
/// Per-service failures are rendered and reflected in the exit code.
pub async fn start(args: &ServiceArgs, app: &AppContext) -> Result<ExitCode> {
    let settings = app.settings().await;
    let services = select_services(&settings, args.service.as_deref())?;
    let host = HostServices::new(&app.runner, ProbeChain::detect());
    let results = lifecycle(&host, &settings).start_all(&services).await;

    match app.renderer() {
        Renderer::Human(r) => r.render_start(&results),
        Renderer::Json(r) => r.render_service_results("started", &results)?,
    }
    Ok(exit_code(results.iter().all(|(_, r)| r.is_ok())))
}

/// Run `blackberets stop`. Services stop in reverse start order.
///
/// # Errors
///
/// Returns an error if the named service is unknown or rendering fails.
pub async fn stop(args: &ServiceArgs, app: &AppContext) -> Result<ExitCode> {
    let settings = app.settings().await;
    let services = select_services(&settings, args.service.as_deref())?;
    let host = HostServices::new(&app.runner, ProbeChain::detect());
    let results = lifecycle(&host, &settings).stop_all(&services).await;

    match app.renderer() {
        Renderer::Human(r) => r.render_stop(&results),
        Renderer::Json(r) => r.render_service_results("stopped", &results)?,
    }
    Ok(exit_code(results.iter().all(|(_, r)| r.is_ok())))
}
