//! `blackberets status`: service states and the last install session.
//!
//! Read-only: safe to run while another command holds a service lock.

use std::process::ExitCode;

use anyhow::Result;

use crate::app::AppContext;
use crate::application::ports::SessionLogStore;
use crate::commands::lifecycle;
use crate::domain::catalog;
use crate::infra::process::{HostServices, ProbeChain};
use crate::infra::state::StateManager;
use crate::output::Renderer;

/// Run `blackberets status`.
///
/// # Errors
///
/// Returns an error if rendering fails. An unreadable session record is
/// logged and shown as absent.
pub async fn run(app: &AppContext) -> Result<ExitCode> {
    let settings = app.settings().await;
    let services = catalog::services(&settings);
    let host = HostServices::new(&app.runner, ProbeChain::detect());
    let statuses = lifecycle(&host, &settings).status_all(&services).await;

    let last_session = match StateManager::with_path(settings.session_log()).load_async().await {
        Ok(log) => log,
        Err(e) => {
            tracing::warn!("ignoring unreadable session record: {e:#}");
            None
        }
    };

    match app.renderer() {
        Renderer::Human(r) => r.render_status(&statuses, last_session.as_ref()),
        Renderer::Json(r) => r.render_status(&statuses, last_session.as_ref())?,
    }
    Ok(ExitCode::SUCCESS)
}
