//! `blackberets configure`: render the LocalAI and MCP configuration files.

use anyhow::{Context, Result};

use crate::app::AppContext;
use crate::application::services::configure::apply_configuration;
use crate::infra::fs::HostFs;
use crate::output::Renderer;

/// Run `blackberets configure`.
///
/// # Errors
///
/// Returns an error if a configuration file cannot be rendered or written.
pub async fn run(app: &AppContext) -> Result<()> {
    let settings = app.settings().await;
    let reporter = app.terminal_reporter();
    let written = apply_configuration(&HostFs, &settings, &reporter)
        .with_context(|| format!("configuring {}", settings.localai.config_dir.display()))?;
    drop(reporter);

    match app.renderer() {
        Renderer::Human(r) => r.render_configured(&written),
        Renderer::Json(r) => r.render_configured(&written)?,
    }
    Ok(())
}
