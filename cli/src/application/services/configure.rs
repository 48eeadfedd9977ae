//! Application service: render service configuration from resolved settings.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::application::ports::{LocalFs, ProgressReporter};
use crate::domain::catalog::BundleSettings;

pub const LOCALAI_CONFIG_FILE: &str = "localai.yaml";
pub const MCP_CONFIG_FILE: &str = "mcp.json";

#[derive(Debug, Serialize)]
struct ModelEntry<'a> {
    name: &'a str,
    parameters: ModelParameters<'a>,
    context_size: u32,
    threads: u32,
}

#[derive(Debug, Serialize)]
struct ModelParameters<'a> {
    model: &'a str,
    temperature: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct McpClientConfig<'a> {
    mcp_servers: BTreeMap<&'a str, McpServerEntry>,
}

#[derive(Debug, Serialize)]
struct McpServerEntry {
    command: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

/// LocalAI model configuration file contents.
///
/// # Errors
///
/// Returns an error if YAML serialization fails.
pub fn render_localai_config(settings: &BundleSettings) -> Result<String> {
    let ai = &settings.localai;
    let models = [ModelEntry {
        name: &ai.model_name,
        parameters: ModelParameters {
            model: &ai.model_file,
            temperature: ai.temperature,
        },
        context_size: ai.context_size,
        threads: ai.threads,
    }];
    serde_yaml::to_string(&models).context("rendering LocalAI model config")
}

/// Client-side MCP registration pointing at the installed server script.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn render_mcp_config(settings: &BundleSettings) -> Result<String> {
    let mut env = BTreeMap::new();
    if settings.localai.enabled {
        env.insert(
            "LOCALAI_URL".to_string(),
            format!("http://127.0.0.1:{}/v1", settings.localai.port),
        );
    }
    let config = McpClientConfig {
        mcp_servers: BTreeMap::from([(
            "kali",
            McpServerEntry {
                command: settings.mcp.python.clone(),
                args: vec![settings.mcp_script_path().to_string_lossy().into_owned()],
                env,
            },
        )]),
    };
    let mut json = serde_json::to_string_pretty(&config).context("rendering MCP config")?;
    json.push('\n');
    Ok(json)
}

/// Write every enabled component's configuration into the config directory.
///
/// Returns the files written.
///
/// # Errors
///
/// Returns an error if rendering fails or a file cannot be written.
pub fn apply_configuration(
    fs: &impl LocalFs,
    settings: &BundleSettings,
    reporter: &impl ProgressReporter,
) -> Result<Vec<PathBuf>> {
    let dir = &settings.localai.config_dir;
    let mut written = Vec::new();

    if settings.localai.enabled {
        let path = dir.join(LOCALAI_CONFIG_FILE);
        reporter.step(&format!("writing {}...", path.display()));
        fs.write_atomic(&path, &render_localai_config(settings)?)?;
        written.push(path);
    }
    if settings.mcp.enabled {
        let path = dir.join(MCP_CONFIG_FILE);
        reporter.step(&format!("writing {}...", path.display()));
        fs.write_atomic(&path, &render_mcp_config(settings)?)?;
        written.push(path);
    }

    tracing::info!(count = written.len(), dir = %dir.display(), "configuration applied");
    reporter.success("configuration applied");
    Ok(written)
}
