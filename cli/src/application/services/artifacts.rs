//! Application service: fetch one module's artifacts into the session workdir.

use std::path::Path;

use crate::application::ports::{ArtifactFetcher, ProgressReporter};
use crate::domain::module::Module;

/// Download every artifact of `module`, stopping at the first failure.
///
/// The error is the diagnostic recorded as the module's install failure.
///
/// # Errors
///
/// Returns the fetch diagnostics of the first artifact that failed.
pub async fn fetch_module(
    fetcher: &impl ArtifactFetcher,
    reporter: &impl ProgressReporter,
    module: &Module,
    workdir: &Path,
) -> Result<(), String> {
    for artifact in &module.artifacts {
        reporter.step(&format!("downloading {}...", artifact.file_name));
        match fetcher.fetch(artifact, workdir).await {
            Ok(path) => tracing::debug!(path = %path.display(), "artifact ready"),
            Err(e) => {
                let message = format!("download of {} failed: {e:#}", artifact.url);
                tracing::warn!(module = %module.name, "{message}");
                return Err(message);
            }
        }
    }
    Ok(())
}
