//! Artifact download: implements `ArtifactFetcher` with curl or wget.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{ArtifactFetcher, CommandRunner, combined_output};
use crate::domain::module::Artifact;
use crate::domain::preflight::FetchTool;
use crate::infra::fs::sha256_file;

const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(1800);

/// Downloads with whichever of curl/wget is installed, preferring curl.
pub struct CommandFetcher<'a, R> {
    runner: &'a R,
    tool: Option<FetchTool>,
}

impl<'a, R: CommandRunner> CommandFetcher<'a, R> {
    /// Detect the tool on first use.
    pub fn new(runner: &'a R) -> Self {
        Self { runner, tool: None }
    }

    #[must_use]
    pub fn with_tool(runner: &'a R, tool: FetchTool) -> Self {
        Self { runner, tool: Some(tool) }
    }

    fn tool(&self) -> Result<FetchTool> {
        if let Some(tool) = self.tool {
            return Ok(tool);
        }
        [FetchTool::Curl, FetchTool::Wget]
            .into_iter()
            .find(|t| which::which(t.program()).is_ok())
            .ok_or_else(|| anyhow::anyhow!("neither curl nor wget is installed"))
    }
}

fn download_args(tool: FetchTool, url: &str, dest: &str) -> Vec<String> {
    match tool {
        FetchTool::Curl => ["-fsSL", "--retry", "3", "-o", dest, url]
            .map(String::from)
            .to_vec(),
        FetchTool::Wget => ["-q", "-O", dest, url].map(String::from).to_vec(),
    }
}

impl<R: CommandRunner> ArtifactFetcher for CommandFetcher<'_, R> {
    async fn fetch(&self, artifact: &Artifact, dest_dir: &Path) -> Result<PathBuf> {
        let tool = self.tool()?;
        tokio::fs::create_dir_all(dest_dir)
            .await
            .with_context(|| format!("creating {}", dest_dir.display()))?;
        let dest = dest_dir.join(&artifact.file_name);
        let dest_arg = dest.to_string_lossy().into_owned();

        tracing::info!(url = %artifact.url, tool = tool.program(), "downloading");
        let args = download_args(tool, &artifact.url, &dest_arg);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = self
            .runner
            .run_with_timeout(tool.program(), &args, DOWNLOAD_TIMEOUT)
            .await?;
        if !out.status.success() {
            let _ = tokio::fs::remove_file(&dest).await;
            anyhow::bail!("{} exited with {}: {}", tool.program(), out.status, combined_output(&out));
        }

        if let Some(expected) = &artifact.sha256 {
            let path = dest.clone();
            let actual = tokio::task::spawn_blocking(move || sha256_file(&path))
                .await
                .context("hash task panicked")??;
            if !actual.eq_ignore_ascii_case(expected) {
                let _ = tokio::fs::remove_file(&dest).await;
                anyhow::bail!(
                    "checksum mismatch for {}: expected {expected}, got {actual}",
                    artifact.file_name
                );
            }
            tracing::debug!(file = %artifact.file_name, "checksum verified");
        }
        Ok(dest)
    }
}
