//! Infrastructure implementation of the `CommandRunner` port.
//!
//! `TokioCommandRunner` runs host programs with tokio and guarantees the child
//! is killed when its timeout fires.

use std::process::{Output, Stdio};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::application::ports::CommandRunner;

/// Default timeout for short host probes (`id`, `df`, `pgrep`, ...).
pub const DEFAULT_CMD_TIMEOUT: Duration = Duration::from_secs(30);

/// Production `CommandRunner`.
///
/// `tokio::time::timeout` around `.output().await` only drops the future;
/// the explicit `child.kill()` in the timeout arm terminates the process.
pub struct TokioCommandRunner {
    timeout: Duration,
}

impl TokioCommandRunner {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TokioCommandRunner {
    fn default() -> Self {
        Self::new(DEFAULT_CMD_TIMEOUT)
    }
}

async fn drain(handle: Option<impl AsyncRead + Unpin>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = h.read_to_end(&mut buf).await;
    }
    buf
}

impl CommandRunner for TokioCommandRunner {
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with_timeout(program, args, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output> {
        tracing::debug!(program, ?args, timeout_secs = timeout.as_secs(), "running");
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        tokio::select! {
            result = async {
                let (status, stdout, stderr) = tokio::join!(child.wait(), drain(stdout), drain(stderr));
                let status = status.with_context(|| format!("waiting for {program}"))?;
                tracing::debug!(program, code = ?status.code(), "finished");
                Ok(Output { status, stdout, stderr })
            } => result,
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                anyhow::bail!("{program} timed out after {}s", timeout.as_secs())
            }
        }
    }
}
