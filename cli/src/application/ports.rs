//! Port trait definitions for the Application layer.
//!
//! Every host interaction a service needs is a trait here. `crate::infra`
//! provides the real implementations; tests provide scripted ones.

use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::Duration;

use anyhow::Result;

use crate::domain::config::SourceSignature;
use crate::domain::module::Artifact;
use crate::domain::service::LaunchSpec;
use crate::domain::session::SessionLog;

// ── Command Runner Port ───────────────────────────────────────────────────────

/// Abstracts process execution so infrastructure can be swapped or mocked.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a program and capture its output.
    ///
    /// Implementations should delegate to `run_with_timeout` using the
    /// instance's configured default timeout.
    async fn run(&self, program: &str, args: &[&str]) -> Result<Output>;
    /// Run a program with a custom timeout override.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or exceeds `timeout`.
    /// On timeout, the child process must be killed (not left orphaned).
    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<Output>;
}

/// Whether `err` came from spawning a program that does not exist.
#[must_use]
pub fn program_missing(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound)
    })
}

/// Combined stdout and stderr of a finished program, trimmed.
#[must_use]
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        if !text.trim().is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text.trim().to_string()
}

// ── Progress Reporting Port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the presentation layer.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}

// ── Network Probe Port ────────────────────────────────────────────────────────

/// Abstracts network connectivity checks so application services can be tested
/// without real network access.
#[allow(async_fn_in_trait)]
pub trait NetworkProbe {
    /// Check TCP connectivity to the given host and port.
    async fn check_tcp_connectivity(&self, host: &str, port: u16) -> Result<bool>;
    /// Check DNS resolution for the given hostname.
    async fn check_dns_resolution(&self, hostname: &str) -> Result<bool>;
}

// ── Process Ports ─────────────────────────────────────────────────────────────

/// What the socket listings say about one TCP port, on any local address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortListener {
    Owned(u32),
    /// Listed as listening, but the owner is not visible to this user.
    Unattributed,
    /// A complete listing shows nothing on the port.
    Absent,
    /// No strategy produced a listing.
    Unknown,
}

/// Resolves the listener on a TCP port and its owning pid.
#[allow(async_fn_in_trait)]
pub trait ProcessLookup {
    async fn listener(&self, port: u16) -> Result<PortListener>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Term,
    Kill,
}

/// Process inspection and signalling.
#[allow(async_fn_in_trait)]
pub trait ProcessTable {
    /// Full command line of `pid`, `None` if the process is gone.
    async fn command_line(&self, pid: u32) -> Result<Option<String>>;
    /// Pids whose command line contains `pattern`, excluding this process.
    async fn find_by_pattern(&self, pattern: &str) -> Result<Vec<u32>>;
    async fn is_alive(&self, pid: u32) -> bool;
    async fn signal(&self, pid: u32, signal: Signal) -> Result<()>;
    /// Best-effort `pkill -f`. Returns whether anything matched.
    async fn signal_matching(&self, pattern: &str, signal: Signal) -> Result<bool>;
}

/// Starts a service binary detached from this process.
#[allow(async_fn_in_trait)]
pub trait ProcessLauncher {
    /// Launch `binary` per `spec` and return the child pid.
    async fn spawn_detached(&self, binary: &Path, spec: &LaunchSpec) -> Result<u32>;
}

/// Everything the service lifecycle needs from the host.
pub trait ServiceHost: NetworkProbe + ProcessLookup + ProcessTable + ProcessLauncher {}

/// Blanket implementation: any type implementing all four sub-traits is a `ServiceHost`.
impl<T> ServiceHost for T where T: NetworkProbe + ProcessLookup + ProcessTable + ProcessLauncher {}

// ── Tooling Ports ─────────────────────────────────────────────────────────────

/// Locates executables on the host.
pub trait ToolLocator {
    /// First candidate that exists as a file, else the first found on `PATH`.
    fn locate(&self, candidates: &[String]) -> Option<PathBuf>;
    fn on_path(&self, program: &str) -> bool;
}

/// Downloads module artifacts into a working directory.
#[allow(async_fn_in_trait)]
pub trait ArtifactFetcher {
    /// Fetch `artifact` into `dest_dir`, verifying its digest when pinned.
    async fn fetch(&self, artifact: &Artifact, dest_dir: &Path) -> Result<PathBuf>;
}

// ── Configuration Ports ───────────────────────────────────────────────────────

/// Evaluates a configuration source into a JSON tree.
#[allow(async_fn_in_trait)]
pub trait ConfigEvaluator {
    /// Current modification signature of `source`.
    fn signature(&self, source: &Path) -> Result<SourceSignature>;
    async fn evaluate(&self, source: &Path) -> Result<serde_json::Value>;
}

/// Evaluated document persisted between CLI invocations.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CachedDocument {
    pub source: PathBuf,
    pub signature: SourceSignature,
    pub document: serde_json::Value,
}

/// On-disk cache for evaluated configuration.
pub trait ConfigCache {
    fn load(&self) -> Option<CachedDocument>;
    fn store(&self, entry: &CachedDocument) -> Result<()>;
}

// ── State and Filesystem Ports ────────────────────────────────────────────────

/// Filesystem operations used by configure and cleanup.
pub trait LocalFs {
    fn exists(&self, path: &Path) -> bool;
    fn read_to_string(&self, path: &Path) -> Result<String>;
    /// Write via temp file and rename.
    fn write_atomic(&self, path: &Path, content: &str) -> Result<()>;
    /// Remove a file or directory tree. `Ok(false)` when already absent.
    fn remove_path(&self, path: &Path) -> Result<bool>;
}

/// Abstracts persistence of the last session record.
#[allow(async_fn_in_trait)]
pub trait SessionLogStore {
    async fn load_async(&self) -> Result<Option<SessionLog>>;
    async fn save_async(&self, log: &SessionLog) -> Result<()>;
}

// ── Lock Port ─────────────────────────────────────────────────────────────────

/// Result of a non-blocking lock attempt.
#[derive(Debug)]
pub enum LockAttempt<G> {
    Acquired(G),
    /// Held elsewhere; `holder` is the pid recorded in the lock file, if any.
    Held { holder: Option<u32> },
}

/// Cross-process exclusive locks released when the guard drops.
pub trait LockProvider {
    type Guard;
    fn try_acquire(&self, path: &Path) -> Result<LockAttempt<Self::Guard>>;
}
