//! Application service: preflight validation.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.
//! Every check is read-only except the session lock, which is acquired here
//! and handed to the caller on success.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::application::ports::{
    CommandRunner, LocalFs, LockAttempt, LockProvider, NetworkProbe, ProgressReporter, ToolLocator,
};
use crate::domain::catalog::BundleSettings;
use crate::domain::error::PreflightError;
use crate::domain::preflight::{
    CONNECTIVITY_HOST, CONNECTIVITY_PORT, Check, DNS_PROBE_HOST, FetchTool, Finding,
    MODELS_MIN_BYTES, PACKAGE_MANAGERS, PREFIX_MIN_BYTES, STATE_MIN_BYTES, Severity,
    TMP_MIN_BYTES, format_gib, has_fatal, is_supported_os, os_release_ids, parse_df_available,
};

const OS_RELEASE: &str = "/etc/os-release";
const SELF_INSTALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of a preflight run.
pub struct PreflightReport<G> {
    pub findings: Vec<Finding>,
    pub lock: Option<G>,
    pub fetch_tool: Option<FetchTool>,
}

impl<G> PreflightReport<G> {
    /// Warnings only.
    #[must_use]
    pub fn warnings(&self) -> Vec<&Finding> {
        self.findings
            .iter()
            .filter(|f| f.severity == Severity::Warning)
            .collect()
    }

    /// Hand over the session lock, or fail with every fatal finding.
    ///
    /// The lock is dropped (released) on failure.
    ///
    /// # Errors
    ///
    /// Returns `PreflightError::Fatal` if any finding is fatal.
    pub fn into_lock(self) -> Result<G, PreflightError> {
        let fatal: Vec<String> = self
            .findings
            .iter()
            .filter(|f| f.severity == Severity::Fatal)
            .map(|f| format!("{}: {}", f.check, f.message))
            .collect();
        match self.lock {
            Some(lock) if fatal.is_empty() => Ok(lock),
            _ => Err(PreflightError::Fatal { findings: fatal }),
        }
    }
}

/// The session lock and the paths whose free space is checked.
pub struct PreflightPaths {
    pub prefix: PathBuf,
    pub state_dir: PathBuf,
    /// `None` unless a model download is planned.
    pub model_dir: Option<PathBuf>,
    pub tmp_dir: PathBuf,
    pub session_lock: PathBuf,
}

impl PreflightPaths {
    #[must_use]
    pub fn from_settings(settings: &BundleSettings, tmp_dir: &Path, session_lock: &Path) -> Self {
        let localai = &settings.localai;
        Self {
            prefix: settings.prefix.clone(),
            state_dir: settings.state_dir.clone(),
            model_dir: (localai.enabled && localai.download_model)
                .then(|| localai.model_dir.clone()),
            tmp_dir: tmp_dir.to_path_buf(),
            session_lock: session_lock.to_path_buf(),
        }
    }

    fn disk_targets(&self) -> Vec<(&'static str, &Path, u64)> {
        let mut targets = vec![
            ("install prefix", self.prefix.as_path(), PREFIX_MIN_BYTES),
            ("state directory", self.state_dir.as_path(), STATE_MIN_BYTES),
        ];
        if let Some(model_dir) = &self.model_dir {
            targets.push(("model directory", model_dir.as_path(), MODELS_MIN_BYTES));
        }
        targets.push(("temporary directory", self.tmp_dir.as_path(), TMP_MIN_BYTES));
        targets
    }
}

/// Run every preflight check.
///
/// Probe failures become warnings; only privilege, concurrency and the
/// fetch tool can be fatal.
pub async fn run_preflight<L: LockProvider>(
    paths: &PreflightPaths,
    runner: &impl CommandRunner,
    network: &impl NetworkProbe,
    locator: &impl ToolLocator,
    fs: &impl LocalFs,
    locks: &L,
    reporter: &impl ProgressReporter,
) -> PreflightReport<L::Guard> {
    let mut findings = Vec::new();

    reporter.step("checking privileges...");
    match check_privilege(runner, fs, &paths.prefix).await {
        Some(true) => {}
        Some(false) => findings.push(Finding::fatal(
            Check::Privilege,
            format!(
                "cannot write to {}. Re-run with sudo or set install.prefix to a writable path.",
                paths.prefix.display()
            ),
        )),
        None => findings.push(Finding::warning(
            Check::Privilege,
            "could not determine privileges; continuing",
        )),
    }

    reporter.step("acquiring session lock...");
    let lock_path = &paths.session_lock;
    let lock = match locks.try_acquire(lock_path) {
        Ok(LockAttempt::Acquired(guard)) => Some(guard),
        Ok(LockAttempt::Held { holder }) => {
            let who = holder.map(|p| format!(" by pid {p}")).unwrap_or_default();
            findings.push(Finding::fatal(
                Check::Concurrency,
                format!("another session holds {}{who}", lock_path.display()),
            ));
            None
        }
        Err(e) => {
            findings.push(Finding::fatal(
                Check::Concurrency,
                format!("cannot acquire {}: {e:#}", lock_path.display()),
            ));
            None
        }
    };

    reporter.step("checking operating system...");
    findings.extend(check_os(fs));

    reporter.step("checking network...");
    findings.extend(check_network(network).await);

    reporter.step("checking disk space...");
    for (label, path, min) in paths.disk_targets() {
        if let Some(finding) = check_disk(runner, fs, label, path, min).await {
            findings.push(finding);
        }
    }

    reporter.step("checking download tools...");
    // No host mutation once a check is fatal.
    let blocked = has_fatal(&findings);
    let fetch_tool = if blocked {
        detect_fetch_tool(locator)
    } else {
        ensure_fetch_tool(runner, locator).await
    };
    if fetch_tool.is_none() {
        let message = if blocked {
            "neither curl nor wget is available"
        } else {
            "neither curl nor wget is available and curl could not be installed"
        };
        findings.push(Finding::fatal(Check::FetchTool, message));
    }

    if has_fatal(&findings) {
        tracing::warn!(count = findings.len(), "preflight failed");
    } else {
        reporter.success("preflight passed");
    }

    PreflightReport { findings, lock, fetch_tool }
}

/// `Some(true)` when running as root or the prefix is writable.
///
/// `None` when neither probe could run.
pub async fn check_privilege(
    runner: &impl CommandRunner,
    fs: &impl LocalFs,
    prefix: &Path,
) -> Option<bool> {
    let id = runner.run("id", &["-u"]).await.ok();
    if let Some(out) = &id
        && out.status.success()
        && String::from_utf8_lossy(&out.stdout).trim() == "0"
    {
        return Some(true);
    }

    let target = nearest_existing(fs, prefix);
    let target = target.to_string_lossy();
    match runner.run("test", &["-w", &target]).await {
        Ok(out) => Some(out.status.success()),
        Err(e) => {
            tracing::debug!("write probe unavailable: {e:#}");
            id.map(|_| false)
        }
    }
}

/// The path itself or its closest ancestor that exists.
pub fn nearest_existing(fs: &impl LocalFs, path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && fs.exists(p))
        .map_or_else(|| PathBuf::from("/"), Path::to_path_buf)
}

fn check_os(fs: &impl LocalFs) -> Option<Finding> {
    if std::env::consts::OS != "linux" {
        return Some(Finding::warning(
            Check::OsFamily,
            format!("{} is not a supported host; continuing", std::env::consts::OS),
        ));
    }
    match fs.read_to_string(Path::new(OS_RELEASE)) {
        Ok(content) => {
            let ids = os_release_ids(&content);
            (!is_supported_os(&ids)).then(|| {
                Finding::warning(
                    Check::OsFamily,
                    format!("untested distribution ({}); continuing", ids.join(" ")),
                )
            })
        }
        Err(_) => Some(Finding::warning(
            Check::OsFamily,
            format!("cannot read {OS_RELEASE}; distribution not checked"),
        )),
    }
}

async fn check_network(network: &impl NetworkProbe) -> Vec<Finding> {
    let mut findings = Vec::new();
    let tcp = network
        .check_tcp_connectivity(CONNECTIVITY_HOST, CONNECTIVITY_PORT)
        .await
        .unwrap_or(false);
    if !tcp {
        findings.push(Finding::warning(
            Check::Network,
            format!("{CONNECTIVITY_HOST}:{CONNECTIVITY_PORT} unreachable; downloads may fail"),
        ));
    }
    let dns = network
        .check_dns_resolution(DNS_PROBE_HOST)
        .await
        .unwrap_or(false);
    if !dns {
        findings.push(Finding::warning(
            Check::Network,
            format!("cannot resolve {DNS_PROBE_HOST}"),
        ));
    }
    findings
}

async fn check_disk(
    runner: &impl CommandRunner,
    fs: &impl LocalFs,
    label: &str,
    path: &Path,
    min: u64,
) -> Option<Finding> {
    let target = nearest_existing(fs, path);
    let target_arg = target.to_string_lossy();
    let available = match runner.run("df", &["-Pk", &target_arg]).await {
        Ok(out) if out.status.success() => {
            parse_df_available(&String::from_utf8_lossy(&out.stdout))
        }
        _ => None,
    };
    match available {
        Some(bytes) if bytes < min => Some(Finding::warning(
            Check::DiskSpace,
            format!(
                "{label} {} has {} free, {} recommended",
                target.display(),
                format_gib(bytes),
                format_gib(min)
            ),
        )),
        Some(_) => None,
        None => Some(Finding::warning(
            Check::DiskSpace,
            format!("could not measure free space for {label} {}", target.display()),
        )),
    }
}

async fn ensure_fetch_tool(
    runner: &impl CommandRunner,
    locator: &impl ToolLocator,
) -> Option<FetchTool> {
    if let Some(tool) = detect_fetch_tool(locator) {
        return Some(tool);
    }
    let (manager, args) = PACKAGE_MANAGERS
        .iter()
        .find(|(pm, _)| locator.on_path(pm))?;
    tracing::info!(manager, "installing curl");
    match runner.run_with_timeout(manager, args, SELF_INSTALL_TIMEOUT).await {
        Ok(out) if out.status.success() => {}
        Ok(out) => tracing::warn!(
            manager,
            "curl install failed: {}",
            crate::application::ports::combined_output(&out)
        ),
        Err(e) => tracing::warn!(manager, "curl install failed: {e:#}"),
    }
    detect_fetch_tool(locator)
}

fn detect_fetch_tool(locator: &impl ToolLocator) -> Option<FetchTool> {
    [FetchTool::Curl, FetchTool::Wget]
        .into_iter()
        .find(|t| locator.on_path(t.program()))
}
