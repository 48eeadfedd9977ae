//! Host process infrastructure: port ownership, process table and launcher.
//!
//! `HostServices` implements every sub-trait of `ServiceHost` over a
//! `CommandRunner`, so the lifecycle manager sees one host object.

use std::fs::OpenOptions;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::application::ports::{
    CommandRunner, NetworkProbe, PortListener, ProcessLauncher, ProcessLookup, ProcessTable,
    Signal, combined_output,
};
use crate::domain::service::LaunchSpec;
use crate::infra::network::TokioNetworkProbe;

#[allow(clippy::expect_used)]
static SS_PID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pid=(\d+)").expect("valid ss pid pattern"));

#[allow(clippy::expect_used)]
static NETSTAT_PID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)/").expect("valid netstat pid pattern"));

// ── Port owner probes ─────────────────────────────────────────────────────────

/// One strategy for listing a port's listener and its pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortOwnerProbe {
    Lsof,
    Ss,
    Netstat,
}

impl PortOwnerProbe {
    pub const ALL: [Self; 3] = [Self::Lsof, Self::Ss, Self::Netstat];

    #[must_use]
    pub fn program(self) -> &'static str {
        match self {
            Self::Lsof => "lsof",
            Self::Ss => "ss",
            Self::Netstat => "netstat",
        }
    }

    fn args(self, port: u16) -> Vec<String> {
        match self {
            Self::Lsof => vec![
                "-nP".into(),
                "-t".into(),
                format!("-iTCP:{port}"),
                "-sTCP:LISTEN".into(),
            ],
            Self::Ss => vec!["-tlnp".into()],
            Self::Netstat => vec!["-tlnp".into()],
        }
    }

    /// What this probe's output says about `port`.
    ///
    /// ss and netstat list every listening socket on every address, so a
    /// missing row means nothing listens. lsof omits sockets it may not
    /// inspect, so its silence is `Unknown`.
    #[must_use]
    pub fn read(self, stdout: &str, port: u16) -> PortListener {
        match self {
            Self::Lsof => stdout
                .lines()
                .find_map(|l| l.trim().parse().ok())
                .map_or(PortListener::Unknown, PortListener::Owned),
            Self::Ss => read_ss(stdout, port),
            Self::Netstat => read_netstat(stdout, port),
        }
    }
}

fn from_rows<'a>(
    mut rows: std::iter::Peekable<impl Iterator<Item = &'a str>>,
    pid: impl Fn(&str) -> Option<u32>,
) -> PortListener {
    if rows.peek().is_none() {
        return PortListener::Absent;
    }
    rows.find_map(pid).map_or(PortListener::Unattributed, PortListener::Owned)
}

fn local_port(addr: &str) -> Option<u16> {
    addr.rsplit_once(':')?.1.parse().ok()
}

/// `LISTEN 0 4096 0.0.0.0:8080 0.0.0.0:* users:(("local-ai",pid=1234,fd=3))`
fn read_ss(stdout: &str, port: u16) -> PortListener {
    let rows = stdout
        .lines()
        .filter(|line| line.split_whitespace().nth(3).and_then(local_port) == Some(port));
    from_rows(rows.peekable(), |line| {
        SS_PID.captures(line)?.get(1)?.as_str().parse().ok()
    })
}

/// `tcp 0 0 0.0.0.0:8080 0.0.0.0:* LISTEN 1234/local-ai`
fn read_netstat(stdout: &str, port: u16) -> PortListener {
    let rows = stdout.lines().filter(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        fields.first().is_some_and(|p| p.starts_with("tcp"))
            && fields.get(3).and_then(|a| local_port(a)) == Some(port)
    });
    from_rows(rows.peekable(), |line| {
        let last = line.split_whitespace().next_back()?;
        NETSTAT_PID.captures(last)?.get(1)?.as_str().parse().ok()
    })
}

/// The installed probes, in priority order.
#[derive(Debug, Clone, Default)]
pub struct ProbeChain {
    probes: Vec<PortOwnerProbe>,
}

impl ProbeChain {
    /// Keep the probes whose program is on `PATH`.
    #[must_use]
    pub fn detect() -> Self {
        let probes: Vec<_> = PortOwnerProbe::ALL
            .into_iter()
            .filter(|p| which::which(p.program()).is_ok())
            .collect();
        tracing::debug!(?probes, "port owner probes");
        Self { probes }
    }

    #[must_use]
    pub fn with(probes: Vec<PortOwnerProbe>) -> Self {
        Self { probes }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// First conclusive answer across the chain. lsof exits 1 when it
    /// lists nothing, so only its output is consulted.
    async fn listener(&self, runner: &impl CommandRunner, port: u16) -> PortListener {
        for probe in &self.probes {
            let args = probe.args(port);
            let args: Vec<&str> = args.iter().map(String::as_str).collect();
            match runner.run(probe.program(), &args).await {
                Ok(out) if out.status.success() || *probe == PortOwnerProbe::Lsof => {
                    let seen = probe.read(&String::from_utf8_lossy(&out.stdout), port);
                    if seen != PortListener::Unknown {
                        return seen;
                    }
                }
                Ok(out) => tracing::debug!(
                    probe = probe.program(),
                    "probe exited with {}: {}",
                    out.status,
                    combined_output(&out)
                ),
                Err(e) => tracing::debug!(probe = probe.program(), "probe failed: {e:#}"),
            }
        }
        PortListener::Unknown
    }
}

// ── Host services ─────────────────────────────────────────────────────────────

/// Production `ServiceHost`.
pub struct HostServices<'a, R> {
    runner: &'a R,
    probes: ProbeChain,
    network: TokioNetworkProbe,
}

impl<'a, R: CommandRunner> HostServices<'a, R> {
    pub fn new(runner: &'a R, probes: ProbeChain) -> Self {
        Self {
            runner,
            probes,
            network: TokioNetworkProbe,
        }
    }
}

fn signal_flag(signal: Signal) -> &'static str {
    match signal {
        Signal::Term => "-TERM",
        Signal::Kill => "-KILL",
    }
}

impl<R: CommandRunner> NetworkProbe for HostServices<'_, R> {
    async fn check_tcp_connectivity(&self, host: &str, port: u16) -> Result<bool> {
        self.network.check_tcp_connectivity(host, port).await
    }

    async fn check_dns_resolution(&self, hostname: &str) -> Result<bool> {
        self.network.check_dns_resolution(hostname).await
    }
}

impl<R: CommandRunner> ProcessLookup for HostServices<'_, R> {
    async fn listener(&self, port: u16) -> Result<PortListener> {
        Ok(self.probes.listener(self.runner, port).await)
    }
}

impl<R: CommandRunner> ProcessTable for HostServices<'_, R> {
    async fn command_line(&self, pid: u32) -> Result<Option<String>> {
        match tokio::fs::read(format!("/proc/{pid}/cmdline")).await {
            Ok(raw) if !raw.is_empty() => {
                let text = String::from_utf8_lossy(&raw).replace('\0', " ");
                return Ok(Some(text.trim().to_string()));
            }
            Ok(_) => return Ok(None),
            Err(e) => tracing::debug!(pid, "/proc unavailable: {e}"),
        }
        let pid_arg = pid.to_string();
        let out = self.runner.run("ps", &["-o", "args=", "-p", &pid_arg]).await?;
        let text = String::from_utf8_lossy(&out.stdout).trim().to_string();
        Ok((out.status.success() && !text.is_empty()).then_some(text))
    }

    async fn find_by_pattern(&self, pattern: &str) -> Result<Vec<u32>> {
        let out = self.runner.run("pgrep", &["-f", pattern]).await?;
        match out.status.code() {
            Some(0) => {
                let me = std::process::id();
                Ok(String::from_utf8_lossy(&out.stdout)
                    .lines()
                    .filter_map(|l| l.trim().parse().ok())
                    .filter(|pid| *pid != me)
                    .collect())
            }
            Some(1) => Ok(Vec::new()),
            _ => anyhow::bail!("pgrep -f {pattern} failed: {}", combined_output(&out)),
        }
    }

    async fn is_alive(&self, pid: u32) -> bool {
        if let Ok(stat) = tokio::fs::read_to_string(format!("/proc/{pid}/stat")).await {
            // Field 3 is the state; a zombie has already exited.
            return stat
                .rsplit_once(") ")
                .is_some_and(|(_, rest)| !rest.starts_with('Z'));
        }
        let pid_arg = pid.to_string();
        matches!(self.runner.run("kill", &["-0", &pid_arg]).await, Ok(out) if out.status.success())
    }

    async fn signal(&self, pid: u32, signal: Signal) -> Result<()> {
        let pid_arg = pid.to_string();
        let out = self.runner.run("kill", &[signal_flag(signal), &pid_arg]).await?;
        if !out.status.success() {
            anyhow::bail!("kill {} {pid}: {}", signal_flag(signal), combined_output(&out));
        }
        Ok(())
    }

    async fn signal_matching(&self, pattern: &str, signal: Signal) -> Result<bool> {
        let out = self
            .runner
            .run("pkill", &[signal_flag(signal), "-f", pattern])
            .await?;
        match out.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => anyhow::bail!("pkill -f {pattern} failed: {}", combined_output(&out)),
        }
    }
}

impl<R: CommandRunner> ProcessLauncher for HostServices<'_, R> {
    async fn spawn_detached(&self, binary: &Path, spec: &LaunchSpec) -> Result<u32> {
        spawn_detached(binary, spec)
    }
}

/// Launch `binary` in its own process group with output appended to the log.
///
/// With `hold_stdin` the child's stdin is a pipe kept open by a
/// `tail -f /dev/null --pid=<child>` companion, so stdio servers do not see
/// EOF when this process exits.
fn spawn_detached(binary: &Path, spec: &LaunchSpec) -> Result<u32> {
    if let Some(parent) = spec.log_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating directory {}", parent.display()))?;
    }
    let log = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&spec.log_file)
        .with_context(|| format!("opening log {}", spec.log_file.display()))?;
    let log_err = log.try_clone().context("duplicating log handle")?;

    let mut cmd = std::process::Command::new(binary);
    cmd.args(&spec.args)
        .stdout(Stdio::from(log))
        .stderr(Stdio::from(log_err))
        .stdin(if spec.hold_stdin { Stdio::piped() } else { Stdio::null() });
    detach(&mut cmd);
    if let Some(dir) = spec.working_dir.as_deref().filter(|d| d.is_dir()) {
        cmd.current_dir(dir);
    }

    let mut child = cmd
        .spawn()
        .with_context(|| format!("failed to spawn {}", binary.display()))?;
    let pid = child.id();
    tracing::info!(pid, binary = %binary.display(), log = %spec.log_file.display(), "spawned");

    if let Some(stdin) = child.stdin.take() {
        let mut holder = std::process::Command::new("tail");
        holder
            .args(["-f", "/dev/null", &format!("--pid={pid}")])
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdin))
            .stderr(Stdio::null());
        detach(&mut holder);
        let holder = holder.spawn();
        match holder {
            Ok(holder) => reap(holder),
            Err(e) => tracing::warn!("stdin holder for pid {pid} not started: {e}"),
        }
    }

    reap(child);
    Ok(pid)
}

/// New process group, so terminal signals aimed at this CLI do not reach it.
#[cfg(unix)]
fn detach(cmd: &mut std::process::Command) {
    use std::os::unix::process::CommandExt;
    cmd.process_group(0);
}

#[cfg(not(unix))]
fn detach(_: &mut std::process::Command) {}

/// Wait on `child` in the background so it never lingers as a zombie while
/// this process is alive.
fn reap(mut child: std::process::Child) {
    std::thread::spawn(move || {
        let _ = child.wait();
    });
}
