//! Service domain types: long-running processes managed by the lifecycle
//! manager.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Time between a detached launch and the confirming status check.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(2);

/// How long `stop` waits for SIGTERM before escalating.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(10);

/// Bounded wait for the per-service start/stop lock.
pub const SERVICE_LOCK_WAIT: Duration = Duration::from_secs(10);

/// What `start` does when the service is already confirmed running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StartPolicy {
    /// Report success without launching.
    Idempotent,
    /// Report `AlreadyRunning` as an error.
    Exclusive,
}

/// How to launch a service binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Ordered locations to try; bare names are looked up on `PATH`.
    pub candidates: Vec<String>,
    pub args: Vec<String>,
    pub log_file: PathBuf,
    pub working_dir: Option<PathBuf>,
    /// Keep stdin open for servers that exit on EOF.
    pub hold_stdin: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub port: Option<u16>,
    /// Address the service binds `port` on. Unset means every address.
    pub bind_address: Option<String>,
    /// Substring that must appear in the owning process's command line.
    pub process_pattern: String,
    pub start_policy: StartPolicy,
    pub launch: LaunchSpec,
}

impl Service {
    /// Host a local client connects to. Wildcard binds are reachable on
    /// loopback.
    #[must_use]
    pub fn connect_host(&self) -> &str {
        let addr = self
            .bind_address
            .as_deref()
            .map(|a| a.trim().trim_start_matches('[').trim_end_matches(']'))
            .unwrap_or_default();
        match addr {
            "" | "0.0.0.0" | "*" => "127.0.0.1",
            "::" => "::1",
            other => other,
        }
    }

    /// `http://host:port` followed by `path`, for a port-bearing service.
    #[must_use]
    pub fn http_url(&self, path: &str) -> Option<String> {
        let port = self.port?;
        let host = self.connect_host();
        if host.contains(':') {
            Some(format!("http://[{host}]:{port}{path}"))
        } else {
            Some(format!("http://{host}:{port}{path}"))
        }
    }

    /// Whether `command_line` belongs to this service.
    #[must_use]
    pub fn matches(&self, command_line: &str) -> bool {
        !self.process_pattern.is_empty() && command_line.contains(&self.process_pattern)
    }
}

/// Observed state of a service. Derived on demand, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ServiceStatus {
    Running {
        pid: u32,
    },
    Stopped,
    PortOccupiedByOther {
        port: u16,
        pid: Option<u32>,
        command: Option<String>,
    },
}

impl ServiceStatus {
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Running { .. } => "running",
            Self::Stopped => "stopped",
            Self::PortOccupiedByOther { .. } => "port in use",
        }
    }
}

/// Successful result of `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StartOutcome {
    AlreadyRunning { pid: u32 },
    Started { pid: u32 },
}

/// Successful result of `stop`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StopOutcome {
    NotRunning,
    Stopped { pid: u32, forced: bool },
    /// The pid could not be signalled; a pattern kill was issued instead.
    PatternKilled,
}
