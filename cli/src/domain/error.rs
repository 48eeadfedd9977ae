//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All error types implement `thiserror::Error` and convert to `anyhow::Error`
//! via the `?` operator.

use std::path::PathBuf;

use thiserror::Error;

// ── Config errors ─────────────────────────────────────────────────────────────

/// Errors raised while evaluating the configuration source.
///
/// Never fatal: the store logs them once and falls back to defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("No evaluator for configuration source {}", path.display())]
    NoEvaluator { path: PathBuf },
}

// ── Preflight errors ──────────────────────────────────────────────────────────

/// Preflight produced at least one fatal finding.
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("Preflight failed:\n{}", findings.join("\n"))]
    Fatal { findings: Vec<String> },
}

// ── Module errors ─────────────────────────────────────────────────────────────

/// Errors related to module plans and module installation.
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("Module '{module}' failed to install{}:\n{output}", if *required { "" } else { " (optional)" })]
    InstallFailed {
        module: String,
        required: bool,
        output: String,
    },

    #[error("Module '{module}' installed but verification failed:\n{output}")]
    VerifyFailed { module: String, output: String },

    #[error("Module '{0}' is declared more than once.")]
    DuplicateModule(String),

    #[error("Module '{module}' depends on undeclared module '{dependency}'.")]
    UnknownDependency { module: String, dependency: String },

    #[error("Module '{module}' requires '{dependency}', which was not installed.")]
    DependencyNotInstalled { module: String, dependency: String },
}

// ── Service errors ────────────────────────────────────────────────────────────

/// Service lifecycle conditions. Each is reported distinctly to the caller.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service '{name}' is already running (pid {pid}).")]
    AlreadyRunning { name: String, pid: u32 },

    #[error("Port {port} for '{name}' is held by another process{}.", describe_owner(*pid, command.as_deref()))]
    PortOccupiedByOther {
        name: String,
        port: u16,
        pid: Option<u32>,
        command: Option<String>,
    },

    #[error("Service '{0}' is not running.")]
    NotRunning(String),

    #[error("Service '{name}' was launched (pid {pid}) but is not running. Check {}", log.display())]
    StartUnconfirmed { name: String, pid: u32, log: PathBuf },

    #[error("Service '{name}' (pid {pid}) did not exit within {seconds}s.")]
    StopTimedOut { name: String, pid: u32, seconds: u64 },

    #[error("Another start/stop of '{0}' is in progress.")]
    ServiceBusy(String),

    #[error("Cannot find the '{name}' binary. Looked in:\n{}", searched.join("\n"))]
    BinaryNotFound { name: String, searched: Vec<String> },

    #[error("Unknown service '{name}'. Known services: {known}")]
    Unknown { name: String, known: String },
}

fn describe_owner(pid: Option<u32>, command: Option<&str>) -> String {
    match (pid, command) {
        (Some(pid), Some(cmd)) => format!(" (pid {pid}: {cmd})"),
        (Some(pid), None) => format!(" (pid {pid})"),
        _ => String::new(),
    }
}

// ── Cleanup errors ────────────────────────────────────────────────────────────

/// Errors raised by teardown steps.
#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("Cleanup step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    #[error("Removing {} requires root privileges. Re-run with sudo.", path.display())]
    PrivilegeRequired { path: PathBuf },
}

// ── Session errors ────────────────────────────────────────────────────────────

/// Errors related to the installation session itself.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Another installation session is active{}. Lock: {}", holder.map(|p| format!(" (pid {p})")).unwrap_or_default(), path.display())]
    LockHeld { path: PathBuf, holder: Option<u32> },

    #[error("Installation cancelled by signal.")]
    Cancelled,
}
