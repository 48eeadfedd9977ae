//! JSON output helpers.
//!
//! Provides the error-object formatter used by all `--json` code paths when
//! a command fails, and `JsonRenderer` for successful results. Everything is
//! pretty-printed to stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};

use crate::application::services::installation::InstallOutcome;
use crate::domain::cleanup::CleanupReport;
use crate::domain::error::{
    CleanupError, ConfigError, ModuleError, PreflightError, ServiceError, SessionError,
};
use crate::domain::module::VerifyReport;
use crate::domain::service::ServiceStatus;
use crate::domain::session::SessionLog;

/// Format a JSON error object.
///
/// Output (pretty-printed):
/// ```json
/// {
///   "error": true,
///   "message": "...",
///   "code": "..."
/// }
/// ```
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn format_error(message: &str, code: &str) -> Result<String> {
    let obj = json!({
        "error": true,
        "message": message,
        "code": code,
    });
    serde_json::to_string_pretty(&obj).context("JSON serialization failed")
}

/// Stable machine-readable code for the outermost domain error in `err`.
#[must_use]
pub fn error_code(err: &anyhow::Error) -> &'static str {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<ServiceError>() {
            return match e {
                ServiceError::AlreadyRunning { .. } => "ALREADY_RUNNING",
                ServiceError::PortOccupiedByOther { .. } => "PORT_OCCUPIED",
                ServiceError::NotRunning(_) => "NOT_RUNNING",
                ServiceError::StartUnconfirmed { .. } => "START_UNCONFIRMED",
                ServiceError::StopTimedOut { .. } => "STOP_TIMED_OUT",
                ServiceError::ServiceBusy(_) => "SERVICE_BUSY",
                ServiceError::BinaryNotFound { .. } => "BINARY_NOT_FOUND",
                ServiceError::Unknown { .. } => "UNKNOWN_SERVICE",
            };
        }
        if let Some(e) = cause.downcast_ref::<SessionError>() {
            return match e {
                SessionError::LockHeld { .. } => "SESSION_LOCKED",
                SessionError::Cancelled => "CANCELLED",
            };
        }
        if cause.downcast_ref::<PreflightError>().is_some() {
            return "PREFLIGHT_FAILED";
        }
        if let Some(e) = cause.downcast_ref::<ModuleError>() {
            return match e {
                ModuleError::InstallFailed { .. } => "INSTALL_FAILED",
                ModuleError::VerifyFailed { .. } => "VERIFY_FAILED",
                _ => "INVALID_PLAN",
            };
        }
        if let Some(e) = cause.downcast_ref::<CleanupError>() {
            return match e {
                CleanupError::StepFailed { .. } => "CLEANUP_STEP_FAILED",
                CleanupError::PrivilegeRequired { .. } => "PRIVILEGE_REQUIRED",
            };
        }
        if cause.downcast_ref::<ConfigError>().is_some() {
            return "CONFIG_UNAVAILABLE";
        }
    }
    "ERROR"
}

/// One entry per service: the value on success, the error message otherwise.
///
/// # Errors
///
/// Returns an error if a value cannot be serialized.
pub fn service_results<T: Serialize>(results: &[(String, Result<T>)]) -> Result<Value> {
    results
        .iter()
        .map(|(name, result)| {
            Ok(match result {
                Ok(value) => json!({
                    "service": name,
                    "ok": true,
                    "result": serde_json::to_value(value).context("JSON serialization failed")?,
                }),
                Err(e) => json!({
                    "service": name,
                    "ok": false,
                    "error": format!("{e:#}"),
                }),
            })
        })
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

/// Machine-readable renderer selected by `--json`.
pub struct JsonRenderer;

impl JsonRenderer {
    fn print(value: &Value) -> Result<()> {
        println!(
            "{}",
            serde_json::to_string_pretty(value).context("JSON serialization failed")?
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_version(&self, version: &str) -> Result<()> {
        Self::print(&json!({ "version": version }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_session(&self, outcome: &InstallOutcome) -> Result<()> {
        Self::print(&json!({
            "state": outcome.state,
            "status": outcome.report.status(),
            "tally": outcome.report.tally(),
            "report": outcome.report,
            "findings": outcome.findings,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_configured(&self, written: &[PathBuf]) -> Result<()> {
        Self::print(&json!({ "written": written }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_service_results<T: Serialize>(
        &self,
        action: &str,
        results: &[(String, Result<T>)],
    ) -> Result<()> {
        let mut obj = serde_json::Map::new();
        obj.insert(action.to_string(), service_results(results)?);
        Self::print(&Value::Object(obj))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_status(
        &self,
        services: &[(String, Result<ServiceStatus>)],
        last_session: Option<&SessionLog>,
    ) -> Result<()> {
        Self::print(&json!({
            "services": service_results(services)?,
            "last_session": last_session,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_verify(
        &self,
        report: &VerifyReport,
        services: &[(String, Result<ServiceStatus>)],
    ) -> Result<()> {
        Self::print(&json!({
            "modules": report.modules,
            "health": report.health,
            "tally": report.tally(),
            "services": service_results(services)?,
        }))
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn render_cleanup(&self, report: &CleanupReport) -> Result<()> {
        Self::print(&json!({
            "modules": report.modules.steps,
            "modules_tally": report.modules.tally(),
            "shared": report.shared.steps,
            "shared_tally": report.shared.tally(),
            "critical_failure": report.critical_failure,
        }))
    }
}
