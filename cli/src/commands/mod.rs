//! Command implementations

pub mod cleanup;
pub mod configure;
pub mod install;
pub mod service;
pub mod status;
pub mod verify;
pub mod version;

use std::process::ExitCode;

use clap::Args;

use crate::application::services::service_lifecycle::ServiceLifecycle;
use crate::domain::catalog::{self, BundleSettings};
use crate::domain::error::ServiceError;
use crate::domain::service::Service;
use crate::infra::command_runner::TokioCommandRunner;
use crate::infra::locator::PathLocator;
use crate::infra::lock::FileLocks;
use crate::infra::process::HostServices;

/// Arguments for the start and stop commands.
#[derive(Args, Default)]
pub struct ServiceArgs {
    /// Service to act on (default: every enabled service)
    pub service: Option<String>,
}

pub(crate) type HostLifecycle<'a> =
    ServiceLifecycle<'a, HostServices<'a, TokioCommandRunner>, PathLocator, FileLocks>;

/// Lifecycle manager whose per-service locks live in the state directory.
pub(crate) fn lifecycle<'a>(
    host: &'a HostServices<'a, TokioCommandRunner>,
    settings: &BundleSettings,
) -> HostLifecycle<'a> {
    ServiceLifecycle::new(host, &PathLocator, &FileLocks, settings.state_dir.clone())
}

/// The enabled services, or the single one named.
///
/// # Errors
///
/// Returns `ServiceError::Unknown` if `name` is not an enabled service.
pub fn select_services(
    settings: &BundleSettings,
    name: Option<&str>,
) -> Result<Vec<Service>, ServiceError> {
    let services = catalog::services(settings);
    let Some(name) = name else {
        return Ok(services);
    };
    let known = services
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    services
        .iter()
        .find(|s| s.name == name)
        .cloned()
        .map(|s| vec![s])
        .ok_or_else(|| ServiceError::Unknown {
            name: name.to_string(),
            known: if known.is_empty() { "(none enabled)".into() } else { known },
        })
}

/// `SUCCESS` when `ok`, otherwise exit code 1.
pub(crate) fn exit_code(ok: bool) -> ExitCode {
    if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE }
}
