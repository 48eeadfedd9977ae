//! Domain layer: pure business logic, types, and validation.
//!
//! This module has zero imports from `crate::infra`, `crate::commands`,
//! `crate::application`, `tokio`, `std::fs`, `std::process`, or `std::net`.
//! All functions are synchronous and take data in, returning data out.

pub mod catalog;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod health;
pub mod module;
pub mod preflight;
pub mod service;
pub mod session;

pub use catalog::BundleSettings;
pub use cleanup::{CleanupPlan, CleanupReport, TeardownAction};
pub use config::{ConfigDocument, ConfigScalar, SourceSignature};
pub use error::{
    CleanupError, ConfigError, ModuleError, PreflightError, ServiceError, SessionError,
};
pub use module::{ActionSpec, Module, ModuleStatus, SessionReport, SessionStatus};
pub use preflight::{Finding, Severity};
pub use service::{Service, ServiceStatus, StartPolicy};
pub use session::SessionState;
