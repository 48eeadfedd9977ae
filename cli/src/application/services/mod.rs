//! Application services: use-case orchestration.
//!
//! One module per use-case. A service drives domain rules through the port
//! traits and reaches the host only through them.

pub mod artifacts;
pub mod cleanup;
pub mod config_store;
pub mod configure;
pub mod health;
pub mod installation;
pub mod module_installer;
pub mod preflight;
pub mod service_lifecycle;
