//! Application layer: port trait definitions and use-case orchestration.
//!
//! Depends on `crate::domain` and nothing else in the crate.

pub mod ports;
pub mod services;

pub use ports::{
    CommandRunner, LocalFs, LockProvider, ProgressReporter, ServiceHost, SessionLogStore,
    ToolLocator,
};
