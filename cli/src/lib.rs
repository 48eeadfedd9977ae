//! Black Berets bundle orchestrator library.
//!
//! The binary is a thin wrapper; modules are public so integration tests can drive them.

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod app;
pub mod application;
pub mod cli;
pub mod commands;
pub mod domain;
pub mod infra;
pub mod output;
