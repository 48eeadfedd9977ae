//! Host adapters: one module per port family, each implementing the
//! application traits over real processes, files and sockets.
//!
//! Nothing here imports `crate::commands` or `crate::output`.

pub mod command_runner;
pub mod evaluator;
pub mod fetch;
pub mod fs;
pub mod locator;
pub mod lock;
pub mod network;
pub mod process;
pub mod state;
