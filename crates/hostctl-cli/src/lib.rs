//! Command-line entry point for hostctl.
//!
//! `hostctl serve` runs the web adapter; `hostctl jobs` reads and updates
//! the same job records offline.

pub mod commands;
pub mod config;
pub mod handlers;
pub mod logging;
pub mod parser;

pub use commands::{Commands, JobCommand};
pub use config::{CliConfig, load_settings};
pub use logging::init_tracing;
pub use parser::Cli;
