//! Command-line interface for yamon-ci.
//!
//! Provides commands for single builds, full-matrix builds, routing stored
//! webhook deliveries, and running the webhook server.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
