//! Command-line interface for event-stager.
//!
//! Provides the `run`, `filter` and `audit` commands.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};
