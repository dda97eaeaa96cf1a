//! Command-line interface for careforge.
//!
//! Provides one subcommand per pipeline stage plus `run` for the full
//! weekly sequence.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli};
