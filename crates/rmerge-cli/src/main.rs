//! # rmerge CLI
//!
//! Command-line interface for repository fragment reconciliation.
//!
//! This binary provides human-friendly access to `rmerge-core` functionality.
//! Run `rmerge --help` for usage information.

mod cli;
pub mod ui;

use std::process::ExitCode;

fn main() -> ExitCode {
    cli::run()
}
