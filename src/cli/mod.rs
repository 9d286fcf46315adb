//! CLI module for bucket-salvage
//!
//! `bucket-salvage [OPTIONS] <SOURCE> <DEST>`
//!
//! Exit status:
//! - 0: every bucket recovered without a fault
//! - 1: the run completed but at least one fault cut a bucket short
//! - 2: fatal error (usage, config, store open, destination write)

mod args;
mod commands;
mod errors;

pub use args::Cli;
pub use commands::{exit_status, run, run_command, Config, EXIT_CLEAN, EXIT_FAULTED};
pub use errors::{CliError, CliErrorCode, CliResult, EXIT_FATAL};
