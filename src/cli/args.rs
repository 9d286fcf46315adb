//! CLI argument definitions using clap
//!
//! bucket-salvage [OPTIONS] <SOURCE> <DEST>

use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// Salvage every readable bucket of a damaged store into a fresh one
#[derive(Parser, Debug)]
#[command(name = "bucket-salvage")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Damaged store to read (opened read-only)
    pub source: PathBuf,

    /// New store to write recovered buckets into (must not exist or be empty)
    pub destination: PathBuf,

    /// Path to a JSON configuration file
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bucket levels to recover, counting top-level buckets as 1
    #[arg(long, conflicts_with = "unbounded")]
    pub max_levels: Option<usize>,

    /// Recover nested buckets at every depth
    #[arg(long)]
    pub unbounded: bool,

    /// Milliseconds to wait for each store's file lock (0 waits forever)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Page size of the destination store (default: same as the source)
    #[arg(long)]
    pub page_size: Option<u32>,

    /// Verify the source on open and refuse it if damaged
    #[arg(long)]
    pub strict: bool,

    /// Suppress progress output
    #[arg(short, long)]
    pub quiet: bool,

    /// More diagnostics on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Log filter used when `RUST_LOG` is unset
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => crate::observability::DEFAULT_LOG_FILTER,
            1 => "info",
            _ => "debug",
        }
    }
}
