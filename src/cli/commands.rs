//! CLI command implementation
//!
//! Settings come from, lowest precedence first: built-in defaults, the JSON
//! config file, then command-line flags.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::{init_tracing, ConsoleReporter, NullReporter, Reporter};
use crate::pagestore::page::is_valid_page_size;
use crate::recovery::{recover_files, RecoveryOptions, RecoverySummary, DEFAULT_MAX_LEVELS};

use super::args::Cli;
use super::errors::{CliError, CliResult};

/// Exit status when every bucket was recovered without a fault
pub const EXIT_CLEAN: i32 = 0;
/// Exit status when at least one fault cut a bucket short
pub const EXIT_FAULTED: i32 = 1;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Bucket levels to recover, top-level buckets are level 1.
    /// `null` recovers every level.
    #[serde(default = "default_max_levels")]
    pub max_levels: Option<usize>,

    /// Lock wait per store in milliseconds (0 waits forever)
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Destination page size (default: the source's)
    #[serde(default)]
    pub page_size: Option<u32>,

    /// Verify the source on open and refuse it if damaged
    #[serde(default)]
    pub strict_source: bool,
}

fn default_max_levels() -> Option<usize> {
    Some(DEFAULT_MAX_LEVELS)
}

fn default_open_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_levels: default_max_levels(),
            open_timeout_ms: default_open_timeout_ms(),
            page_size: None,
            strict_source: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config {}: {}", path.display(), e)))?;

        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;

        Ok(config)
    }

    /// Resolves the effective configuration for a command line.
    pub fn resolve(cli: &Cli) -> CliResult<Self> {
        let mut config = match &cli.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        if cli.unbounded {
            config.max_levels = None;
        } else if let Some(levels) = cli.max_levels {
            config.max_levels = Some(levels);
        }
        if let Some(ms) = cli.timeout_ms {
            config.open_timeout_ms = ms;
        }
        if cli.page_size.is_some() {
            config.page_size = cli.page_size;
        }
        config.strict_source |= cli.strict;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.max_levels == Some(0) {
            return Err(CliError::config_error(
                "max_levels must be >= 1 (use null or --unbounded for no limit)",
            ));
        }

        if let Some(page_size) = self.page_size {
            if !is_valid_page_size(page_size) {
                return Err(CliError::config_error(format!(
                    "Invalid page_size: {}. Must be a power of two between 512 and 65536.",
                    page_size
                )));
            }
        }

        Ok(())
    }

    /// Recovery options for this configuration
    pub fn recovery_options(&self) -> RecoveryOptions {
        RecoveryOptions {
            max_levels: self.max_levels,
            open_timeout: Duration::from_millis(self.open_timeout_ms),
            page_size: self.page_size,
            strict_source: self.strict_source,
        }
    }
}

/// Main entry point: parse arguments, set up logging, recover.
///
/// Returns the process exit status for a completed run.
pub fn run() -> CliResult<i32> {
    let cli = Cli::parse_args();
    // A subscriber may already be installed when embedded.
    let _ = init_tracing(cli.log_filter());
    run_command(&cli)
}

/// Runs a recovery for a parsed command line.
pub fn run_command(cli: &Cli) -> CliResult<i32> {
    let config = Config::resolve(cli)?;
    let options = config.recovery_options();

    let mut console;
    let mut null = NullReporter;
    let reporter: &mut dyn Reporter = if cli.quiet {
        &mut null
    } else {
        console = ConsoleReporter::stdout().with_destination(cli.destination.display().to_string());
        &mut console
    };

    let summary = recover_files(&cli.source, &cli.destination, &options, reporter)?;
    Ok(exit_status(&summary))
}

/// Exit status for a completed run
pub fn exit_status(summary: &RecoverySummary) -> i32 {
    if summary.is_clean() {
        EXIT_CLEAN
    } else {
        EXIT_FAULTED
    }
}

#[cfg(test)]
mod tests {
    use super::super::errors::CliErrorCode;
    use super::*;
    use crate::pagestore::{CreateOptions, OpenOptions, Store, StoreWriter};
    use crate::path::BucketPath;
    use clap::Parser;
    use serde_json::json;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_config(temp_dir: &TempDir, value: serde_json::Value) -> PathBuf {
        let path = temp_dir.path().join("salvage.json");
        fs::write(&path, value.to_string()).unwrap();
        path
    }

    fn cli(args: &[&str]) -> Cli {
        let mut argv = vec!["bucket-salvage"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    // =========================================================================
    // Config
    // =========================================================================

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.max_levels, Some(DEFAULT_MAX_LEVELS));
        assert_eq!(config.open_timeout_ms, 5000);
        assert_eq!(config.recovery_options(), RecoveryOptions::default());
    }

    #[test]
    fn test_config_load_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({ "max_levels": null, "page_size": 1024 }));

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_levels, None);
        assert_eq!(config.page_size, Some(1024));
        assert_eq!(config.open_timeout_ms, 5000);
    }

    #[test]
    fn test_config_rejects_bad_page_size() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({ "page_size": 1000 }));

        let err = Config::load(&path).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_config_rejects_unknown_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({ "max_level": 3 }));
        assert!(Config::load(&path).is_err());
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::load(Path::new("/nonexistent/salvage.json")).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    #[test]
    fn test_flags_override_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = write_config(&temp_dir, json!({ "max_levels": 4, "open_timeout_ms": 10 }));
        let path = path.to_str().unwrap();

        let config = Config::resolve(&cli(&["--config", path, "--unbounded", "src", "dst"])).unwrap();
        assert_eq!(config.max_levels, None);
        assert_eq!(config.open_timeout_ms, 10);

        let config = Config::resolve(&cli(&["--config", path, "--timeout-ms", "0", "src", "dst"])).unwrap();
        assert_eq!(config.max_levels, Some(4));
        assert_eq!(config.open_timeout_ms, 0);
    }

    #[test]
    fn test_zero_levels_rejected() {
        let err = Config::resolve(&cli(&["--max-levels", "0", "src", "dst"])).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::ConfigError);
    }

    // =========================================================================
    // Run
    // =========================================================================

    #[test]
    fn test_run_clean_store() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source.db");
        let dest = temp_dir.path().join("recovered.db");

        {
            let mut writer = StoreWriter::create(&source, CreateOptions::default().with_page_size(512)).unwrap();
            let mut txn = writer.begin_write();
            txn.create_bucket_if_not_exists(b"users")
                .unwrap()
                .put(b"alice", b"1")
                .unwrap();
            txn.commit().unwrap();
        }

        let args = cli(&["--quiet", source.to_str().unwrap(), dest.to_str().unwrap()]);
        assert_eq!(run_command(&args).unwrap(), EXIT_CLEAN);

        let store = Store::open(&dest, OpenOptions::default()).unwrap();
        assert_eq!(store.page_size(), 512);
        let txn = store.begin_read();
        assert!(txn.bucket_at(&BucketPath::top_level(b"users")).unwrap().is_some());
    }

    #[test]
    fn test_run_missing_source_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("missing.db");
        let dest = temp_dir.path().join("recovered.db");

        let args = cli(&["--quiet", source.to_str().unwrap(), dest.to_str().unwrap()]);
        let err = run_command(&args).unwrap_err();
        assert_eq!(err.code(), &CliErrorCode::SourceOpenFailed);
        assert!(!dest.exists());
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(&RecoverySummary::default()), EXIT_CLEAN);
        let faulted = RecoverySummary {
            buckets_with_faults: 1,
            ..Default::default()
        };
        assert_eq!(exit_status(&faulted), EXIT_FAULTED);
    }
}
