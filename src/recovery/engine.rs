//! Recovery orchestration
//!
//! One pass, strictly sequential:
//!
//! 1. List the top-level buckets of the source
//! 2. For each bucket: stage it completely, then write it in one transaction
//! 3. Report the summary
//!
//! A top-level bucket is fully staged before any of it is written, and each
//! bucket is committed before the next one is read, so a crash mid-run
//! leaves every earlier bucket durably in the destination.

use std::path::Path;
use std::time::Duration;

use tracing::{error, info};

use super::destination::{commit_subtree, DestinationStore};
use super::errors::{RecoveryError, RecoveryResult};
use super::source::SourceStore;
use super::staged::FaultRecord;
use super::walker::{Walker, DEFAULT_MAX_LEVELS};
use crate::observability::{RecoveryEvent, Reporter};
use crate::pagestore::{CreateOptions, OpenOptions, Store, StoreError, StoreWriter, DEFAULT_OPEN_TIMEOUT};
use crate::path::BucketPath;

/// Options for a recovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryOptions {
    /// Bucket levels to walk, counting top-level buckets as level 1.
    /// `None` walks every level.
    pub max_levels: Option<usize>,
    /// Lock wait for both stores
    pub open_timeout: Duration,
    /// Page size of the destination; `None` uses the source's page size
    pub page_size: Option<u32>,
    /// Verify the source on open and refuse it if damaged
    pub strict_source: bool,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            max_levels: Some(DEFAULT_MAX_LEVELS),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            page_size: None,
            strict_source: false,
        }
    }
}

/// Result for one top-level bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketOutcome {
    pub path: BucketPath,
    /// Flat entries staged in this bucket and its descendants
    pub entries_staged: usize,
    /// Puts that reached the destination
    pub entries_written: usize,
    /// Staged sub-buckets at every depth
    pub sub_buckets: usize,
    pub skipped_nested: usize,
    pub write_warnings: usize,
    /// True if this bucket or any descendant recorded a fault
    pub faulted: bool,
}

/// Aggregate counts for a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoverySummary {
    /// Entries written to the destination
    pub entries_recovered: usize,
    /// Entries read from the source
    pub entries_staged: usize,
    /// Top-level buckets visited
    pub buckets_total: usize,
    /// Top-level buckets with at least one fault
    pub buckets_with_faults: usize,
    pub write_warnings: usize,
    pub skipped_nested: usize,
    /// Fault hit while listing the top-level buckets
    pub root_fault: Option<FaultRecord>,
}

impl RecoverySummary {
    /// True when nothing was lost to a fault. Write warnings and skipped
    /// nested buckets do not count.
    pub fn is_clean(&self) -> bool {
        self.buckets_with_faults == 0 && self.root_fault.is_none()
    }

    fn add(&mut self, outcome: &BucketOutcome) {
        self.entries_recovered += outcome.entries_written;
        self.entries_staged += outcome.entries_staged;
        self.buckets_total += 1;
        self.write_warnings += outcome.write_warnings;
        self.skipped_nested += outcome.skipped_nested;
        if outcome.faulted {
            self.buckets_with_faults += 1;
        }
    }
}

/// Copies every recoverable bucket of `source` into `destination`.
///
/// # Errors
///
/// Only FATAL destination errors end the run early. Buckets committed
/// before the error stay in the destination.
pub fn recover_store<S, D>(
    source: &S,
    destination: &mut D,
    options: &RecoveryOptions,
    reporter: &mut dyn Reporter,
) -> RecoveryResult<RecoverySummary>
where
    S: SourceStore,
    D: DestinationStore,
{
    let walker = Walker::new(options.max_levels);
    let listing = walker.list_top_level(source);

    reporter.report(&RecoveryEvent::Started {
        bucket_count: listing.names.len(),
    });
    if let Some(fault) = &listing.fault {
        reporter.report(&RecoveryEvent::Fault(fault.clone()));
    }

    let mut summary = RecoverySummary {
        root_fault: listing.fault,
        ..RecoverySummary::default()
    };

    for name in &listing.names {
        let path = BucketPath::top_level(name);
        reporter.report(&RecoveryEvent::BucketStarted { path: path.clone() });

        let staged = walker.recover_top_level(source, name);
        for fault in staged.faults() {
            reporter.report(&RecoveryEvent::Fault(fault.clone()));
        }

        let report = commit_subtree(destination, &staged).map_err(|source| {
            error!(bucket = %path, error = %source, "destination write failed");
            RecoveryError::DestinationWrite {
                bucket: path.clone(),
                source,
            }
        })?;
        for warning in &report.warnings {
            reporter.report(&RecoveryEvent::WriteWarning(warning.clone()));
        }

        let outcome = BucketOutcome {
            path,
            entries_staged: staged.total_entries(),
            entries_written: report.entries_written,
            sub_buckets: staged.total_buckets(),
            skipped_nested: staged.total_skipped(),
            write_warnings: report.warnings.len(),
            faulted: staged.has_faults(),
        };
        summary.add(&outcome);
        reporter.report(&RecoveryEvent::BucketFinished(outcome));
    }

    info!(
        recovered = summary.entries_recovered,
        buckets = summary.buckets_total,
        faulted = summary.buckets_with_faults,
        clean = summary.is_clean(),
        "recovery complete"
    );
    reporter.report(&RecoveryEvent::Finished(summary.clone()));
    Ok(summary)
}

/// Opens `source` read-only, creates `destination`, and recovers.
///
/// The destination is only created once the source has opened. Both stores
/// are closed when this returns, on every path.
pub fn recover_files(
    source: &Path,
    destination: &Path,
    options: &RecoveryOptions,
    reporter: &mut dyn Reporter,
) -> RecoveryResult<RecoverySummary> {
    let open = OpenOptions {
        timeout: options.open_timeout,
        strict: options.strict_source,
    };
    let store = Store::open(source, open).map_err(|e| RecoveryError::SourceOpen {
        path: source.to_path_buf(),
        source: e,
    })?;

    if is_same_file(source, destination) {
        return Err(RecoveryError::DestinationOpen {
            path: destination.to_path_buf(),
            source: StoreError::invalid_option("destination is the source store"),
        });
    }

    let create = CreateOptions::default()
        .with_page_size(options.page_size.unwrap_or(store.page_size()))
        .with_timeout(options.open_timeout);
    let mut writer = StoreWriter::create(destination, create).map_err(|e| RecoveryError::DestinationOpen {
        path: destination.to_path_buf(),
        source: e,
    })?;

    let txn = store.begin_read();
    recover_store(&txn, &mut writer, options, reporter)
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
