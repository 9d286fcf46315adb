//! Write side of a recovery
//!
//! Every staged top-level bucket is written in one transaction. A single
//! rejected put or bucket creation is skipped with a [`WriteWarning`]; a
//! FATAL store error abandons the transaction and ends the run.

use tracing::{debug, warn};

use super::staged::StagedSubtree;
use crate::pagestore::{StoreError, StoreResult};
use crate::path::{display_name, BucketPath};

/// A fresh store that recovered buckets are written into.
pub trait DestinationStore {
    type Txn<'t>: DestinationTxn
    where
        Self: 't;

    fn begin(&mut self) -> StoreResult<Self::Txn<'_>>;
}

/// Write transaction addressed by bucket path.
pub trait DestinationTxn {
    /// Creates the bucket at `path` if absent. Parents must exist.
    fn create_bucket(&mut self, path: &BucketPath) -> StoreResult<()>;

    fn put(&mut self, path: &BucketPath, key: &[u8], value: &[u8]) -> StoreResult<()>;

    fn commit(self) -> StoreResult<()>;
}

/// One skipped write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteWarning {
    /// Bucket written into, or the bucket that could not be created
    pub path: BucketPath,
    /// Key of the skipped put; `None` when the bucket itself was skipped
    pub key: Option<Vec<u8>>,
    pub diagnostic: String,
}

impl std::fmt::Display for WriteWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.key {
            Some(key) => write!(f, "{} key {}: {}", self.path, display_name(key), self.diagnostic),
            None => write!(f, "{}: {}", self.path, self.diagnostic),
        }
    }
}

/// Outcome of writing one staged subtree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    /// Puts that succeeded
    pub entries_written: usize,
    pub warnings: Vec<WriteWarning>,
}

/// Writes `subtree` and all its staged descendants in one transaction.
///
/// Faulted subtrees are written like any other; they simply hold less data.
///
/// # Errors
///
/// Returns the first FATAL error. The transaction is dropped uncommitted,
/// so nothing of this subtree reaches the destination.
pub fn commit_subtree<D: DestinationStore>(
    destination: &mut D,
    subtree: &StagedSubtree,
) -> StoreResult<WriteReport> {
    let mut txn = destination.begin()?;
    let mut report = WriteReport::default();
    write_subtree(&mut txn, subtree, &mut report)?;
    txn.commit()?;
    debug!(
        bucket = %subtree.path,
        written = report.entries_written,
        warnings = report.warnings.len(),
        "committed bucket"
    );
    Ok(report)
}

fn skip_or_escalate(
    error: StoreError,
    path: &BucketPath,
    key: Option<&[u8]>,
    report: &mut WriteReport,
) -> StoreResult<()> {
    if error.is_fatal() {
        return Err(error);
    }
    let warning = WriteWarning {
        path: path.clone(),
        key: key.map(<[u8]>::to_vec),
        diagnostic: error.to_string(),
    };
    warn!(%warning, "write skipped");
    report.warnings.push(warning);
    Ok(())
}

fn write_subtree<T: DestinationTxn>(
    txn: &mut T,
    subtree: &StagedSubtree,
    report: &mut WriteReport,
) -> StoreResult<()> {
    if let Err(error) = txn.create_bucket(&subtree.path) {
        return skip_or_escalate(error, &subtree.path, None, report);
    }

    for entry in &subtree.entries {
        match txn.put(&subtree.path, &entry.key, &entry.value) {
            Ok(()) => report.entries_written += 1,
            Err(error) => skip_or_escalate(error, &subtree.path, Some(&entry.key), report)?,
        }
    }

    for child in &subtree.children {
        write_subtree(txn, child, report)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod mock {
    //! In-memory destination that can be told to reject writes.

    use std::collections::BTreeMap;

    use super::*;

    pub type Contents = BTreeMap<(BucketPath, Vec<u8>), Vec<u8>>;

    #[derive(Debug, Default)]
    pub struct MockDestination {
        pub buckets: Vec<BucketPath>,
        pub committed: Contents,
        pub commits: usize,
        /// Keys whose put fails with ERROR severity
        pub reject_keys: Vec<Vec<u8>>,
        /// Keys whose put fails with FATAL severity
        pub fatal_keys: Vec<Vec<u8>>,
    }

    pub struct MockTxn<'t> {
        dest: &'t mut MockDestination,
        buckets: Vec<BucketPath>,
        staged: Contents,
    }

    impl DestinationStore for MockDestination {
        type Txn<'t> = MockTxn<'t>;

        fn begin(&mut self) -> StoreResult<MockTxn<'_>> {
            Ok(MockTxn {
                dest: self,
                buckets: Vec::new(),
                staged: Contents::new(),
            })
        }
    }

    impl DestinationTxn for MockTxn<'_> {
        fn create_bucket(&mut self, path: &BucketPath) -> StoreResult<()> {
            if path.name().is_some_and(<[u8]>::is_empty) {
                return Err(StoreError::key_required());
            }
            if !self.buckets.contains(path) {
                self.buckets.push(path.clone());
            }
            Ok(())
        }

        fn put(&mut self, path: &BucketPath, key: &[u8], value: &[u8]) -> StoreResult<()> {
            if self.dest.fatal_keys.iter().any(|k| k == key) {
                return Err(StoreError::io_error(
                    "disk full",
                    std::io::Error::new(std::io::ErrorKind::Other, "no space left on device"),
                ));
            }
            if self.dest.reject_keys.iter().any(|k| k == key) {
                return Err(StoreError::value_too_large(value.len()));
            }
            self.staged.insert((path.clone(), key.to_vec()), value.to_vec());
            Ok(())
        }

        fn commit(self) -> StoreResult<()> {
            let MockTxn {
                dest,
                buckets,
                staged,
            } = self;
            dest.buckets.extend(buckets);
            dest.committed.extend(staged);
            dest.commits += 1;
            Ok(())
        }
    }
}
