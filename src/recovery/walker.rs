//! Fault-isolating walk of the bucket hierarchy
//!
//! Each call that enumerates one bucket's direct entries is its own fault
//! boundary. A fault (an error from the cursor, or a panic raised while
//! decoding) stops that enumeration only: entries staged so far are kept,
//! the bucket is marked faulted, and the caller carries on with its own
//! remaining entries. Sub-buckets are walked inside the parent's enumeration
//! but behind their own boundary, so the parent never sees a child's fault.
//!
//! While a boundary is active on a thread, the panic hook logs the panic at
//! debug level instead of printing it; the diagnostic reaches the fault
//! record either way. Panics outside a boundary go to the previous hook.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

use tracing::{debug, warn};

use super::source::{EntryCursor, RawEntry, SourceFault, SourceStore};
use super::staged::{FaultRecord, StagedEntry, StagedSubtree};
use crate::path::BucketPath;

/// Default number of bucket levels walked: a top-level bucket and its
/// direct sub-buckets.
pub const DEFAULT_MAX_LEVELS: usize = 2;

/// Top-level bucket names read from the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopLevelListing {
    pub names: Vec<Vec<u8>>,
    /// Set when listing stopped early; `names` holds what was read before
    pub fault: Option<FaultRecord>,
}

/// Walks buckets of a [`SourceStore`] into [`StagedSubtree`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Walker {
    max_levels: Option<usize>,
}

impl Default for Walker {
    fn default() -> Self {
        Self::new(Some(DEFAULT_MAX_LEVELS))
    }
}

enum Outcome {
    Complete,
    Fault(String),
}

impl Walker {
    /// `max_levels` counts bucket levels from the top-level bucket (level 1).
    /// `None` walks every level.
    pub fn new(max_levels: Option<usize>) -> Self {
        Self { max_levels }
    }

    pub fn max_levels(&self) -> Option<usize> {
        self.max_levels
    }

    fn descends_into(&self, level: usize) -> bool {
        !matches!(self.max_levels, Some(max) if level > max)
    }

    /// Lists the names of the top-level buckets in native order.
    pub fn list_top_level<S: SourceStore>(&self, source: &S) -> TopLevelListing {
        let root = BucketPath::root();
        let mut names = Vec::new();

        let outcome = contain(|| {
            let mut cursor = source.entries(&source.root());
            while let Some(entry) = cursor.next_entry()? {
                match entry {
                    RawEntry::Bucket { key, .. } => names.push(key.to_vec()),
                    RawEntry::Value { key, .. } => {
                        debug!(key = %key.escape_ascii(), "ignoring plain value in root bucket");
                    }
                }
            }
            Ok(())
        });

        let fault = match outcome {
            Outcome::Complete => None,
            Outcome::Fault(diagnostic) => {
                warn!(listed = names.len(), %diagnostic, "listing top-level buckets stopped early");
                Some(FaultRecord {
                    path: root,
                    diagnostic,
                    entries_staged: names.len(),
                })
            }
        };
        TopLevelListing { names, fault }
    }

    /// Recovers the top-level bucket `name` and its sub-buckets.
    ///
    /// A bucket that cannot be located yields an empty, faulted subtree.
    pub fn recover_top_level<S: SourceStore>(&self, source: &S, name: &[u8]) -> StagedSubtree {
        let path = BucketPath::top_level(name);
        let handle = match contain_value(|| source.top_level_bucket(name)) {
            Ok(handle) => handle,
            Err(diagnostic) => {
                warn!(bucket = %path, %diagnostic, "cannot open top-level bucket");
                let mut staged = StagedSubtree::new(path.clone());
                staged.fault = Some(FaultRecord {
                    path,
                    diagnostic,
                    entries_staged: 0,
                });
                return staged;
            }
        };
        self.recover(source, &handle, path, 1)
    }

    /// Recovers one bucket at `level`, behind its own fault boundary.
    pub fn recover<S: SourceStore>(
        &self,
        source: &S,
        handle: &S::Handle,
        path: BucketPath,
        level: usize,
    ) -> StagedSubtree {
        let mut staged = StagedSubtree::new(path);

        let outcome = contain(|| self.enumerate(source, handle, level, &mut staged));

        if let Outcome::Fault(diagnostic) = outcome {
            warn!(
                bucket = %staged.path,
                staged = staged.staged_len(),
                %diagnostic,
                "bucket enumeration faulted"
            );
            staged.fault = Some(FaultRecord {
                path: staged.path.clone(),
                diagnostic,
                entries_staged: staged.staged_len(),
            });
        }
        staged
    }

    fn enumerate<S: SourceStore>(
        &self,
        source: &S,
        handle: &S::Handle,
        level: usize,
        staged: &mut StagedSubtree,
    ) -> Result<(), SourceFault> {
        let mut cursor = source.entries(handle);
        while let Some(entry) = cursor.next_entry()? {
            match entry {
                RawEntry::Value { key, value } => staged.entries.push(StagedEntry {
                    key: key.to_vec(),
                    value: value.to_vec(),
                }),
                RawEntry::Bucket { key, handle } => {
                    let child_path = staged.path.child(key);
                    if self.descends_into(level + 1) {
                        let child = self.recover(source, &handle, child_path, level + 1);
                        staged.children.push(child);
                    } else {
                        debug!(bucket = %child_path, "nested bucket beyond depth limit skipped");
                        staged.skipped_nested += 1;
                    }
                }
            }
        }
        Ok(())
    }
}

fn contain<F>(walk: F) -> Outcome
where
    F: FnOnce() -> Result<(), SourceFault>,
{
    match contain_value(walk) {
        Ok(()) => Outcome::Complete,
        Err(diagnostic) => Outcome::Fault(diagnostic),
    }
}

thread_local! {
    /// Fault boundaries currently active on this thread
    static BOUNDARIES: Cell<usize> = const { Cell::new(0) };
}

static PANIC_HOOK: Once = Once::new();

fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if BOUNDARIES.with(Cell::get) > 0 {
                debug!(panic = %info, "contained panic");
            } else {
                previous(info);
            }
        }));
    });
}

/// Runs `f`, turning both its error and any panic into a diagnostic.
fn contain_value<T, F>(f: F) -> Result<T, String>
where
    F: FnOnce() -> Result<T, SourceFault>,
{
    install_panic_hook();
    BOUNDARIES.with(|depth| depth.set(depth.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    BOUNDARIES.with(|depth| depth.set(depth.get() - 1));

    match result {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(fault)) => Err(fault.to_string()),
        Err(payload) => Err(format!("panic: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic payload"
    }
}
