//! Salvage engine
//!
//! Copies every readable bucket of a damaged store into a fresh one.
//!
//! # Run sequence (strict order)
//!
//! 1. Open the source read-only
//! 2. Create the destination
//! 3. List top-level buckets
//! 4. Per bucket: stage into memory, then commit in one write transaction
//! 5. Report the summary
//!
//! # Fault isolation
//!
//! A fault while reading one bucket stops that bucket's enumeration only.
//! Entries read before the fault are kept, siblings and other top-level
//! buckets are unaffected. Faults are values ([`FaultRecord`]), never
//! process aborts.

mod adapters;
mod destination;
mod engine;
mod errors;
mod source;
mod staged;
mod walker;

pub use destination::{commit_subtree, DestinationStore, DestinationTxn, WriteReport, WriteWarning};
pub use engine::{recover_files, recover_store, BucketOutcome, RecoveryOptions, RecoverySummary};
pub use errors::{RecoveryError, RecoveryResult};
pub use source::{EntryCursor, RawEntry, SourceFault, SourceStore};
pub use staged::{FaultRecord, StagedEntry, StagedSubtree};
pub use walker::{TopLevelListing, Walker, DEFAULT_MAX_LEVELS};
