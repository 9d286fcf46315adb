//! Recovery events
//!
//! Events are explicit and typed. A run emits, in order:
//!
//! - `Started` once, then a `Fault` if listing the top-level buckets failed
//! - per top-level bucket: `BucketStarted`, zero or more `Fault`, zero or
//!   more `WriteWarning`, then `BucketFinished`
//! - `Finished` once

use std::fmt;

use crate::path::BucketPath;
use crate::recovery::{BucketOutcome, FaultRecord, RecoverySummary, WriteWarning};

/// Observable events of a recovery run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryEvent {
    /// Top-level buckets were listed
    Started { bucket_count: usize },
    /// A top-level bucket is about to be walked
    BucketStarted { path: BucketPath },
    /// A bucket enumeration was cut short
    Fault(FaultRecord),
    /// A single write to the destination was skipped
    WriteWarning(WriteWarning),
    /// A top-level bucket was staged and committed
    BucketFinished(BucketOutcome),
    /// Final tally
    Finished(RecoverySummary),
}

impl RecoveryEvent {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoveryEvent::Started { .. } => "RECOVERY_BEGIN",
            RecoveryEvent::BucketStarted { .. } => "BUCKET_BEGIN",
            RecoveryEvent::Fault(_) => "BUCKET_FAULT",
            RecoveryEvent::WriteWarning(_) => "WRITE_WARNING",
            RecoveryEvent::BucketFinished(_) => "BUCKET_COMPLETE",
            RecoveryEvent::Finished(_) => "RECOVERY_COMPLETE",
        }
    }

    /// Returns true if this event means data was lost to a fault
    pub fn is_fault(&self) -> bool {
        matches!(self, RecoveryEvent::Fault(_))
    }
}

impl fmt::Display for RecoveryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
