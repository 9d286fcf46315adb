//! Recovery error types
//!
//! Only conditions that end the whole run are errors here. Bucket-scoped
//! faults and write-scoped warnings are results, not errors.
//!
//! Error codes:
//! - SALVAGE_SOURCE_OPEN_FAILED (FATAL)
//! - SALVAGE_DESTINATION_OPEN_FAILED (FATAL)
//! - SALVAGE_DESTINATION_WRITE_FAILED (FATAL)

use std::path::PathBuf;

use thiserror::Error;

use crate::pagestore::StoreError;
use crate::path::BucketPath;

/// Run-level recovery failure. Every variant is FATAL.
#[derive(Debug, Error)]
pub enum RecoveryError {
    #[error("failed to open source store {}: {source}", .path.display())]
    SourceOpen {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("failed to create destination store {}: {source}", .path.display())]
    DestinationOpen {
        path: PathBuf,
        #[source]
        source: StoreError,
    },

    #[error("failed to write bucket {bucket} to destination: {source}")]
    DestinationWrite {
        bucket: BucketPath,
        #[source]
        source: StoreError,
    },
}

impl RecoveryError {
    /// Returns the string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryError::SourceOpen { .. } => "SALVAGE_SOURCE_OPEN_FAILED",
            RecoveryError::DestinationOpen { .. } => "SALVAGE_DESTINATION_OPEN_FAILED",
            RecoveryError::DestinationWrite { .. } => "SALVAGE_DESTINATION_WRITE_FAILED",
        }
    }

    /// Store error underneath
    pub fn store_error(&self) -> &StoreError {
        match self {
            RecoveryError::SourceOpen { source, .. }
            | RecoveryError::DestinationOpen { source, .. }
            | RecoveryError::DestinationWrite { source, .. } => source,
        }
    }
}

/// Result type for recovery runs
pub type RecoveryResult<T> = Result<T, RecoveryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_path() {
        let err = RecoveryError::SourceOpen {
            path: PathBuf::from("/data/corrupt.db"),
            source: StoreError::invalid_meta("no valid meta page"),
        };
        let text = err.to_string();
        assert!(text.contains("/data/corrupt.db"), "got: {}", text);
        assert!(text.contains("STORE_INVALID_META"), "got: {}", text);
        assert_eq!(err.code(), "SALVAGE_SOURCE_OPEN_FAILED");
    }

    #[test]
    fn test_write_error_names_the_bucket() {
        let err = RecoveryError::DestinationWrite {
            bucket: BucketPath::top_level(b"settings"),
            source: StoreError::integrity_failed("page 4 unreachable"),
        };
        assert!(err.to_string().contains("\"settings\""));
        assert!(err.store_error().is_fatal());
    }
}
