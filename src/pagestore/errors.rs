//! Page store error types
//!
//! Two families live here:
//!
//! - [`StoreError`]: failures of a store operation, each carrying a code and a
//!   severity. FATAL errors mean the store handle can no longer be trusted;
//!   ERROR severity is scoped to the single call that produced it.
//! - [`PageFault`]: structural violations found while walking pages. Faults
//!   are scoped to the walk that discovered them and never poison the handle.

use std::fmt;
use std::io;

use thiserror::Error;

use super::page::Pgid;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The call failed, the store remains usable
    Error,
    /// The store handle must be abandoned
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Store error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Disk I/O failure
    StoreIoError,
    /// File lock not acquired before the open timeout
    StoreOpenTimeout,
    /// Neither meta page is valid
    StoreInvalidMeta,
    /// Destination file already holds data
    StoreAlreadyExists,
    /// Strict open found structural faults, or a committed page failed to load
    StoreIntegrityFailed,
    /// Invalid option value
    StoreInvalidOption,
    /// Empty key on put or bucket creation
    StoreKeyRequired,
    /// Key longer than [`super::MAX_KEY_SIZE`]
    StoreKeyTooLarge,
    /// Value longer than [`super::MAX_VALUE_SIZE`]
    StoreValueTooLarge,
    /// Key exists with the other kind (value vs bucket)
    StoreIncompatibleValue,
}

impl StoreErrorCode {
    /// Returns the string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::StoreIoError => "STORE_IO_ERROR",
            StoreErrorCode::StoreOpenTimeout => "STORE_OPEN_TIMEOUT",
            StoreErrorCode::StoreInvalidMeta => "STORE_INVALID_META",
            StoreErrorCode::StoreAlreadyExists => "STORE_ALREADY_EXISTS",
            StoreErrorCode::StoreIntegrityFailed => "STORE_INTEGRITY_FAILED",
            StoreErrorCode::StoreInvalidOption => "STORE_INVALID_OPTION",
            StoreErrorCode::StoreKeyRequired => "STORE_KEY_REQUIRED",
            StoreErrorCode::StoreKeyTooLarge => "STORE_KEY_TOO_LARGE",
            StoreErrorCode::StoreValueTooLarge => "STORE_VALUE_TOO_LARGE",
            StoreErrorCode::StoreIncompatibleValue => "STORE_INCOMPATIBLE_VALUE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::StoreKeyRequired
            | StoreErrorCode::StoreKeyTooLarge
            | StoreErrorCode::StoreValueTooLarge
            | StoreErrorCode::StoreIncompatibleValue => Severity::Error,
            StoreErrorCode::StoreIoError
            | StoreErrorCode::StoreOpenTimeout
            | StoreErrorCode::StoreInvalidMeta
            | StoreErrorCode::StoreAlreadyExists
            | StoreErrorCode::StoreIntegrityFailed
            | StoreErrorCode::StoreInvalidOption => Severity::Fatal,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with full context
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl StoreError {
    fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Create a store I/O error
    pub fn io_error(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            source: Some(source),
            ..Self::new(StoreErrorCode::StoreIoError, message)
        }
    }

    /// Create an open timeout error
    pub fn open_timeout(path: &std::path::Path, timeout: std::time::Duration) -> Self {
        Self::new(
            StoreErrorCode::StoreOpenTimeout,
            format!("Timed out waiting for file lock on {}", path.display()),
        )
        .with_details(format!("timeout_ms: {}", timeout.as_millis()))
    }

    /// Create an invalid meta error
    pub fn invalid_meta(reason: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::StoreInvalidMeta, reason)
    }

    /// Create an already-exists error for a destination path
    pub fn already_exists(path: &std::path::Path) -> Self {
        Self::new(
            StoreErrorCode::StoreAlreadyExists,
            format!("Refusing to overwrite existing store: {}", path.display()),
        )
    }

    /// Create an integrity failure error
    pub fn integrity_failed(reason: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::StoreIntegrityFailed, reason)
    }

    /// Create an integrity failure from a page fault hit on a committed page
    pub fn from_fault(fault: PageFault) -> Self {
        match fault {
            PageFault::Io { pgid, source } => Self::io_error(format!("Failed to read page {}", pgid), source),
            other => Self::integrity_failed(other.to_string()),
        }
    }

    /// Create an invalid option error
    pub fn invalid_option(reason: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::StoreInvalidOption, reason)
    }

    /// Create a key required error
    pub fn key_required() -> Self {
        Self::new(StoreErrorCode::StoreKeyRequired, "Key required")
    }

    /// Create a key too large error
    pub fn key_too_large(len: usize) -> Self {
        Self::new(StoreErrorCode::StoreKeyTooLarge, "Key too large")
            .with_details(format!("key_len: {}", len))
    }

    /// Create a value too large error
    pub fn value_too_large(len: usize) -> Self {
        Self::new(StoreErrorCode::StoreValueTooLarge, "Value too large")
            .with_details(format!("value_len: {}", len))
    }

    /// Create an incompatible value error
    pub fn incompatible_value(reason: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::StoreIncompatibleValue, reason)
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns additional error details
    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    /// Returns whether the store handle must be abandoned
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.code.severity(),
            self.code.code(),
            self.message
        )?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, ": {}", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn std::error::Error + 'static))
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Structural violation found while walking pages.
#[derive(Debug, Error)]
pub enum PageFault {
    /// Page id lies outside the allocated region or past end of file
    #[error("page {pgid} unreachable (high water mark {high_water})")]
    Unreachable { pgid: Pgid, high_water: Pgid },

    /// Page header identifies itself as a different page
    #[error("page {expected} identifies itself as page {found}")]
    IdMismatch { expected: Pgid, found: Pgid },

    /// Header flags are not valid for a tree page
    #[error("page {pgid} has invalid flags {flags:#06x}")]
    InvalidFlags { pgid: Pgid, flags: u16 },

    /// Page reached twice in one walk, or owned by two bucket trees
    #[error("page {pgid} referenced more than once")]
    MultipleReference { pgid: Pgid },

    /// Element table or data spans fall outside the page
    #[error("page {pgid} malformed: {reason}")]
    Malformed { pgid: Pgid, reason: String },

    /// Keys did not strictly increase
    #[error("unsorted keys on page {pgid}")]
    UnsortedKeys { pgid: Pgid },

    /// Reading the page failed
    #[error("failed to read page {pgid}: {source}")]
    Io {
        pgid: Pgid,
        #[source]
        source: io::Error,
    },
}

impl PageFault {
    /// Page the fault was found on
    pub fn pgid(&self) -> Pgid {
        match self {
            PageFault::Unreachable { pgid, .. }
            | PageFault::InvalidFlags { pgid, .. }
            | PageFault::MultipleReference { pgid }
            | PageFault::Malformed { pgid, .. }
            | PageFault::UnsortedKeys { pgid }
            | PageFault::Io { pgid, .. } => *pgid,
            PageFault::IdMismatch { expected, .. } => *expected,
        }
    }

    pub(crate) fn malformed(pgid: Pgid, reason: impl Into<String>) -> Self {
        PageFault::Malformed {
            pgid,
            reason: reason.into(),
        }
    }
}

/// Result type for page walks
pub type FaultResult<T> = Result<T, PageFault>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_errors_are_not_fatal() {
        assert!(!StoreError::key_required().is_fatal());
        assert!(!StoreError::key_too_large(40_000).is_fatal());
        assert!(!StoreError::value_too_large(1 << 31).is_fatal());
        assert!(!StoreError::incompatible_value("bucket exists").is_fatal());
    }

    #[test]
    fn test_open_errors_are_fatal() {
        let err = StoreError::io_error("disk full", io::Error::new(io::ErrorKind::Other, "disk full"));
        assert!(err.is_fatal());
        assert!(StoreError::invalid_meta("bad magic").is_fatal());
        assert!(StoreError::already_exists(std::path::Path::new("/tmp/x.db")).is_fatal());
    }

    #[test]
    fn test_error_display_contains_code_and_details() {
        let err = StoreError::key_too_large(40_000);
        let display = err.to_string();
        assert!(display.contains("STORE_KEY_TOO_LARGE"));
        assert!(display.contains("ERROR"));
        assert!(display.contains("key_len: 40000"));
    }

    #[test]
    fn test_fault_reports_page() {
        let fault = PageFault::IdMismatch {
            expected: 7,
            found: 9,
        };
        assert_eq!(fault.pgid(), 7);
        assert_eq!(fault.to_string(), "page 7 identifies itself as page 9");
    }

    #[test]
    fn test_io_fault_converts_to_io_error() {
        let fault = PageFault::Io {
            pgid: 3,
            source: io::Error::new(io::ErrorKind::Other, "boom"),
        };
        let err = StoreError::from_fault(fault);
        assert_eq!(err.code(), StoreErrorCode::StoreIoError);
    }
}
