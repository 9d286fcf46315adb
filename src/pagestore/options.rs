//! Open and create options

use std::time::Duration;

use super::errors::{StoreError, StoreResult};
use super::page::{is_valid_page_size, DEFAULT_PAGE_SIZE};

/// Default time to wait for a file lock
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Options for opening an existing store read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// How long to wait for the shared file lock. Zero waits forever.
    pub timeout: Duration,
    /// Walk every page on open and refuse the store if any fault is found.
    pub strict: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_OPEN_TIMEOUT,
            strict: true,
        }
    }
}

impl OpenOptions {
    /// Relaxed options for reading a damaged store: no verification on
    /// open, faults surface lazily during traversal.
    pub fn salvage() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Options for creating a fresh store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOptions {
    /// How long to wait for the exclusive file lock. Zero waits forever.
    pub timeout: Duration,
    /// Page size of the new file
    pub page_size: u32,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_OPEN_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl CreateOptions {
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub(crate) fn validate(&self) -> StoreResult<()> {
        if !is_valid_page_size(self.page_size) {
            return Err(StoreError::invalid_option(format!(
                "page size {} must be a power of two between 512 and 65536",
                self.page_size
            )));
        }
        Ok(())
    }
}
