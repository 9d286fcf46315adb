//! Read side of a recovery
//!
//! The walker only needs to list the entries of one bucket at a time and to
//! look up a top-level bucket by name. Byte spans handed out by a cursor may
//! point into storage the source reuses, so they are only valid until the
//! next call on that cursor; callers copy what they keep.

use thiserror::Error;

use crate::pagestore::PageFault;
use crate::path::BucketPath;

/// Why a bucket enumeration stopped early.
#[derive(Debug, Error)]
pub enum SourceFault {
    /// A listed bucket could not be located when descending into it
    #[error("bucket {0} not found")]
    BucketNotFound(BucketPath),

    /// Structural damage found by the page store
    #[error(transparent)]
    Page(#[from] PageFault),

    /// Fault raised by a source that is not a page store
    #[error("{0}")]
    Other(String),
}

/// Entry borrowed from a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEntry<'a, H> {
    Value { key: &'a [u8], value: &'a [u8] },
    Bucket { key: &'a [u8], handle: H },
}

/// Single-pass enumeration of one bucket's direct entries.
pub trait EntryCursor {
    type Handle;

    /// Next entry in native order, `Ok(None)` at the end. After an error the
    /// cursor yields nothing more.
    fn next_entry(&mut self) -> Result<Option<RawEntry<'_, Self::Handle>>, SourceFault>;
}

/// A store opened for reading.
pub trait SourceStore {
    /// Handle to one bucket
    type Handle: Clone;

    type Cursor<'c>: EntryCursor<Handle = Self::Handle>
    where
        Self: 'c;

    /// The bucket holding the top-level buckets
    fn root(&self) -> Self::Handle;

    /// Looks up a top-level bucket by name.
    fn top_level_bucket(&self, name: &[u8]) -> Result<Self::Handle, SourceFault>;

    /// Starts enumerating the direct entries of `bucket`.
    fn entries(&self, bucket: &Self::Handle) -> Self::Cursor<'_>;
}
