//! Page-structured hierarchical bucket store
//!
//! A single-file store of nested buckets. Every bucket, including the root
//! bucket that holds the top-level buckets, is a B+tree of fixed-size pages;
//! see [`page`] for the on-disk layout.
//!
//! Reading and writing are split:
//!
//! - [`Store`] opens a file read-only. Structural damage surfaces as
//!   [`PageFault`] values from a [`Cursor`] walking one bucket, scoped to that
//!   walk. `OpenOptions::default()` verifies every page on open and refuses a
//!   damaged file; [`OpenOptions::salvage`] skips that check so healthy
//!   regions stay readable.
//! - [`StoreWriter`] creates a fresh file and commits copy-on-write
//!   transactions. Pages are never overwritten once committed.
//!
//! There is no free list and no concurrent writer support.

mod checksum;
mod cursor;
mod errors;
mod file;
mod lock;
mod options;
pub mod page;
mod reader;
mod writer;

pub use cursor::{Cursor, CursorEntry};
pub use errors::{FaultResult, PageFault, Severity, StoreError, StoreErrorCode, StoreResult};
pub use options::{CreateOptions, OpenOptions, DEFAULT_OPEN_TIMEOUT};
pub use page::{PageKind, Pgid};
pub use reader::{BucketRef, CheckFault, PageInfo, ReadTxn, Store};
pub use writer::{BucketMut, StoreWriter, WriteTxn};

/// Longest key accepted by [`BucketMut::put`]
pub const MAX_KEY_SIZE: usize = 32768;

/// Longest value accepted by [`BucketMut::put`]
pub const MAX_VALUE_SIZE: usize = (1 << 31) - 2;
