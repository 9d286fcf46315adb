//! bucket-salvage - fault-isolating recovery for damaged bucket stores
//!
//! Reads a page-structured, hierarchical key/value store that may be
//! partially corrupted and copies every bucket and entry it can still
//! reach into a fresh store. A fault in one bucket never costs another
//! bucket its data.
//!
//! - [`pagestore`]: the on-disk format, a lenient reader and a
//!   copy-on-write writer
//! - [`recovery`]: walking, staging and committing buckets
//! - [`observability`]: progress events, reporters and log setup
//! - [`cli`]: the `bucket-salvage` command

pub mod cli;
pub mod observability;
pub mod pagestore;
pub mod path;
pub mod recovery;
