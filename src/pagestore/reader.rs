//! Read-only store access
//!
//! [`Store`] opens a file under a shared lock and never writes to it. Reads
//! happen inside a [`ReadTxn`], which pins the active meta and tracks which
//! bucket tree claimed each page so that a page shared by two trees is
//! reported as a fault rather than read twice.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use tracing::{debug, info};

use super::cursor::{Cursor, CursorEntry, PageClaims};
use super::errors::{FaultResult, PageFault, StoreError, StoreResult};
use super::file::PageFile;
use super::lock::{FileLock, LockMode};
use super::options::OpenOptions;
use super::page::{decode_bucket_value, Meta, PageKind, Pgid, DEFAULT_PAGE_SIZE};
use crate::path::BucketPath;

/// Handle to a bucket: the root page of its B+tree.
///
/// Handles built from a nested-bucket marker are distinct from the handle
/// returned by [`ReadTxn::root`], even when both name the same page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketRef {
    root: Pgid,
    is_store_root: bool,
}

impl BucketRef {
    /// Handle for the bucket rooted at `root`, as read from a marker.
    pub fn new(root: Pgid) -> Self {
        Self {
            root,
            is_store_root: false,
        }
    }

    pub fn root_pgid(&self) -> Pgid {
        self.root
    }

    /// True for the root bucket handle of a transaction
    pub fn is_store_root(&self) -> bool {
        self.is_store_root
    }
}

/// Decoded view of one page, for inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub pgid: Pgid,
    pub kind: PageKind,
    pub count: usize,
    pub overflow: u32,
    /// Child pages of a branch page, in key order
    pub children: Vec<Pgid>,
    /// Root pages of nested buckets marked on a leaf page
    pub buckets: Vec<Pgid>,
}

/// A fault found by [`Store::check`], with the bucket it was found in.
#[derive(Debug)]
pub struct CheckFault {
    pub path: BucketPath,
    pub fault: PageFault,
}

impl fmt::Display for CheckFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.fault)
    }
}

/// Store opened read-only.
#[derive(Debug)]
pub struct Store {
    file: PageFile,
    meta: Meta,
    _lock: FileLock,
}

impl Store {
    /// Opens an existing store read-only.
    ///
    /// # Errors
    ///
    /// All open errors are FATAL: missing file, lock timeout, no valid meta
    /// page, or (with `strict`) any structural fault.
    pub fn open(path: &Path, options: OpenOptions) -> StoreResult<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .open(path)
            .map_err(|e| StoreError::io_error(format!("Failed to open store: {}", path.display()), e))?;
        let lock = FileLock::acquire(&file, path, LockMode::Shared, options.timeout)?;

        let mut file = PageFile::new(path, file, DEFAULT_PAGE_SIZE);
        let meta = file.load_meta()?;

        let store = Self {
            file,
            meta,
            _lock: lock,
        };

        if options.strict {
            let faults = store.check();
            if let Some(first) = faults.first() {
                return Err(StoreError::integrity_failed(format!(
                    "{} structural fault(s) in {}; first: {}",
                    faults.len(),
                    path.display(),
                    first
                )));
            }
        }

        info!(
            path = %path.display(),
            page_size = meta.page_size,
            txid = meta.txid,
            high_water = meta.high_water,
            strict = options.strict,
            "opened store read-only"
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn page_size(&self) -> u32 {
        self.meta.page_size
    }

    /// Starts a read transaction against the active meta.
    pub fn begin_read(&self) -> ReadTxn<'_> {
        ReadTxn {
            file: &self.file,
            meta: self.meta,
            claims: RefCell::new(HashMap::new()),
            // The root tree is owned by the root handle; a marker naming it
            // is a multiple reference.
            opened: RefCell::new(HashSet::from([self.meta.root])),
        }
    }

    /// Walks every bucket at every depth and returns all faults found.
    ///
    /// A fault stops the walk of the bucket it was found in; buckets already
    /// walked and sibling buckets are still checked.
    pub fn check(&self) -> Vec<CheckFault> {
        let txn = self.begin_read();
        let mut faults = Vec::new();
        check_bucket(&txn, txn.root(), BucketPath::root(), &mut faults);
        debug!(path = %self.path().display(), faults = faults.len(), "integrity check complete");
        faults
    }
}

fn check_bucket(txn: &ReadTxn<'_>, bucket: BucketRef, path: BucketPath, faults: &mut Vec<CheckFault>) {
    let mut children = Vec::new();
    let mut cursor = txn.cursor(bucket);
    loop {
        match cursor.next_entry() {
            Ok(Some(CursorEntry::Bucket { key, root })) => {
                children.push((path.child(key), BucketRef::new(root)));
            }
            Ok(Some(CursorEntry::Value { .. })) => {}
            Ok(None) => break,
            Err(fault) => {
                faults.push(CheckFault {
                    path: path.clone(),
                    fault,
                });
                break;
            }
        }
    }
    for (child_path, child) in children {
        check_bucket(txn, child, child_path, faults);
    }
}

/// Read transaction over a [`Store`].
#[derive(Debug)]
pub struct ReadTxn<'s> {
    file: &'s PageFile,
    meta: Meta,
    claims: PageClaims,
    opened: RefCell<HashSet<Pgid>>,
}

impl<'s> ReadTxn<'s> {
    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// The root bucket, whose entries are the top-level buckets.
    pub fn root(&self) -> BucketRef {
        BucketRef {
            root: self.meta.root,
            is_store_root: true,
        }
    }

    /// Cursor over the direct entries of `bucket`.
    ///
    /// The root handle may be listed any number of times. Any other tree may
    /// be walked once per transaction; a second cursor over it, or a marker
    /// pointing back at the root tree, reports a multiple-reference fault.
    /// This also breaks cycles between buckets.
    pub fn cursor(&self, bucket: BucketRef) -> Cursor<'_> {
        let high_water = self.meta.high_water;
        if !bucket.is_store_root && !self.opened.borrow_mut().insert(bucket.root) {
            return Cursor::faulted(
                self.file,
                high_water,
                bucket.root,
                PageFault::MultipleReference { pgid: bucket.root },
            );
        }
        Cursor::new(self.file, high_water, bucket.root, Some(&self.claims))
    }

    /// Looks up the nested bucket `name` inside `parent`.
    ///
    /// Returns `Ok(None)` when the key is absent or holds a plain value.
    pub fn bucket(&self, parent: BucketRef, name: &[u8]) -> FaultResult<Option<BucketRef>> {
        let high_water = self.meta.high_water;
        let mut seen = HashSet::new();
        let mut pgid = parent.root;
        loop {
            if !seen.insert(pgid) {
                return Err(PageFault::MultipleReference { pgid });
            }
            let page = self.file.read_page(pgid, high_water)?;

            if page.is_leaf() {
                for index in 0..page.count() {
                    let element = page.leaf_element(index)?;
                    if element.key == name {
                        if !element.is_bucket() {
                            return Ok(None);
                        }
                        let root = decode_bucket_value(pgid, element.value)?;
                        return Ok(Some(BucketRef::new(root)));
                    }
                }
                return Ok(None);
            }

            if page.count() == 0 {
                return Err(PageFault::malformed(pgid, "empty branch page"));
            }
            let mut next = page.branch_element(0)?.pgid;
            for index in 1..page.count() {
                let element = page.branch_element(index)?;
                if element.key > name {
                    break;
                }
                next = element.pgid;
            }
            pgid = next;
        }
    }

    /// Resolves a bucket path from the root.
    pub fn bucket_at(&self, path: &BucketPath) -> FaultResult<Option<BucketRef>> {
        let mut bucket = self.root();
        for name in path.segments() {
            match self.bucket(bucket, name)? {
                Some(child) => bucket = child,
                None => return Ok(None),
            }
        }
        Ok(Some(bucket))
    }

    /// Decodes the page `pgid` without claiming it.
    pub fn page_info(&self, pgid: Pgid) -> FaultResult<PageInfo> {
        let page = self.file.read_page(pgid, self.meta.high_water)?;
        let mut info = PageInfo {
            pgid,
            kind: page.header().kind(),
            count: page.count(),
            overflow: page.header().overflow,
            children: Vec::new(),
            buckets: Vec::new(),
        };
        for index in 0..page.count() {
            if page.is_leaf() {
                let element = page.leaf_element(index)?;
                if element.is_bucket() {
                    info.buckets.push(decode_bucket_value(pgid, element.value)?);
                }
            } else {
                info.children.push(page.branch_element(index)?.pgid);
            }
        }
        Ok(info)
    }
}
