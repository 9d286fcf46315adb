//! Copy-on-write store writer
//!
//! A [`WriteTxn`] stages changes in memory. Buckets are loaded from disk only
//! when the transaction touches them; untouched buckets keep their existing
//! pages. On commit every touched bucket is encoded into fresh pages appended
//! past the high-water mark, the pages are fsynced, and only then is the
//! alternate meta page written and fsynced. A crash at any point before the
//! second fsync leaves the previous commit as the active one.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info};

use super::cursor::{Cursor, CursorEntry};
use super::errors::{StoreError, StoreResult};
use super::file::PageFile;
use super::lock::{FileLock, LockMode};
use super::options::CreateOptions;
use super::page::{
    branch_item_size, encode_branch, encode_leaf, leaf_item_size, pages_for, BranchItem, LeafItem,
    Meta, Pgid, BUCKET_LEAF_FLAG, PAGE_HEADER_SIZE,
};
use super::{MAX_KEY_SIZE, MAX_VALUE_SIZE};
use crate::path::BucketPath;

/// First page after the two meta pages
const FIRST_DATA_PAGE: Pgid = 2;

/// Store opened for writing.
///
/// Only fresh stores can be written; see [`StoreWriter::create`].
#[derive(Debug)]
pub struct StoreWriter {
    file: PageFile,
    meta: Meta,
    _lock: FileLock,
}

impl StoreWriter {
    /// Creates a new, empty store at `path`.
    ///
    /// An existing empty file is taken over; an existing non-empty file is
    /// refused so that previously written data is never mixed with new data.
    ///
    /// # Errors
    ///
    /// All errors are FATAL: invalid options, lock timeout, an existing
    /// non-empty file, or I/O failure while initializing.
    pub fn create(path: &Path, options: CreateOptions) -> StoreResult<Self> {
        options.validate()?;

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| StoreError::io_error(format!("Failed to create store: {}", path.display()), e))?;
        let lock = FileLock::acquire(&file, path, LockMode::Exclusive, options.timeout)?;

        let mut file = PageFile::new(path, file, options.page_size);
        if file.file_len()? > 0 {
            return Err(StoreError::already_exists(path));
        }

        let root = FIRST_DATA_PAGE;
        let high_water = root + 1;
        for txid in 0..2 {
            let meta = Meta {
                page_size: options.page_size,
                root,
                high_water,
                txid,
            };
            file.write_pages(meta.pgid(), &meta.encode_page())?;
        }
        file.write_pages(root, &encode_leaf(root, &[], options.page_size))?;
        file.sync()?;

        let meta = Meta {
            page_size: options.page_size,
            root,
            high_water,
            txid: 1,
        };
        info!(path = %path.display(), page_size = options.page_size, "created store");

        Ok(Self {
            file,
            meta,
            _lock: lock,
        })
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

    /// Starts a write transaction on top of the last commit.
    pub fn begin_write(&mut self) -> WriteTxn<'_> {
        let root = BucketNode::Stored(self.meta.root);
        WriteTxn { writer: self, root }
    }
}

#[derive(Debug)]
enum Slot {
    Value(Vec<u8>),
    Bucket(BucketNode),
}

type Entries = BTreeMap<Vec<u8>, Slot>;

#[derive(Debug)]
enum BucketNode {
    /// Unmodified bucket still on disk at this root page
    Stored(Pgid),
    /// Bucket loaded into memory and possibly modified
    Loaded(Entries),
}

impl BucketNode {
    fn entries(&mut self, file: &PageFile, high_water: Pgid) -> StoreResult<&mut Entries> {
        if let BucketNode::Stored(root) = *self {
            *self = BucketNode::Loaded(load_bucket(file, high_water, root)?);
        }
        match self {
            BucketNode::Loaded(entries) => Ok(entries),
            BucketNode::Stored(root) => Err(StoreError::integrity_failed(format!(
                "bucket at page {} was not loaded",
                root
            ))),
        }
    }
}

fn load_bucket(file: &PageFile, high_water: Pgid, root: Pgid) -> StoreResult<Entries> {
    let mut entries = Entries::new();
    let mut cursor = Cursor::new(file, high_water, root, None);
    while let Some(entry) = cursor.next_entry().map_err(StoreError::from_fault)? {
        match entry {
            CursorEntry::Value { key, value } => {
                entries.insert(key.to_vec(), Slot::Value(value.to_vec()));
            }
            CursorEntry::Bucket { key, root } => {
                entries.insert(key.to_vec(), Slot::Bucket(BucketNode::Stored(root)));
            }
        }
    }
    Ok(entries)
}

fn check_key(key: &[u8]) -> StoreResult<()> {
    if key.is_empty() {
        return Err(StoreError::key_required());
    }
    if key.len() > MAX_KEY_SIZE {
        return Err(StoreError::key_too_large(key.len()));
    }
    Ok(())
}

/// Write transaction. Dropping it without [`WriteTxn::commit`] discards
/// every staged change.
#[derive(Debug)]
pub struct WriteTxn<'w> {
    writer: &'w mut StoreWriter,
    root: BucketNode,
}

impl<'w> WriteTxn<'w> {
    fn root_bucket(&mut self) -> StoreResult<BucketMut<'_>> {
        let WriteTxn { writer, root } = self;
        let high_water = writer.meta.high_water;
        Ok(BucketMut {
            entries: root.entries(&writer.file, high_water)?,
            file: &writer.file,
            high_water,
        })
    }

    /// Returns the top-level bucket `name`, creating it if absent.
    ///
    /// # Errors
    ///
    /// ERROR severity if the name is empty or too long, or if `name` is taken
    /// by something other than a bucket. FATAL if an existing bucket cannot be
    /// read back.
    pub fn create_bucket_if_not_exists(&mut self, name: &[u8]) -> StoreResult<BucketMut<'_>> {
        self.root_bucket()?.into_bucket(name)
    }

    /// Returns the bucket at `path`, creating it and any missing parents.
    ///
    /// # Errors
    ///
    /// The root bucket holds only buckets and cannot be returned; otherwise
    /// as [`WriteTxn::create_bucket_if_not_exists`] for each name on the path.
    pub fn create_bucket_path(&mut self, path: &BucketPath) -> StoreResult<BucketMut<'_>> {
        if path.is_root() {
            return Err(StoreError::incompatible_value(
                "the root bucket holds only buckets",
            ));
        }
        let mut bucket = self.root_bucket()?;
        for name in path.segments() {
            bucket = bucket.into_bucket(name)?;
        }
        Ok(bucket)
    }

    /// Writes every touched bucket and switches the store to the new root.
    pub fn commit(self) -> StoreResult<()> {
        let WriteTxn { writer, root } = self;
        let page_size = writer.meta.page_size;
        let mut alloc = Allocator::new(writer.meta.high_water, page_size);

        let root_pgid = match &root {
            BucketNode::Stored(pgid) => *pgid,
            BucketNode::Loaded(entries) => write_bucket(entries, &mut alloc),
        };

        let pages = alloc.pages.len();
        for (pgid, buf) in &alloc.pages {
            writer.file.write_pages(*pgid, buf)?;
        }
        writer.file.sync()?;

        let meta = Meta {
            page_size,
            root: root_pgid,
            high_water: alloc.next,
            txid: writer.meta.txid + 1,
        };
        writer.file.write_pages(meta.pgid(), &meta.encode_page())?;
        writer.file.sync()?;
        writer.meta = meta;

        debug!(
            txid = meta.txid,
            root = meta.root,
            high_water = meta.high_water,
            nodes = pages,
            "committed write transaction"
        );
        Ok(())
    }
}

/// Mutable handle to a bucket inside a [`WriteTxn`].
#[derive(Debug)]
pub struct BucketMut<'t> {
    entries: &'t mut Entries,
    file: &'t PageFile,
    high_water: Pgid,
}

impl<'t> BucketMut<'t> {
    fn into_bucket(self, name: &[u8]) -> StoreResult<BucketMut<'t>> {
        check_key(name)?;
        let BucketMut {
            entries,
            file,
            high_water,
        } = self;
        let slot = entries
            .entry(name.to_vec())
            .or_insert_with(|| Slot::Bucket(BucketNode::Loaded(Entries::new())));
        match slot {
            Slot::Value(_) => Err(StoreError::incompatible_value(format!(
                "key {} holds a value, not a bucket",
                name.escape_ascii()
            ))),
            Slot::Bucket(node) => Ok(BucketMut {
                entries: node.entries(file, high_water)?,
                file,
                high_water,
            }),
        }
    }

    /// Returns the nested bucket `name`, creating it if absent.
    pub fn create_bucket_if_not_exists(&mut self, name: &[u8]) -> StoreResult<BucketMut<'_>> {
        BucketMut {
            entries: &mut *self.entries,
            file: self.file,
            high_water: self.high_water,
        }
        .into_bucket(name)
    }

    /// Sets `key` to `value`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// ERROR severity: empty key, key or value over the size limit, or `key`
    /// naming a nested bucket.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> StoreResult<()> {
        check_key(key)?;
        if value.len() > MAX_VALUE_SIZE {
            return Err(StoreError::value_too_large(value.len()));
        }
        if let Some(Slot::Bucket(_)) = self.entries.get(key) {
            return Err(StoreError::incompatible_value(format!(
                "key {} names a nested bucket",
                key.escape_ascii()
            )));
        }
        self.entries.insert(key.to_vec(), Slot::Value(value.to_vec()));
        Ok(())
    }

    /// Number of direct entries, nested buckets included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hands out page ids past the high-water mark and collects encoded nodes.
struct Allocator {
    next: Pgid,
    page_size: u32,
    pages: Vec<(Pgid, Vec<u8>)>,
}

impl Allocator {
    fn new(high_water: Pgid, page_size: u32) -> Self {
        Self {
            next: high_water,
            page_size,
            pages: Vec::new(),
        }
    }

    fn allocate(&mut self, size: usize) -> Pgid {
        let pgid = self.next;
        self.next += pages_for(size, self.page_size) as Pgid;
        pgid
    }
}

/// Splits items into page-sized runs. A run always holds at least
/// `min_items` items so that oversized items land on overflow pages and each
/// branch level shrinks.
fn split_runs(sizes: &[usize], page_size: u32, min_items: usize) -> Vec<std::ops::Range<usize>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let mut used = PAGE_HEADER_SIZE;
    for (index, size) in sizes.iter().enumerate() {
        let len = index - start;
        let fits = used + size <= page_size as usize;
        if len >= min_items && (!fits || len >= u16::MAX as usize) {
            runs.push(start..index);
            start = index;
            used = PAGE_HEADER_SIZE;
        }
        used += size;
    }
    runs.push(start..sizes.len());
    runs
}

/// Encodes a loaded bucket and all loaded descendants, returning the new
/// root page id.
fn write_bucket(entries: &Entries, alloc: &mut Allocator) -> Pgid {
    let mut values: Vec<(&[u8], u32, Vec<u8>)> = Vec::with_capacity(entries.len());
    for (key, slot) in entries {
        match slot {
            Slot::Value(value) => values.push((key.as_slice(), 0, value.clone())),
            Slot::Bucket(BucketNode::Stored(root)) => {
                values.push((key.as_slice(), BUCKET_LEAF_FLAG, root.to_le_bytes().to_vec()))
            }
            Slot::Bucket(BucketNode::Loaded(child)) => {
                let root = write_bucket(child, alloc);
                values.push((key.as_slice(), BUCKET_LEAF_FLAG, root.to_le_bytes().to_vec()));
            }
        }
    }

    let page_size = alloc.page_size;
    let sizes: Vec<usize> = values
        .iter()
        .map(|(key, _, value)| leaf_item_size(key.len(), value.len()))
        .collect();

    let mut level: Vec<BranchItem> = Vec::new();
    for run in split_runs(&sizes, page_size, 1) {
        let items: Vec<LeafItem<'_>> = values[run.clone()]
            .iter()
            .map(|(key, flags, value)| LeafItem {
                flags: *flags,
                key: *key,
                value: value.as_slice(),
            })
            .collect();
        let size = PAGE_HEADER_SIZE + sizes[run.clone()].iter().sum::<usize>();
        let pgid = alloc.allocate(size);
        alloc.pages.push((pgid, encode_leaf(pgid, &items, page_size)));
        level.push(BranchItem {
            key: values.get(run.start).map(|(key, _, _)| key.to_vec()).unwrap_or_default(),
            pgid,
        });
    }

    while level.len() > 1 {
        let sizes: Vec<usize> = level.iter().map(|item| branch_item_size(item.key.len())).collect();
        let mut parent = Vec::new();
        for run in split_runs(&sizes, page_size, 2) {
            let items = &level[run.clone()];
            let size = PAGE_HEADER_SIZE + sizes[run].iter().sum::<usize>();
            let pgid = alloc.allocate(size);
            alloc.pages.push((pgid, encode_branch(pgid, items, page_size)));
            parent.push(BranchItem {
                key: items[0].key.clone(),
                pgid,
            });
        }
        level = parent;
    }

    level.first().map(|item| item.pgid).unwrap_or(alloc.next)
}
