//! Shared helpers for integration tests: building real stores, corrupting
//! pages in place, and dumping a store's full contents.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs::OpenOptions as FsOpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use bucket_salvage::pagestore::{
    BucketRef, CreateOptions, CursorEntry, OpenOptions, Pgid, ReadTxn, Store, StoreWriter, WriteTxn,
};
use bucket_salvage::path::BucketPath;

/// Page size used by every test store, small enough to split buckets
/// across pages with a few dozen entries.
pub const PAGE_SIZE: u32 = 512;

/// Every `(bucket path, key) -> value` pair of a store.
pub type Contents = BTreeMap<(BucketPath, Vec<u8>), Vec<u8>>;

/// Full contents of a store: values and the set of bucket paths.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Dump {
    pub values: Contents,
    pub buckets: Vec<BucketPath>,
}

impl Dump {
    pub fn get(&self, path: &[&str], key: &str) -> Option<&[u8]> {
        self.values
            .get(&(BucketPath::from_segments(path), key.as_bytes().to_vec()))
            .map(Vec::as_slice)
    }

    pub fn keys_in(&self, path: &[&str]) -> Vec<Vec<u8>> {
        let path = BucketPath::from_segments(path);
        self.values
            .keys()
            .filter(|(p, _)| *p == path)
            .map(|(_, k)| k.clone())
            .collect()
    }

    pub fn has_bucket(&self, path: &[&str]) -> bool {
        self.buckets.contains(&BucketPath::from_segments(path))
    }
}

/// Creates a store at `path` and fills it in a single transaction.
pub fn build_store<F>(path: &Path, fill: F)
where
    F: FnOnce(&mut WriteTxn<'_>),
{
    let mut writer = StoreWriter::create(path, CreateOptions::default().with_page_size(PAGE_SIZE)).unwrap();
    let mut txn = writer.begin_write();
    fill(&mut txn);
    txn.commit().unwrap();
}

/// Key with a fixed width so that key order matches insertion order.
pub fn key(i: usize) -> Vec<u8> {
    format!("key-{:04}", i).into_bytes()
}

pub fn value(i: usize) -> Vec<u8> {
    format!("value-{:04}-padding-padding", i).into_bytes()
}

/// Fills `bucket` with `count` entries, enough to span several leaves.
pub fn fill_bucket(txn: &mut WriteTxn<'_>, path: &[&str], count: usize) {
    let mut bucket = txn.create_bucket_path(&BucketPath::from_segments(path)).unwrap();
    for i in 0..count {
        bucket.put(&key(i), &value(i)).unwrap();
    }
}

/// Root page of the bucket at `path`.
pub fn bucket_root(store_path: &Path, path: &[&str]) -> Pgid {
    let store = Store::open(store_path, OpenOptions::salvage()).unwrap();
    let txn = store.begin_read();
    txn.bucket_at(&BucketPath::from_segments(path))
        .unwrap()
        .unwrap()
        .root_pgid()
}

/// Leaf pages directly under the branch root of the bucket at `path`.
pub fn leaf_pages(store_path: &Path, path: &[&str]) -> Vec<(Pgid, usize)> {
    let root = bucket_root(store_path, path);
    let store = Store::open(store_path, OpenOptions::salvage()).unwrap();
    let txn = store.begin_read();
    let info = txn.page_info(root).unwrap();
    assert!(!info.children.is_empty(), "bucket root {} is not a branch page", root);
    info.children
        .iter()
        .map(|&pgid| (pgid, txn.page_info(pgid).unwrap().count))
        .collect()
}

/// Overwrites the header of page `pgid` with zeros.
pub fn corrupt_page(store_path: &Path, pgid: Pgid) {
    let mut file = FsOpenOptions::new().write(true).open(store_path).unwrap();
    file.seek(SeekFrom::Start(pgid * PAGE_SIZE as u64)).unwrap();
    file.write_all(&[0u8; 16]).unwrap();
    file.sync_all().unwrap();
}

/// Rewrites the nested-bucket marker at element `index` of leaf page `leaf`
/// so that it names `target` as the child's root page.
pub fn point_marker_at(store_path: &Path, leaf: Pgid, index: usize, target: Pgid) {
    let mut file = FsOpenOptions::new().read(true).write(true).open(store_path).unwrap();
    let page_offset = leaf * PAGE_SIZE as u64;
    let element_offset = 16 + 16 * index as u64;

    let mut element = [0u8; 16];
    file.seek(SeekFrom::Start(page_offset + element_offset)).unwrap();
    file.read_exact(&mut element).unwrap();
    let field = |at: usize| u32::from_le_bytes(element[at..at + 4].try_into().unwrap()) as u64;
    assert_eq!(field(0) & 1, 1, "element {} of page {} is not a bucket marker", index, leaf);

    let value_offset = page_offset + element_offset + field(4) + field(8);
    file.seek(SeekFrom::Start(value_offset)).unwrap();
    file.write_all(&target.to_le_bytes()).unwrap();
    file.sync_all().unwrap();
}

/// Reads every bucket at every depth. Panics on any fault.
pub fn dump(store_path: &Path) -> Dump {
    let store = Store::open(store_path, OpenOptions::default()).unwrap();
    let txn = store.begin_read();
    let mut dump = Dump::default();
    dump_bucket(&txn, txn.root(), BucketPath::root(), &mut dump);
    dump.buckets.sort();
    dump
}

fn dump_bucket(txn: &ReadTxn<'_>, bucket: BucketRef, path: BucketPath, dump: &mut Dump) {
    let mut children = Vec::new();
    let mut cursor = txn.cursor(bucket);
    while let Some(entry) = cursor.next_entry().unwrap() {
        match entry {
            CursorEntry::Value { key, value } => {
                dump.values.insert((path.clone(), key.to_vec()), value.to_vec());
            }
            CursorEntry::Bucket { key, root } => children.push((path.child(key), BucketRef::new(root))),
        }
    }
    for (child_path, child) in children {
        dump.buckets.push(child_path.clone());
        dump_bucket(txn, child, child_path, dump);
    }
}
