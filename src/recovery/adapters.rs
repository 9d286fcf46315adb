//! Adapter implementations for recovery traits
//!
//! Binds the source and destination traits to the page store: a
//! [`ReadTxn`] over the damaged file is the source, a [`StoreWriter`] on the
//! fresh file is the destination.

use crate::pagestore::{BucketRef, Cursor, CursorEntry, ReadTxn, StoreResult, StoreWriter, WriteTxn};
use crate::path::BucketPath;

use super::destination::{DestinationStore, DestinationTxn};
use super::source::{EntryCursor, RawEntry, SourceFault, SourceStore};

// ============================================================================
// Source side
// ============================================================================

impl EntryCursor for Cursor<'_> {
    type Handle = BucketRef;

    fn next_entry(&mut self) -> Result<Option<RawEntry<'_, BucketRef>>, SourceFault> {
        let entry = Cursor::next_entry(self)?;
        Ok(entry.map(|entry| match entry {
            CursorEntry::Value { key, value } => RawEntry::Value { key, value },
            CursorEntry::Bucket { key, root } => RawEntry::Bucket {
                key,
                handle: BucketRef::new(root),
            },
        }))
    }
}

impl<'s> SourceStore for ReadTxn<'s> {
    type Handle = BucketRef;
    type Cursor<'c> = Cursor<'c> where Self: 'c;

    fn root(&self) -> BucketRef {
        ReadTxn::root(self)
    }

    fn top_level_bucket(&self, name: &[u8]) -> Result<BucketRef, SourceFault> {
        self.bucket(ReadTxn::root(self), name)?
            .ok_or_else(|| SourceFault::BucketNotFound(BucketPath::top_level(name)))
    }

    fn entries(&self, bucket: &BucketRef) -> Cursor<'_> {
        self.cursor(*bucket)
    }
}

// ============================================================================
// Destination side
// ============================================================================

impl DestinationStore for StoreWriter {
    type Txn<'t> = WriteTxn<'t>;

    fn begin(&mut self) -> StoreResult<WriteTxn<'_>> {
        Ok(self.begin_write())
    }
}

impl DestinationTxn for WriteTxn<'_> {
    fn create_bucket(&mut self, path: &BucketPath) -> StoreResult<()> {
        self.create_bucket_path(path).map(|_| ())
    }

    fn put(&mut self, path: &BucketPath, key: &[u8], value: &[u8]) -> StoreResult<()> {
        self.create_bucket_path(path)?.put(key, value)
    }

    fn commit(self) -> StoreResult<()> {
        WriteTxn::commit(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagestore::{CreateOptions, OpenOptions, Store};
    use crate::recovery::destination::commit_subtree;
    use crate::recovery::walker::Walker;
    use tempfile::TempDir;

    #[test]
    fn test_page_store_round_trip_through_traits() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("src.db");
        let dst = dir.path().join("dst.db");

        {
            let mut writer = StoreWriter::create(&src, CreateOptions::default().with_page_size(512)).unwrap();
            let mut txn = writer.begin_write();
            {
                let mut bucket = txn.create_bucket_if_not_exists(b"settings").unwrap();
                bucket.put(b"theme", b"dark").unwrap();
                let mut ldap = bucket.create_bucket_if_not_exists(b"ldap_config").unwrap();
                ldap.put(b"host", b"ldap.example.org").unwrap();
            }
            txn.commit().unwrap();
        }

        let store = Store::open(&src, OpenOptions::salvage()).unwrap();
        let read = store.begin_read();
        let walker = Walker::default();
        let listing = walker.list_top_level(&read);
        assert_eq!(listing.names, vec![b"settings".to_vec()]);

        let staged = walker.recover_top_level(&read, b"settings");
        assert!(!staged.has_faults());
        assert_eq!(staged.total_entries(), 2);

        let mut writer = StoreWriter::create(&dst, CreateOptions::default()).unwrap();
        let report = commit_subtree(&mut writer, &staged).unwrap();
        assert_eq!(report.entries_written, 2);
        drop(writer);

        let copy = Store::open(&dst, OpenOptions::default()).unwrap();
        let txn = copy.begin_read();
        let ldap = txn
            .bucket_at(&BucketPath::from_segments(["settings", "ldap_config"]))
            .unwrap()
            .unwrap();
        let mut cursor = txn.cursor(ldap);
        assert_eq!(
            Cursor::next_entry(&mut cursor).unwrap(),
            Some(CursorEntry::Value {
                key: b"host",
                value: b"ldap.example.org"
            })
        );
    }

    #[test]
    fn test_missing_top_level_bucket() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        drop(StoreWriter::create(&path, CreateOptions::default()).unwrap());

        let store = Store::open(&path, OpenOptions::default()).unwrap();
        let txn = store.begin_read();
        let err = txn.top_level_bucket(b"nope").unwrap_err();
        assert!(matches!(err, SourceFault::BucketNotFound(_)));
    }
}
