//! In-memory results of the walk
//!
//! A [`StagedSubtree`] is built by the walker for one bucket and is handed to
//! the destination writer only once it is complete. Nothing in it refers back
//! to the source store.

use crate::path::BucketPath;

/// Recovered key/value pair, copied out of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// One caught fault: where it happened and how much of that bucket had been
/// staged when it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    /// Bucket whose enumeration was cut short; the root path for a fault
    /// while listing top-level buckets
    pub path: BucketPath,
    pub diagnostic: String,
    /// Direct entries and sub-buckets staged for this bucket before the fault
    pub entries_staged: usize,
}

/// Recovered contents of one bucket and its recovered descendants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedSubtree {
    pub path: BucketPath,
    /// Flat entries in source order
    pub entries: Vec<StagedEntry>,
    /// Recovered sub-buckets in source order
    pub children: Vec<StagedSubtree>,
    /// Set when this bucket's own enumeration was truncated
    pub fault: Option<FaultRecord>,
    /// Nested-bucket markers beyond the depth limit, not descended into
    pub skipped_nested: usize,
}

impl StagedSubtree {
    pub fn new(path: BucketPath) -> Self {
        Self {
            path,
            entries: Vec::new(),
            children: Vec::new(),
            fault: None,
            skipped_nested: 0,
        }
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    /// Items staged directly in this bucket.
    pub fn staged_len(&self) -> usize {
        self.entries.len() + self.children.len()
    }

    /// Flat entries in this bucket and every staged descendant.
    pub fn total_entries(&self) -> usize {
        self.entries.len() + self.children.iter().map(StagedSubtree::total_entries).sum::<usize>()
    }

    /// Staged descendant buckets at every depth.
    pub fn total_buckets(&self) -> usize {
        self.children
            .iter()
            .map(|child| 1 + child.total_buckets())
            .sum()
    }

    /// Skipped markers in this bucket and its descendants.
    pub fn total_skipped(&self) -> usize {
        self.skipped_nested + self.children.iter().map(StagedSubtree::total_skipped).sum::<usize>()
    }

    /// Every fault in this subtree, parents before children.
    pub fn faults(&self) -> Vec<&FaultRecord> {
        let mut faults = Vec::new();
        self.collect_faults(&mut faults);
        faults
    }

    fn collect_faults<'a>(&'a self, out: &mut Vec<&'a FaultRecord>) {
        if let Some(fault) = &self.fault {
            out.push(fault);
        }
        for child in &self.children {
            child.collect_faults(out);
        }
    }

    pub fn has_faults(&self) -> bool {
        self.fault.is_some() || self.children.iter().any(StagedSubtree::has_faults)
    }
}
