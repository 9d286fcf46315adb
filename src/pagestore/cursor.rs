//! Lazy in-order traversal of one bucket's B+tree
//!
//! A cursor yields the direct entries of a single bucket in key order. Nested
//! buckets are reported as markers carrying the child's root page; the cursor
//! never descends into them.
//!
//! Entries borrow the page buffer currently on top of the cursor stack and
//! are only valid until the next call to [`Cursor::next_entry`].
//!
//! Once a fault is returned the cursor is finished and yields nothing more.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use super::errors::{FaultResult, PageFault};
use super::file::PageFile;
use super::page::{decode_bucket_value, Page, Pgid};

/// Entry borrowed from the cursor's current leaf page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorEntry<'a> {
    /// Plain key/value pair; the value may be empty
    Value { key: &'a [u8], value: &'a [u8] },
    /// Nested bucket marker
    Bucket { key: &'a [u8], root: Pgid },
}

impl<'a> CursorEntry<'a> {
    pub fn key(&self) -> &'a [u8] {
        match self {
            CursorEntry::Value { key, .. } | CursorEntry::Bucket { key, .. } => key,
        }
    }
}

/// Map of page id to the bucket root that claimed it within one transaction
pub(crate) type PageClaims = RefCell<HashMap<Pgid, Pgid>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Walking,
    Finished,
}

#[derive(Debug)]
struct Frame {
    page: Page,
    index: usize,
}

/// Single-pass cursor over one bucket.
#[derive(Debug)]
pub struct Cursor<'t> {
    file: &'t PageFile,
    high_water: Pgid,
    root: Pgid,
    claims: Option<&'t PageClaims>,
    pending: Option<PageFault>,
    stack: Vec<Frame>,
    seen: HashSet<Pgid>,
    last_key: Option<Vec<u8>>,
    state: State,
}

impl<'t> Cursor<'t> {
    pub(crate) fn new(
        file: &'t PageFile,
        high_water: Pgid,
        root: Pgid,
        claims: Option<&'t PageClaims>,
    ) -> Self {
        Self {
            file,
            high_water,
            root,
            claims,
            pending: None,
            stack: Vec::new(),
            seen: HashSet::new(),
            last_key: None,
            state: State::Fresh,
        }
    }

    /// Cursor that reports `fault` on its first step.
    pub(crate) fn faulted(file: &'t PageFile, high_water: Pgid, root: Pgid, fault: PageFault) -> Self {
        let mut cursor = Self::new(file, high_water, root, None);
        cursor.pending = Some(fault);
        cursor
    }

    /// Root page of the bucket being walked
    pub fn root(&self) -> Pgid {
        self.root
    }

    fn claim(&mut self, pgid: Pgid) -> FaultResult<()> {
        if !self.seen.insert(pgid) {
            return Err(PageFault::MultipleReference { pgid });
        }
        if let Some(claims) = self.claims {
            let mut claims = claims.borrow_mut();
            match claims.get(&pgid) {
                Some(owner) if *owner != self.root => {
                    return Err(PageFault::MultipleReference { pgid });
                }
                Some(_) => {}
                None => {
                    claims.insert(pgid, self.root);
                }
            }
        }
        Ok(())
    }

    fn load(&mut self, pgid: Pgid) -> FaultResult<Page> {
        self.claim(pgid)?;
        let page = self.file.read_page(pgid, self.high_water)?;
        for extra in 1..=page.header().overflow as Pgid {
            self.claim(pgid + extra)?;
        }
        Ok(page)
    }

    /// Moves to the next leaf element and returns its index in the top frame.
    fn advance(&mut self) -> FaultResult<Option<usize>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            if frame.index >= frame.page.count() {
                self.stack.pop();
                continue;
            }
            let index = frame.index;
            frame.index += 1;
            if frame.page.is_leaf() {
                return Ok(Some(index));
            }
            let child = frame.page.branch_element(index)?.pgid;
            let page = self.load(child)?;
            self.stack.push(Frame { page, index: 0 });
        }
    }

    fn fail(&mut self, fault: PageFault) -> PageFault {
        self.state = State::Finished;
        self.stack.clear();
        fault
    }

    /// Returns the next entry of the bucket, `Ok(None)` at the end, or the
    /// fault that stopped the walk.
    pub fn next_entry(&mut self) -> FaultResult<Option<CursorEntry<'_>>> {
        match self.state {
            State::Finished => return Ok(None),
            State::Fresh => {
                self.state = State::Walking;
                if let Some(fault) = self.pending.take() {
                    return Err(self.fail(fault));
                }
                match self.load(self.root) {
                    Ok(page) => self.stack.push(Frame { page, index: 0 }),
                    Err(fault) => return Err(self.fail(fault)),
                }
            }
            State::Walking => {}
        }

        let index = match self.advance() {
            Ok(Some(index)) => index,
            Ok(None) => {
                self.state = State::Finished;
                return Ok(None);
            }
            Err(fault) => return Err(self.fail(fault)),
        };

        let frame = match self.stack.last() {
            Some(frame) => frame,
            None => return Ok(None),
        };
        let pgid = frame.page.pgid();
        let element = match frame.page.leaf_element(index) {
            Ok(element) => element,
            Err(fault) => {
                self.state = State::Finished;
                return Err(fault);
            }
        };

        if let Some(last) = &self.last_key {
            if element.key <= last.as_slice() {
                self.state = State::Finished;
                return Err(PageFault::UnsortedKeys { pgid });
            }
        }
        self.last_key = Some(element.key.to_vec());

        if element.is_bucket() {
            match decode_bucket_value(pgid, element.value) {
                Ok(root) => Ok(Some(CursorEntry::Bucket {
                    key: element.key,
                    root,
                })),
                Err(fault) => {
                    self.state = State::Finished;
                    Err(fault)
                }
            }
        } else {
            Ok(Some(CursorEntry::Value {
                key: element.key,
                value: element.value,
            }))
        }
    }
}
