//! On-disk page layout
//!
//! Every page starts with a 16 byte header:
//!
//! ```text
//! +----------+----------+----------+-------------+
//! | id (u64) | flags    | count    | overflow    |
//! |          | (u16)    | (u16)    | (u32)       |
//! +----------+----------+----------+-------------+
//! ```
//!
//! Pages 0 and 1 are meta pages. All other pages belong to a bucket B+tree and
//! are either branch or leaf pages. A page with `overflow = n` spans `n + 1`
//! contiguous pages.
//!
//! Branch and leaf pages hold `count` fixed-size elements directly after the
//! header, followed by the packed key/value bytes. An element's `pos` is
//! relative to the element's own offset.
//!
//! ```text
//! branch element: | pos (u32) | ksize (u32) | pgid (u64)  |
//! leaf element:   | flags (u32) | pos (u32) | ksize (u32) | vsize (u32) |
//! ```
//!
//! All integers are little endian.

use super::checksum::{compute_checksum, verify_checksum};
use super::errors::{FaultResult, PageFault};

/// Page identifier; the page lives at byte offset `pgid * page_size`.
pub type Pgid = u64;

/// Size of the common page header
pub const PAGE_HEADER_SIZE: usize = 16;
/// Size of a branch or leaf element
pub const ELEMENT_SIZE: usize = 16;

/// Branch page flag
pub const BRANCH_PAGE: u16 = 0x01;
/// Leaf page flag
pub const LEAF_PAGE: u16 = 0x02;
/// Meta page flag
pub const META_PAGE: u16 = 0x04;

/// Leaf element flag marking a nested bucket
pub const BUCKET_LEAF_FLAG: u32 = 0x01;

/// Magic number identifying a page store file
pub const MAGIC: u32 = 0xB5A1_7A6E;
/// Format version
pub const VERSION: u32 = 1;

/// Default page size for new stores
pub const DEFAULT_PAGE_SIZE: u32 = 4096;
/// Smallest supported page size
pub const MIN_PAGE_SIZE: u32 = 512;
/// Largest supported page size
pub const MAX_PAGE_SIZE: u32 = 65536;

/// Meta body: magic, version, page_size, flags, root, high_water, txid, checksum
const META_BODY_SIZE: usize = 4 + 4 + 4 + 4 + 8 + 8 + 8 + 4;
/// Bytes of the meta body covered by the checksum
const META_CHECKSUMMED: usize = META_BODY_SIZE - 4;
/// Bytes read from a meta page to decode it
pub const META_READ_SIZE: usize = PAGE_HEADER_SIZE + META_BODY_SIZE;

/// Size of a nested-bucket marker value (the child's root page id)
pub const BUCKET_VALUE_SIZE: usize = 8;

/// Returns true if `page_size` is a supported page size.
pub fn is_valid_page_size(page_size: u32) -> bool {
    page_size.is_power_of_two() && (MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&page_size)
}

fn read_u16(buf: &[u8], off: usize) -> Option<u16> {
    buf.get(off..off + 2)?.try_into().ok().map(u16::from_le_bytes)
}

fn read_u32(buf: &[u8], off: usize) -> Option<u32> {
    buf.get(off..off + 4)?.try_into().ok().map(u32::from_le_bytes)
}

fn read_u64(buf: &[u8], off: usize) -> Option<u64> {
    buf.get(off..off + 8)?.try_into().ok().map(u64::from_le_bytes)
}

/// Decoded page header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub id: Pgid,
    pub flags: u16,
    pub count: u16,
    pub overflow: u32,
}

impl PageHeader {
    /// Decodes the header at the start of `buf`.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        Some(Self {
            id: read_u64(buf, 0)?,
            flags: read_u16(buf, 8)?,
            count: read_u16(buf, 10)?,
            overflow: read_u32(buf, 12)?,
        })
    }

    /// Encodes the header into the first 16 bytes of `buf`.
    pub fn encode(&self, buf: &mut [u8]) {
        buf[0..8].copy_from_slice(&self.id.to_le_bytes());
        buf[8..10].copy_from_slice(&self.flags.to_le_bytes());
        buf[10..12].copy_from_slice(&self.count.to_le_bytes());
        buf[12..16].copy_from_slice(&self.overflow.to_le_bytes());
    }

    /// Kind of page named by the flags
    pub fn kind(&self) -> PageKind {
        match self.flags {
            BRANCH_PAGE => PageKind::Branch,
            LEAF_PAGE => PageKind::Leaf,
            META_PAGE => PageKind::Meta,
            other => PageKind::Unknown(other),
        }
    }
}

/// Page kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageKind {
    Branch,
    Leaf,
    Meta,
    Unknown(u16),
}

/// Store metadata held in pages 0 and 1
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meta {
    /// Page size for the whole file
    pub page_size: u32,
    /// Root page of the root bucket (which holds the top-level buckets)
    pub root: Pgid,
    /// First page id never allocated
    pub high_water: Pgid,
    /// Transaction id of the commit that wrote this meta
    pub txid: u64,
}

impl Meta {
    /// Page this meta is written to
    pub fn pgid(&self) -> Pgid {
        self.txid % 2
    }

    /// Encodes the meta into a full page buffer.
    pub fn encode_page(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.page_size as usize];
        PageHeader {
            id: self.pgid(),
            flags: META_PAGE,
            count: 0,
            overflow: 0,
        }
        .encode(&mut buf);

        let body = &mut buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + META_BODY_SIZE];
        body[0..4].copy_from_slice(&MAGIC.to_le_bytes());
        body[4..8].copy_from_slice(&VERSION.to_le_bytes());
        body[8..12].copy_from_slice(&self.page_size.to_le_bytes());
        body[12..16].copy_from_slice(&0u32.to_le_bytes());
        body[16..24].copy_from_slice(&self.root.to_le_bytes());
        body[24..32].copy_from_slice(&self.high_water.to_le_bytes());
        body[32..40].copy_from_slice(&self.txid.to_le_bytes());
        let checksum = compute_checksum(&body[..META_CHECKSUMMED]);
        body[40..44].copy_from_slice(&checksum.to_le_bytes());
        buf
    }

    /// Decodes and validates a meta page. The error names the first check
    /// that failed.
    pub fn decode(buf: &[u8]) -> Result<Self, String> {
        let header = PageHeader::decode(buf).ok_or("meta page truncated")?;
        if header.flags != META_PAGE {
            return Err(format!("invalid meta flags {:#06x}", header.flags));
        }
        let body = buf
            .get(PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + META_BODY_SIZE)
            .ok_or("meta body truncated")?;

        let magic = read_u32(body, 0).ok_or("meta body truncated")?;
        if magic != MAGIC {
            return Err(format!("invalid magic {:#010x}", magic));
        }
        let version = read_u32(body, 4).ok_or("meta body truncated")?;
        if version != VERSION {
            return Err(format!("unsupported version {}", version));
        }
        let checksum = read_u32(body, 40).ok_or("meta body truncated")?;
        if !verify_checksum(&body[..META_CHECKSUMMED], checksum) {
            return Err("meta checksum mismatch".to_string());
        }

        let meta = Self {
            page_size: read_u32(body, 8).ok_or("meta body truncated")?,
            root: read_u64(body, 16).ok_or("meta body truncated")?,
            high_water: read_u64(body, 24).ok_or("meta body truncated")?,
            txid: read_u64(body, 32).ok_or("meta body truncated")?,
        };
        if !is_valid_page_size(meta.page_size) {
            return Err(format!("invalid page size {}", meta.page_size));
        }
        if meta.root < 2 || meta.root >= meta.high_water {
            return Err(format!(
                "root page {} outside allocated range 2..{}",
                meta.root, meta.high_water
            ));
        }
        if header.id != meta.pgid() {
            return Err(format!(
                "meta for txid {} found on page {}",
                meta.txid, header.id
            ));
        }
        Ok(meta)
    }
}

/// Branch element borrowed from a page buffer
#[derive(Debug, Clone, Copy)]
pub struct BranchElement<'a> {
    pub key: &'a [u8],
    pub pgid: Pgid,
}

/// Leaf element borrowed from a page buffer
#[derive(Debug, Clone, Copy)]
pub struct LeafElement<'a> {
    pub flags: u32,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

impl LeafElement<'_> {
    /// True if this element marks a nested bucket
    pub fn is_bucket(&self) -> bool {
        self.flags & BUCKET_LEAF_FLAG != 0
    }
}

/// Decodes the root page id stored as a nested-bucket marker's value.
pub fn decode_bucket_value(pgid: Pgid, value: &[u8]) -> FaultResult<Pgid> {
    if value.len() != BUCKET_VALUE_SIZE {
        return Err(PageFault::malformed(
            pgid,
            format!("bucket value is {} bytes, expected {}", value.len(), BUCKET_VALUE_SIZE),
        ));
    }
    read_u64(value, 0).ok_or_else(|| PageFault::malformed(pgid, "bucket value truncated"))
}

/// A branch or leaf page read from disk, including its overflow pages.
#[derive(Debug, Clone)]
pub struct Page {
    pgid: Pgid,
    header: PageHeader,
    buf: Vec<u8>,
}

impl Page {
    /// Validates a raw buffer read for `pgid` as a tree page.
    pub fn parse(pgid: Pgid, buf: Vec<u8>) -> FaultResult<Self> {
        let header = PageHeader::decode(&buf)
            .ok_or_else(|| PageFault::malformed(pgid, "page shorter than header"))?;
        if header.id != pgid {
            return Err(PageFault::IdMismatch {
                expected: pgid,
                found: header.id,
            });
        }
        if header.flags != BRANCH_PAGE && header.flags != LEAF_PAGE {
            return Err(PageFault::InvalidFlags {
                pgid,
                flags: header.flags,
            });
        }
        let table_end = PAGE_HEADER_SIZE + header.count as usize * ELEMENT_SIZE;
        if table_end > buf.len() {
            return Err(PageFault::malformed(
                pgid,
                format!("{} elements do not fit in {} bytes", header.count, buf.len()),
            ));
        }
        Ok(Self { pgid, header, buf })
    }

    pub fn pgid(&self) -> Pgid {
        self.pgid
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }

    pub fn count(&self) -> usize {
        self.header.count as usize
    }

    pub fn is_leaf(&self) -> bool {
        self.header.flags == LEAF_PAGE
    }

    fn span(&self, elem_off: usize, pos: u32, len: usize) -> FaultResult<&[u8]> {
        let start = elem_off
            .checked_add(pos as usize)
            .ok_or_else(|| PageFault::malformed(self.pgid, "element offset overflow"))?;
        let end = start
            .checked_add(len)
            .ok_or_else(|| PageFault::malformed(self.pgid, "element length overflow"))?;
        self.buf.get(start..end).ok_or_else(|| {
            PageFault::malformed(
                self.pgid,
                format!("span {}..{} outside page of {} bytes", start, end, self.buf.len()),
            )
        })
    }

    fn element_field(&self, off: usize) -> FaultResult<u32> {
        read_u32(&self.buf, off)
            .ok_or_else(|| PageFault::malformed(self.pgid, "element table truncated"))
    }

    /// Decodes the `index`th element of a branch page.
    pub fn branch_element(&self, index: usize) -> FaultResult<BranchElement<'_>> {
        let off = PAGE_HEADER_SIZE + index * ELEMENT_SIZE;
        let pos = self.element_field(off)?;
        let ksize = self.element_field(off + 4)? as usize;
        let pgid = read_u64(&self.buf, off + 8)
            .ok_or_else(|| PageFault::malformed(self.pgid, "element table truncated"))?;
        Ok(BranchElement {
            key: self.span(off, pos, ksize)?,
            pgid,
        })
    }

    /// Decodes the `index`th element of a leaf page.
    pub fn leaf_element(&self, index: usize) -> FaultResult<LeafElement<'_>> {
        let off = PAGE_HEADER_SIZE + index * ELEMENT_SIZE;
        let flags = self.element_field(off)?;
        let pos = self.element_field(off + 4)?;
        let ksize = self.element_field(off + 8)? as usize;
        let vsize = self.element_field(off + 12)? as usize;
        let data = self.span(off, pos, ksize + vsize)?;
        let (key, value) = data.split_at(ksize);
        Ok(LeafElement { flags, key, value })
    }
}

/// Leaf item handed to the encoder
#[derive(Debug, Clone, Copy)]
pub(crate) struct LeafItem<'a> {
    pub flags: u32,
    pub key: &'a [u8],
    pub value: &'a [u8],
}

/// Branch item handed to the encoder
#[derive(Debug, Clone)]
pub(crate) struct BranchItem {
    pub key: Vec<u8>,
    pub pgid: Pgid,
}

/// Bytes a leaf item occupies on a page
pub(crate) fn leaf_item_size(key_len: usize, value_len: usize) -> usize {
    ELEMENT_SIZE + key_len + value_len
}

/// Bytes a branch item occupies on a page
pub(crate) fn branch_item_size(key_len: usize) -> usize {
    ELEMENT_SIZE + key_len
}

/// Number of pages needed to hold `size` bytes.
pub(crate) fn pages_for(size: usize, page_size: u32) -> usize {
    size.div_ceil(page_size as usize).max(1)
}

fn node_buffer(pgid: Pgid, flags: u16, count: usize, size: usize, page_size: u32) -> Vec<u8> {
    let pages = pages_for(size, page_size);
    let mut buf = vec![0u8; pages * page_size as usize];
    PageHeader {
        id: pgid,
        flags,
        count: count as u16,
        overflow: (pages - 1) as u32,
    }
    .encode(&mut buf);
    buf
}

/// Encodes a leaf node. Callers keep `items.len()` within `u16`.
pub(crate) fn encode_leaf(pgid: Pgid, items: &[LeafItem<'_>], page_size: u32) -> Vec<u8> {
    let size = PAGE_HEADER_SIZE
        + items
            .iter()
            .map(|i| leaf_item_size(i.key.len(), i.value.len()))
            .sum::<usize>();
    let mut buf = node_buffer(pgid, LEAF_PAGE, items.len(), size, page_size);

    let mut data_off = PAGE_HEADER_SIZE + items.len() * ELEMENT_SIZE;
    for (index, item) in items.iter().enumerate() {
        let off = PAGE_HEADER_SIZE + index * ELEMENT_SIZE;
        let pos = (data_off - off) as u32;
        buf[off..off + 4].copy_from_slice(&item.flags.to_le_bytes());
        buf[off + 4..off + 8].copy_from_slice(&pos.to_le_bytes());
        buf[off + 8..off + 12].copy_from_slice(&(item.key.len() as u32).to_le_bytes());
        buf[off + 12..off + 16].copy_from_slice(&(item.value.len() as u32).to_le_bytes());

        buf[data_off..data_off + item.key.len()].copy_from_slice(item.key);
        data_off += item.key.len();
        buf[data_off..data_off + item.value.len()].copy_from_slice(item.value);
        data_off += item.value.len();
    }
    buf
}

/// Encodes a branch node. Callers keep `items.len()` within `u16`.
pub(crate) fn encode_branch(pgid: Pgid, items: &[BranchItem], page_size: u32) -> Vec<u8> {
    let size = PAGE_HEADER_SIZE
        + items
            .iter()
            .map(|i| branch_item_size(i.key.len()))
            .sum::<usize>();
    let mut buf = node_buffer(pgid, BRANCH_PAGE, items.len(), size, page_size);

    let mut data_off = PAGE_HEADER_SIZE + items.len() * ELEMENT_SIZE;
    for (index, item) in items.iter().enumerate() {
        let off = PAGE_HEADER_SIZE + index * ELEMENT_SIZE;
        let pos = (data_off - off) as u32;
        buf[off..off + 4].copy_from_slice(&pos.to_le_bytes());
        buf[off + 4..off + 8].copy_from_slice(&(item.key.len() as u32).to_le_bytes());
        buf[off + 8..off + 16].copy_from_slice(&item.pgid.to_le_bytes());

        buf[data_off..data_off + item.key.len()].copy_from_slice(&item.key);
        data_off += item.key.len();
    }
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = PageHeader {
            id: 42,
            flags: LEAF_PAGE,
            count: 3,
            overflow: 1,
        };
        let mut buf = [0u8; PAGE_HEADER_SIZE];
        header.encode(&mut buf);
        assert_eq!(PageHeader::decode(&buf), Some(header));
        assert_eq!(header.kind(), PageKind::Leaf);
    }

    #[test]
    fn test_meta_decode_rejects_checksum_mismatch() {
        let meta = Meta {
            page_size: 4096,
            root: 2,
            high_water: 3,
            txid: 5,
        };
        let mut buf = meta.encode_page();
        assert_eq!(Meta::decode(&buf), Ok(meta));

        buf[PAGE_HEADER_SIZE + 20] ^= 0xFF;
        let err = Meta::decode(&buf).unwrap_err();
        assert!(err.contains("checksum"), "got: {}", err);
    }

    #[test]
    fn test_meta_decode_rejects_root_outside_range() {
        let meta = Meta {
            page_size: 4096,
            root: 9,
            high_water: 3,
            txid: 0,
        };
        let err = Meta::decode(&meta.encode_page()).unwrap_err();
        assert!(err.contains("root page 9"), "got: {}", err);
    }

    #[test]
    fn test_leaf_encode_decode() {
        let child = 77u64.to_le_bytes();
        let items = [
            LeafItem {
                flags: 0,
                key: b"alpha",
                value: b"one",
            },
            LeafItem {
                flags: 0,
                key: b"empty",
                value: b"",
            },
            LeafItem {
                flags: BUCKET_LEAF_FLAG,
                key: b"nested",
                value: &child,
            },
        ];
        let buf = encode_leaf(9, &items, 512);
        assert_eq!(buf.len(), 512);

        let page = Page::parse(9, buf).unwrap();
        assert!(page.is_leaf());
        assert_eq!(page.count(), 3);

        let first = page.leaf_element(0).unwrap();
        assert_eq!(first.key, b"alpha");
        assert_eq!(first.value, b"one");
        assert!(!first.is_bucket());

        let empty = page.leaf_element(1).unwrap();
        assert_eq!(empty.value, b"");
        assert!(!empty.is_bucket());

        let nested = page.leaf_element(2).unwrap();
        assert!(nested.is_bucket());
        assert_eq!(decode_bucket_value(9, nested.value).unwrap(), 77);
    }

    #[test]
    fn test_large_leaf_uses_overflow() {
        let value = vec![0xAB; 1500];
        let items = [LeafItem {
            flags: 0,
            key: b"big",
            value: &value,
        }];
        let buf = encode_leaf(4, &items, 512);
        // 16 header + 16 element + 3 key + 1500 value = 1535 bytes
        assert_eq!(buf.len(), 3 * 512);
        let page = Page::parse(4, buf).unwrap();
        assert_eq!(page.header().overflow, 2);
        assert_eq!(page.leaf_element(0).unwrap().value.len(), 1500);
    }

    #[test]
    fn test_branch_encode_decode() {
        let items = vec![
            BranchItem {
                key: b"a".to_vec(),
                pgid: 10,
            },
            BranchItem {
                key: b"m".to_vec(),
                pgid: 11,
            },
        ];
        let page = Page::parse(3, encode_branch(3, &items, 512)).unwrap();
        assert!(!page.is_leaf());
        let second = page.branch_element(1).unwrap();
        assert_eq!(second.key, b"m");
        assert_eq!(second.pgid, 11);
    }

    #[test]
    fn test_parse_detects_id_mismatch() {
        let buf = encode_leaf(5, &[], 512);
        let err = Page::parse(6, buf).unwrap_err();
        assert!(matches!(
            err,
            PageFault::IdMismatch {
                expected: 6,
                found: 5
            }
        ));
    }

    #[test]
    fn test_parse_detects_invalid_flags() {
        let mut buf = encode_leaf(5, &[], 512);
        buf[8] = 0xFF;
        buf[9] = 0xFF;
        let err = Page::parse(5, buf).unwrap_err();
        assert!(matches!(err, PageFault::InvalidFlags { pgid: 5, flags: 0xFFFF }));
    }

    #[test]
    fn test_out_of_bounds_element_is_malformed() {
        let items = [LeafItem {
            flags: 0,
            key: b"k",
            value: b"v",
        }];
        let mut buf = encode_leaf(2, &items, 512);
        // Point the element's data far past the page.
        let off = PAGE_HEADER_SIZE;
        buf[off + 4..off + 8].copy_from_slice(&10_000u32.to_le_bytes());
        let page = Page::parse(2, buf).unwrap();
        assert!(matches!(
            page.leaf_element(0),
            Err(PageFault::Malformed { pgid: 2, .. })
        ));
    }
}
