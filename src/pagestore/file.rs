//! Positioned page I/O over a single store file

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::errors::{FaultResult, PageFault, StoreError, StoreResult};
use super::page::{
    Meta, Page, PageHeader, Pgid, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, META_READ_SIZE, MIN_PAGE_SIZE,
};

/// Store file with a known page size.
#[derive(Debug)]
pub struct PageFile {
    path: PathBuf,
    file: File,
    page_size: u32,
}

impl PageFile {
    pub fn new(path: &Path, file: File, page_size: u32) -> Self {
        Self {
            path: path.to_path_buf(),
            file,
            page_size,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn offset(&self, pgid: Pgid) -> u64 {
        pgid * self.page_size as u64
    }

    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut file = &self.file;
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    /// Reads a tree page (and its overflow pages) for a walk bounded by
    /// `high_water`.
    pub fn read_page(&self, pgid: Pgid, high_water: Pgid) -> FaultResult<Page> {
        if pgid < 2 || pgid >= high_water {
            return Err(PageFault::Unreachable { pgid, high_water });
        }

        let page_size = self.page_size as usize;
        let mut first = vec![0u8; page_size];
        self.read_at(self.offset(pgid), &mut first)
            .map_err(|e| map_read_error(pgid, high_water, e))?;

        let header = PageHeader::decode(&first)
            .ok_or_else(|| PageFault::malformed(pgid, "page shorter than header"))?;
        if header.overflow == 0 {
            return Page::parse(pgid, first);
        }

        let last = pgid
            .checked_add(header.overflow as u64)
            .ok_or(PageFault::Unreachable { pgid, high_water })?;
        if last >= high_water {
            return Err(PageFault::Unreachable {
                pgid: last,
                high_water,
            });
        }
        let mut buf = first;
        buf.resize(page_size * (header.overflow as usize + 1), 0);
        self.read_at(self.offset(pgid + 1), &mut buf[page_size..])
            .map_err(|e| map_read_error(last, high_water, e))?;
        Page::parse(pgid, buf)
    }

    /// Reads the meta page at `pgid`, returning the reason it is unusable
    /// on failure.
    pub fn read_meta(&self, pgid: Pgid) -> Result<Meta, String> {
        let mut buf = vec![0u8; META_READ_SIZE];
        self.read_at(self.offset(pgid), &mut buf)
            .map_err(|e| format!("failed to read meta page {}: {}", pgid, e))?;
        Meta::decode(&buf)
    }

    /// Reads both metas and returns the valid one with the highest txid.
    ///
    /// The page size is taken from meta 0 when it is readable; otherwise
    /// every supported page size is probed for meta 1.
    pub fn load_meta(&mut self) -> StoreResult<Meta> {
        self.page_size = DEFAULT_PAGE_SIZE;
        let meta0 = self.read_meta(0);

        let candidates: Vec<u32> = match &meta0 {
            Ok(meta) => vec![meta.page_size],
            Err(_) => std::iter::successors(Some(MIN_PAGE_SIZE), |s| {
                (*s < MAX_PAGE_SIZE).then_some(s * 2)
            })
            .collect(),
        };

        let mut meta1 = Err("meta page 1 not probed".to_string());
        for page_size in candidates {
            self.page_size = page_size;
            meta1 = self.read_meta(1);
            if meta1.is_ok() {
                break;
            }
        }

        let active = match (meta0, meta1) {
            (Ok(a), Ok(b)) if a.page_size != b.page_size => {
                return Err(StoreError::invalid_meta(format!(
                    "meta pages disagree on page size ({} vs {})",
                    a.page_size, b.page_size
                )))
            }
            (Ok(a), Ok(b)) => {
                if a.txid >= b.txid {
                    a
                } else {
                    b
                }
            }
            (Ok(a), Err(reason)) | (Err(reason), Ok(a)) => {
                tracing::warn!(path = %self.path.display(), %reason, "one meta page invalid, using the other");
                a
            }
            (Err(r0), Err(r1)) => {
                return Err(StoreError::invalid_meta(format!(
                    "no valid meta page in {}: meta 0: {}; meta 1: {}",
                    self.path.display(),
                    r0,
                    r1
                )))
            }
        };
        self.page_size = active.page_size;
        Ok(active)
    }

    /// Writes one or more contiguous pages starting at `pgid`.
    pub fn write_pages(&mut self, pgid: Pgid, buf: &[u8]) -> StoreResult<()> {
        let offset = self.offset(pgid);
        self.file
            .seek(SeekFrom::Start(offset))
            .and_then(|_| self.file.write_all(buf))
            .map_err(|e| StoreError::io_error(format!("Failed to write page {}", pgid), e))
    }

    /// Flushes written pages to stable storage.
    pub fn sync(&self) -> StoreResult<()> {
        self.file
            .sync_all()
            .map_err(|e| StoreError::io_error("fsync failed", e))
    }

    pub fn file_len(&self) -> StoreResult<u64> {
        self.file
            .metadata()
            .map(|m| m.len())
            .map_err(|e| StoreError::io_error("Failed to read file metadata", e))
    }
}

fn map_read_error(pgid: Pgid, high_water: Pgid, e: io::Error) -> PageFault {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        PageFault::Unreachable { pgid, high_water }
    } else {
        PageFault::Io { pgid, source: e }
    }
}
