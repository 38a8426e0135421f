//! Page allocation over a growable memory-mapped file.
//!
//! Pages are handed out strictly in file order: each allocation starts at
//! the current logical end of the file. The backing file grows in steps of
//! the allocation granularity, so it is usually longer than its logical
//! size until `shrink_file` truncates the zero padding away.

use crate::error::{Error, Result};
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// A contiguous byte range of the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    /// Offset of the first byte in the file.
    pub offset: u64,
    /// Length of the page in bytes.
    pub size: u64,
}

impl Page {
    /// Create a new Page
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Offset one past the last byte of the page.
    pub fn end_offset(&self) -> u64 {
        self.offset + self.size
    }
}

/// Allocates zero-initialized pages in a memory-mapped file.
///
/// Not internally synchronized; the owner must not share it across threads
/// without its own locking.
pub struct MmapPageManager {
    path: PathBuf,
    file: File,
    mmap: Option<MmapMut>,
    /// Physical length of the file, including allocation padding.
    file_size: u64,
    /// Logical end of the file: end of the last allocated page.
    end_pos: u64,
    granularity: u64,
}

impl MmapPageManager {
    /// Open (creating if missing) `path` for page allocation.
    ///
    /// The logical size starts at the current length of the file.
    pub fn open<P: AsRef<Path>>(path: P, granularity: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().read(true).write(true).create(true).truncate(false).open(&path)?;
        let file_size = file.metadata()?.len();

        let mut manager = Self {
            path,
            file,
            mmap: None,
            file_size,
            end_pos: file_size,
            granularity: granularity.max(1),
        };
        manager.remap()?;

        log::debug!("Opened page manager for {:?} ({} bytes)", manager.path, file_size);
        Ok(manager)
    }

    /// Allocate a new page of `size` bytes at the logical end of the file.
    pub fn alloc_page(&mut self, size: u64) -> Result<Page> {
        let page = Page::new(self.end_pos, size);
        self.ensure_capacity(page.end_offset())?;
        self.end_pos = page.end_offset();

        log::trace!("Allocated page at {} ({} bytes)", page.offset, page.size);
        Ok(page)
    }

    /// Borrow the bytes of a previously allocated page.
    pub fn page(&self, page: Page) -> Result<&[u8]> {
        let (start, end) = self.check_bounds(page)?;
        match &self.mmap {
            Some(mmap) => Ok(&mmap[start..end]),
            None => Ok(&[]),
        }
    }

    /// Mutably borrow the bytes of a previously allocated page.
    pub fn page_mut(&mut self, page: Page) -> Result<&mut [u8]> {
        let (start, end) = self.check_bounds(page)?;
        match &mut self.mmap {
            Some(mmap) => Ok(&mut mmap[start..end]),
            None => Ok(&mut []),
        }
    }

    /// Force the bytes of `page` to disk.
    pub fn sync(&self, page: Page) -> Result<()> {
        let (start, end) = self.check_bounds(page)?;
        if let Some(mmap) = &self.mmap {
            if end > start {
                mmap.flush_range(start, end - start)?;
            }
        }
        Ok(())
    }

    /// Truncate the file to its logical size, dropping allocation padding.
    pub fn shrink_file(&mut self) -> Result<()> {
        if self.file_size == self.end_pos {
            return Ok(());
        }

        self.mmap = None;
        self.file.set_len(self.end_pos)?;
        self.file_size = self.end_pos;
        self.remap()?;

        log::debug!("Shrunk {:?} to {} bytes", self.path, self.end_pos);
        Ok(())
    }

    /// Logical size of the file.
    pub fn end_pos(&self) -> u64 {
        self.end_pos
    }

    /// Physical size of the file, including allocation padding.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_capacity(&mut self, min_size: u64) -> Result<()> {
        if min_size <= self.file_size {
            return Ok(());
        }

        let new_size = min_size.div_ceil(self.granularity) * self.granularity;
        self.mmap = None;
        self.file.set_len(new_size)?;
        self.file_size = new_size;
        self.remap()?;

        log::trace!("Grew {:?} to {} bytes", self.path, new_size);
        Ok(())
    }

    fn remap(&mut self) -> Result<()> {
        if self.file_size == 0 {
            self.mmap = None;
            return Ok(());
        }

        let len = usize::try_from(self.file_size)
            .map_err(|_| Error::invalid_state("File too large to map"))?;
        // SAFETY: the file is owned by this manager for its lifetime and no
        // other mapping of it is created by this process.
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&self.file) }?;
        self.mmap = Some(mmap);
        Ok(())
    }

    fn check_bounds(&self, page: Page) -> Result<(usize, usize)> {
        if page.end_offset() > self.file_size {
            return Err(Error::invalid_state(format!(
                "Page {}..{} exceeds mapped file size {}",
                page.offset,
                page.end_offset(),
                self.file_size
            )));
        }
        Ok((page.offset as usize, page.end_offset() as usize))
    }
}

impl Drop for MmapPageManager {
    fn drop(&mut self) {
        if let Err(e) = self.shrink_file() {
            log::warn!("Failed to shrink {:?} on close: {}", self.path, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_alloc_pages_in_order() {
        let dir = TempDir::new().unwrap();
        let mut pages = MmapPageManager::open(dir.path().join("pages"), 4096).unwrap();

        let a = pages.alloc_page(10).unwrap();
        let b = pages.alloc_page(20).unwrap();
        assert_eq!(a, Page::new(0, 10));
        assert_eq!(b, Page::new(10, 20));
        assert_eq!(pages.end_pos(), 30);
        assert_eq!(pages.file_size(), 4096);
    }

    #[test]
    fn test_pages_are_zeroed_and_writable() {
        let dir = TempDir::new().unwrap();
        let mut pages = MmapPageManager::open(dir.path().join("pages"), 16).unwrap();

        let page = pages.alloc_page(40).unwrap();
        assert!(pages.page(page).unwrap().iter().all(|b| *b == 0));

        pages.page_mut(page).unwrap()[..5].copy_from_slice(b"hello");
        pages.sync(page).unwrap();
        assert_eq!(&pages.page(page).unwrap()[..5], b"hello");
    }

    #[test]
    fn test_shrink_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages");
        let mut pages = MmapPageManager::open(&path, 1024).unwrap();

        let page = pages.alloc_page(100).unwrap();
        pages.page_mut(page).unwrap().fill(7);
        pages.shrink_file().unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 100);
        assert_eq!(pages.page(page).unwrap()[99], 7);
    }

    #[test]
    fn test_drop_shrinks_and_reopen_resumes() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pages");
        {
            let mut pages = MmapPageManager::open(&path, 1024).unwrap();
            pages.alloc_page(33).unwrap();
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 33);

        let mut pages = MmapPageManager::open(&path, 1024).unwrap();
        assert_eq!(pages.end_pos(), 33);
        assert_eq!(pages.alloc_page(1).unwrap().offset, 33);
    }

    #[test]
    fn test_out_of_bounds_page() {
        let dir = TempDir::new().unwrap();
        let pages = MmapPageManager::open(dir.path().join("pages"), 1024).unwrap();
        assert!(matches!(pages.page(Page::new(0, 1)), Err(Error::InvalidState(_))));
    }
}
