//! In-memory page I/O for tests.

use parking_lot::Mutex;

use super::PageIo;
use crate::storage::error::StorageError;
use crate::storage::page::PageId;

/// In-memory page store with the same extension and error semantics as the
/// file backend. Used by unit tests that do not need durability.
pub struct MemIo {
    page_size: usize,
    pages: Mutex<Vec<Vec<u8>>>,
}

impl MemIo {
    /// Creates an empty in-memory store.
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size,
            pages: Mutex::new(Vec::new()),
        }
    }

    fn check_buf(&self, len: usize) -> Result<(), StorageError> {
        if len != self.page_size {
            return Err(StorageError::InvalidBufferSize {
                expected: self.page_size,
                actual: len,
            });
        }
        Ok(())
    }
}

impl PageIo for MemIo {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u64 {
        self.pages.lock().len() as u64
    }

    fn read_page(&self, pid: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check_buf(buf.len())?;
        let pages = self.pages.lock();
        let page = pages
            .get(pid.page_num() as usize)
            .ok_or(StorageError::PageNotFound(pid))?;
        buf.copy_from_slice(page);
        Ok(())
    }

    fn write_page(&self, pid: PageId, buf: &[u8]) -> Result<(), StorageError> {
        self.check_buf(buf.len())?;
        let mut pages = self.pages.lock();
        let idx = pid.page_num() as usize;
        while pages.len() <= idx {
            pages.push(vec![0u8; self.page_size]);
        }
        pages[idx].copy_from_slice(buf);
        Ok(())
    }

    fn resize(&self, page_count: u64) -> Result<(), StorageError> {
        let mut pages = self.pages.lock();
        pages.resize_with(page_count as usize, || vec![0u8; self.page_size]);
        Ok(())
    }

    fn sync(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_and_extension() {
        let io = MemIo::new(512);
        let mut page = vec![0u8; 512];
        page[0] = 1;

        io.write_page(PageId::new(3), &page).unwrap();
        assert_eq!(io.page_count(), 4);

        let mut out = vec![0u8; 512];
        io.read_page(PageId::new(3), &mut out).unwrap();
        assert_eq!(out[0], 1);

        // Zero-filled intermediate page.
        io.read_page(PageId::new(1), &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_read_missing_page() {
        let io = MemIo::new(512);
        let mut out = vec![0u8; 512];
        assert!(matches!(
            io.read_page(PageId::new(0), &mut out),
            Err(StorageError::PageNotFound(_))
        ));
    }

    #[test]
    fn test_resize() {
        let io = MemIo::new(512);
        io.resize(5).unwrap();
        assert_eq!(io.page_count(), 5);
        io.resize(2).unwrap();
        assert_eq!(io.page_count(), 2);
    }
}
