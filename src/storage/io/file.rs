//! File-backed page I/O.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::PageIo;
use crate::storage::error::StorageError;
use crate::storage::page::PageId;

/// File-backed page store.
///
/// Pages are stored as contiguous `page_size` blocks:
///
/// ```text
/// +--------------+--------------+--------------+
/// | Page 0       | Page 1       | Page 2       | ...
/// +--------------+--------------+--------------+
/// ^ offset 0     ^ page_size    ^ 2*page_size
/// ```
///
/// The file length is always a multiple of the page size; `write_page`
/// extends the file (zero-filled) when writing past the current end.
///
/// # Concurrency
///
/// A mutex around the file handle serializes seeks and transfers.
/// `read_exact`/`write_all` loop over partial transfers and retry on
/// interruption, so a successful return always moved a whole page.
///
/// # Durability
///
/// Writes are buffered by the OS until [`DiskManager::sync`] is called.
/// Data written but not synced may be lost on a crash.
pub struct DiskManager {
    path: PathBuf,
    page_size: usize,
    file: Mutex<File>,
}

impl DiskManager {
    /// Opens or creates a page file at `path`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Corrupted`] when an existing file's length is not a
    /// multiple of `page_size`.
    pub fn open(path: impl Into<PathBuf>, page_size: usize) -> Result<Self, StorageError> {
        let path = path.into();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len % page_size as u64 != 0 {
            return Err(StorageError::Corrupted(format!(
                "file {} has length {} which is not a multiple of page size {}",
                path.display(),
                len,
                page_size
            )));
        }

        Ok(Self {
            path,
            page_size,
            file: Mutex::new(file),
        })
    }

    /// Returns the path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
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

impl PageIo for DiskManager {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn page_count(&self) -> u64 {
        let file = self.file.lock();
        match file.metadata() {
            Ok(meta) => meta.len() / self.page_size as u64,
            Err(_) => 0,
        }
    }

    fn read_page(&self, pid: PageId, buf: &mut [u8]) -> Result<(), StorageError> {
        self.check_buf(buf.len())?;

        let offset = pid.byte_offset(self.page_size);
        let mut file = self.file.lock();

        let len = file.metadata()?.len();
        if offset + self.page_size as u64 > len {
            return Err(StorageError::PageNotFound(pid));
        }

        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::UnexpectedEof => {
                StorageError::Corrupted(format!("short read at page {}", pid))
            }
            _ => StorageError::Io(e),
        })
    }

    fn write_page(&self, pid: PageId, buf: &[u8]) -> Result<(), StorageError> {
        self.check_buf(buf.len())?;

        let offset = pid.byte_offset(self.page_size);
        let required = offset + self.page_size as u64;
        let mut file = self.file.lock();

        if file.metadata()?.len() < required {
            file.set_len(required)?;
        }

        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)?;
        Ok(())
    }

    fn resize(&self, page_count: u64) -> Result<(), StorageError> {
        let file = self.file.lock();
        file.set_len(page_count * self.page_size as u64)?;
        Ok(())
    }

    fn sync(&self) -> Result<(), StorageError> {
        let file = self.file.lock();
        file.sync_data()?;
        Ok(())
    }
}
