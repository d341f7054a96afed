//! Buffer pool errors.

use crate::storage::error::StorageError;
use crate::storage::page::PageId;

/// Errors from buffer pool operations.
#[derive(Debug)]
pub enum BufferPoolError {
    /// Every frame is pinned and the victim policy has no candidate.
    NoFreeFrames,

    /// The page is not resident in the pool (unpin/flush of an absent page).
    PageNotResident(PageId),

    /// Unpin of a page whose pin count is already zero.
    NotPinned(PageId),

    /// Underlying page I/O failure.
    Storage(StorageError),
}

impl std::fmt::Display for BufferPoolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferPoolError::NoFreeFrames => {
                write!(f, "no free frames available and all pages are pinned")
            }
            BufferPoolError::PageNotResident(pid) => {
                write!(f, "page {} is not resident in the buffer pool", pid)
            }
            BufferPoolError::NotPinned(pid) => {
                write!(f, "page {} has no outstanding pins", pid)
            }
            BufferPoolError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for BufferPoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferPoolError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StorageError> for BufferPoolError {
    fn from(e: StorageError) -> Self {
        BufferPoolError::Storage(e)
    }
}
