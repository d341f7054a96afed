//! Storage layer errors.

use crate::storage::PageId;

/// Errors from page I/O, segment allocation, and free-space rebuilds.
#[derive(Debug)]
pub enum StorageError {
    /// The requested page lies beyond the end of the file.
    PageNotFound(PageId),

    /// A buffer passed to `read_page`/`write_page` was not exactly one page.
    InvalidBufferSize {
        /// Expected buffer size (the backend's page size).
        expected: usize,
        /// Actual buffer size provided.
        actual: usize,
    },

    /// I/O error from the underlying file system.
    Io(std::io::Error),

    /// On-disk state is inconsistent (short read, bad file length).
    Corrupted(String),

    /// A required resource is missing or exhausted (no probe registered,
    /// allocation failed).
    Unavailable(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::PageNotFound(pid) => write!(f, "page not found: {:?}", pid),
            StorageError::InvalidBufferSize { expected, actual } => {
                write!(f, "invalid buffer size: expected {}, got {}", expected, actual)
            }
            StorageError::Io(e) => write!(f, "I/O error: {}", e),
            StorageError::Corrupted(msg) => write!(f, "corruption: {}", msg),
            StorageError::Unavailable(msg) => write!(f, "unavailable: {}", msg),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}
