//! Heap errors.

use super::page::SlotId;
use crate::storage::{BufferPoolError, StorageError};

/// Errors from slotted pages and the table heap.
#[derive(Debug)]
pub enum HeapError {
    /// Zero-length records are not storable.
    EmptyRecord,

    /// The record can never fit in a page of this size.
    RecordTooLarge {
        /// Record size in bytes.
        size: usize,
        /// Largest storable record for the configured page size.
        max: usize,
    },

    /// Not enough contiguous free space, even after compaction. For the
    /// table heap this is the signal to place the tuple on another page.
    PageFull {
        /// Bytes needed for the record (plus a directory entry if one must
        /// be appended).
        required: usize,
        /// Contiguous free bytes available.
        available: usize,
    },

    /// No record at this slot: out of range or a tombstone.
    SlotNotFound(SlotId),

    /// A slot points outside the page.
    Corrupted(String),

    /// Buffer pool failure underneath a heap operation.
    Buffer(BufferPoolError),

    /// Segment or page I/O failure underneath a heap operation.
    Storage(StorageError),
}

impl std::fmt::Display for HeapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HeapError::EmptyRecord => write!(f, "empty record"),
            HeapError::RecordTooLarge { size, max } => {
                write!(f, "record of {} bytes exceeds page capacity {}", size, max)
            }
            HeapError::PageFull {
                required,
                available,
            } => write!(
                f,
                "page full: need {} bytes, have {} available",
                required, available
            ),
            HeapError::SlotNotFound(slot) => write!(f, "slot {} not found or deleted", slot),
            HeapError::Corrupted(msg) => write!(f, "corruption: {}", msg),
            HeapError::Buffer(e) => write!(f, "buffer pool error: {}", e),
            HeapError::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

impl std::error::Error for HeapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            HeapError::Buffer(e) => Some(e),
            HeapError::Storage(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferPoolError> for HeapError {
    fn from(e: BufferPoolError) -> Self {
        HeapError::Buffer(e)
    }
}

impl From<StorageError> for HeapError {
    fn from(e: StorageError) -> Self {
        HeapError::Storage(e)
    }
}
