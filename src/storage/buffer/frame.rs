//! Buffer frames: a memory slot that holds at most one page.

use parking_lot::RwLock;

use super::arena::FrameData;
use crate::storage::page::PageId;

/// Index of a frame within the buffer pool, `0..num_frames`.
///
/// Distinct from [`PageId`]: a page id names a page on disk, a frame id
/// names the memory slot it currently occupies.
pub type FrameId = usize;

/// A buffer frame: the latch over one arena slice.
///
/// The latch protects page *content*. Frame *metadata* (pin count, dirty
/// bit, resident page id) lives in [`FrameMeta`] under the pool mutex, so
/// that metadata transitions and page-table updates stay atomic.
pub(super) struct Frame {
    pub(super) data: RwLock<FrameData>,
}

impl Frame {
    pub(super) fn new(data: FrameData) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }
}

/// Per-frame bookkeeping, guarded by the pool mutex.
#[derive(Debug)]
pub(super) struct FrameMeta {
    /// The page resident in this frame, if any.
    pub(super) page_id: Option<PageId>,
    /// Number of outstanding pins. Only frames with `pin_count == 0` may be
    /// chosen as eviction victims.
    pub(super) pin_count: u32,
    /// Whether the frame content diverges from disk.
    pub(super) dirty: bool,
}

impl FrameMeta {
    pub(super) fn new() -> Self {
        Self {
            page_id: None,
            pin_count: 0,
            dirty: false,
        }
    }

    /// Binds the frame to a freshly loaded page, initially pinned once.
    pub(super) fn reset(&mut self, page_id: PageId) {
        self.page_id = Some(page_id);
        self.pin_count = 1;
        self.dirty = false;
    }

    /// Returns the frame to the empty state.
    pub(super) fn clear(&mut self) {
        self.page_id = None;
        self.pin_count = 0;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meta_lifecycle() {
        let mut meta = FrameMeta::new();
        assert_eq!(meta.page_id, None);
        assert_eq!(meta.pin_count, 0);
        assert!(!meta.dirty);

        meta.reset(PageId::new(9));
        assert_eq!(meta.page_id, Some(PageId::new(9)));
        assert_eq!(meta.pin_count, 1);
        assert!(!meta.dirty);

        meta.dirty = true;
        meta.clear();
        assert_eq!(meta.page_id, None);
        assert_eq!(meta.pin_count, 0);
        assert!(!meta.dirty);
    }
}
