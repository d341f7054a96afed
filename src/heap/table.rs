//! Table heap: tuple storage over pages, buffer pool, FSM, and segments.

use std::sync::Arc;

use super::error::HeapError;
use super::page::{max_record_size, Rid, SlottedPage};
use super::scan::TableScan;
use crate::record::Tuple;
use crate::storage::{BufferPool, FreeSpaceManager, PageId, SegmentId, SegmentManager};

/// A heap table: one segment of slotted pages addressed by [`Rid`].
///
/// Placement policy for inserts: ask the free space manager for a page with
/// enough room; fall back to a freshly allocated page when there is none or
/// when the candidate turns out to be full. Every page mutation republishes
/// the page's free size to the FSM.
///
/// All methods take `&self`; the buffer pool's write guards give page
/// mutations frame-exclusive protection, and the FSM and segment manager
/// synchronize internally. Concurrent mutators of the *same logical row*
/// still race; arbitration of that is an upper-layer concern.
pub struct TableHeap {
    seg: SegmentId,
    page_size: usize,
    pool: Arc<BufferPool>,
    fsm: Arc<FreeSpaceManager>,
    segments: Arc<SegmentManager>,
}

impl TableHeap {
    /// Creates a heap over segment `seg`. The pool, FSM, and segment
    /// manager must share the same page size.
    pub fn new(
        seg: SegmentId,
        pool: Arc<BufferPool>,
        fsm: Arc<FreeSpaceManager>,
        segments: Arc<SegmentManager>,
    ) -> Self {
        let page_size = pool.page_size();
        assert_eq!(
            page_size,
            segments.page_size(),
            "buffer pool and segment manager disagree on page size"
        );
        Self {
            seg,
            page_size,
            pool,
            fsm,
            segments,
        }
    }

    /// The segment backing this heap.
    pub fn segment_id(&self) -> SegmentId {
        self.seg
    }

    /// The heap's page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub(super) fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub(super) fn segments(&self) -> &SegmentManager {
        &self.segments
    }

    /// Inserts a tuple and returns its record id.
    ///
    /// # Errors
    ///
    /// - [`HeapError::EmptyRecord`] for empty tuples.
    /// - [`HeapError::RecordTooLarge`] when the tuple cannot fit any page.
    /// - Buffer pool and I/O failures propagate.
    pub fn insert(&self, tuple: &Tuple) -> Result<Rid, HeapError> {
        if tuple.is_empty() {
            return Err(HeapError::EmptyRecord);
        }
        let max = max_record_size(self.page_size);
        if tuple.len() > max {
            return Err(HeapError::RecordTooLarge {
                size: tuple.len(),
                max,
            });
        }

        let candidate = match self.fsm.find(tuple.len() as u16) {
            Some(pid) => pid,
            None => self.allocate_fresh_page()?,
        };

        let mut guard = self.pool.fetch_page_mut(candidate)?;
        let mut page = SlottedPage::new(guard.data_mut());
        match page.insert(tuple.bytes()) {
            Ok(slot) => {
                let free = page.free_size();
                guard.mark_dirty();
                drop(guard);
                self.fsm.update(candidate, free);
                Ok(Rid::new(candidate, slot))
            }
            Err(HeapError::PageFull { .. }) => {
                // The FSM's record was stale; it now reflects the page's
                // post-compaction reality so the entry stops lying.
                let free = page.free_size();
                drop(guard);
                self.fsm.update(candidate, free);
                self.insert_on_fresh_page(tuple)
            }
            Err(e) => {
                drop(guard);
                Err(e)
            }
        }
    }

    /// Updates the tuple at `rid` in place when it fits, migrating it to
    /// another page otherwise.
    ///
    /// After a migration the tuple lives under a new record id which is not
    /// reported back; the caller's `rid` observes the erase. A future
    /// revision should either return the new id or leave a forwarding
    /// tombstone.
    pub fn update(&self, rid: Rid, tuple: &Tuple) -> Result<(), HeapError> {
        let mut guard = self.pool.fetch_page_mut(rid.page_id)?;
        let mut page = SlottedPage::new(guard.data_mut());
        match page.update(rid.slot, tuple.bytes()) {
            Ok(()) => {
                let free = page.free_size();
                guard.mark_dirty();
                drop(guard);
                self.fsm.update(rid.page_id, free);
                Ok(())
            }
            Err(HeapError::PageFull { .. }) => {
                drop(guard);
                self.insert(tuple)?;

                let mut guard = self.pool.fetch_page_mut(rid.page_id)?;
                let mut page = SlottedPage::new(guard.data_mut());
                let _ = page.erase(rid.slot);
                let free = page.free_size();
                guard.mark_dirty();
                drop(guard);
                self.fsm.update(rid.page_id, free);
                Ok(())
            }
            Err(e) => {
                drop(guard);
                Err(e)
            }
        }
    }

    /// Erases the tuple at `rid`, leaving a tombstone.
    pub fn erase(&self, rid: Rid) -> Result<(), HeapError> {
        let mut guard = self.pool.fetch_page_mut(rid.page_id)?;
        let mut page = SlottedPage::new(guard.data_mut());
        match page.erase(rid.slot) {
            Ok(()) => {
                let free = page.free_size();
                guard.mark_dirty();
                drop(guard);
                self.fsm.update(rid.page_id, free);
                Ok(())
            }
            Err(e) => {
                drop(guard);
                Err(e)
            }
        }
    }

    /// Reads the tuple at `rid`, copying it out so the result outlives the
    /// pin.
    pub fn get(&self, rid: Rid) -> Result<Tuple, HeapError> {
        let guard = self.pool.fetch_page(rid.page_id)?;
        let page = SlottedPage::new(guard.data());
        let bytes = page.get(rid.slot)?.to_vec();
        Ok(Tuple::from_bytes(bytes))
    }

    /// Sequential scan in page-major, slot-major order. Tombstones are
    /// skipped; each yielded tuple is a materialized copy.
    pub fn scan(&self) -> TableScan<'_> {
        TableScan::new(self)
    }

    /// Allocates a page from the segment, formats it, and registers its
    /// initial free space.
    fn allocate_fresh_page(&self) -> Result<PageId, HeapError> {
        let pid = self.segments.allocate_page(self.seg)?;
        let mut guard = self.pool.fetch_page_mut(pid)?;
        let mut page = SlottedPage::new(guard.data_mut());
        page.init(pid);
        let free = page.free_size();
        guard.mark_dirty();
        drop(guard);
        self.fsm.update(pid, free);
        Ok(pid)
    }

    /// Fallback placement: a brand-new page, where a size-checked tuple
    /// always fits.
    fn insert_on_fresh_page(&self, tuple: &Tuple) -> Result<Rid, HeapError> {
        let pid = self.allocate_fresh_page()?;
        let mut guard = self.pool.fetch_page_mut(pid)?;
        let mut page = SlottedPage::new(guard.data_mut());
        let slot = page.insert(tuple.bytes())?;
        let free = page.free_size();
        guard.mark_dirty();
        drop(guard);
        self.fsm.update(pid, free);
        Ok(Rid::new(pid, slot))
    }
}
