//! RAII guards for buffer pool page access.
//!
//! A guard represents one pin plus the frame's latch: shared for reads,
//! exclusive for writes. Dropping the guard releases the latch first and
//! then unpins, so the pool mutex is never taken while a latch is held.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use super::arena::FrameData;
use super::frame::FrameId;
use super::pool::BufferPool;
use crate::storage::page::PageId;

/// Shared-access guard over a pinned page.
pub struct PageReadGuard<'a> {
    pool: &'a BufferPool,
    frame_id: FrameId,
    page_id: PageId,
    lock: Option<RwLockReadGuard<'a, FrameData>>,
}

impl<'a> PageReadGuard<'a> {
    pub(super) fn new(
        pool: &'a BufferPool,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockReadGuard<'a, FrameData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            lock: Some(lock),
        }
    }

    /// The id of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The page bytes.
    pub fn data(&self) -> &[u8] {
        self.lock.as_ref().expect("latch held until drop").as_slice()
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl AsRef<[u8]> for PageReadGuard<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl Drop for PageReadGuard<'_> {
    fn drop(&mut self) {
        // Latch before pin: release order matters for the lock hierarchy.
        self.lock.take();
        self.pool.unpin_from_guard(self.frame_id, false);
    }
}

/// Exclusive-access guard over a pinned page.
///
/// Mutation does not implicitly dirty the page; call
/// [`mark_dirty`](Self::mark_dirty) after a successful change so failed
/// operations can unpin clean.
pub struct PageWriteGuard<'a> {
    pool: &'a BufferPool,
    frame_id: FrameId,
    page_id: PageId,
    dirty: bool,
    lock: Option<RwLockWriteGuard<'a, FrameData>>,
}

impl<'a> PageWriteGuard<'a> {
    pub(super) fn new(
        pool: &'a BufferPool,
        frame_id: FrameId,
        page_id: PageId,
        lock: RwLockWriteGuard<'a, FrameData>,
    ) -> Self {
        Self {
            pool,
            frame_id,
            page_id,
            dirty: false,
            lock: Some(lock),
        }
    }

    /// The id of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// The page bytes.
    pub fn data(&self) -> &[u8] {
        self.lock.as_ref().expect("latch held until drop").as_slice()
    }

    /// Mutable page bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.lock
            .as_mut()
            .expect("latch held until drop")
            .as_mut_slice()
    }

    /// Records that the page content changed; the unpin on drop will carry
    /// the dirty bit.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for PageWriteGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl AsRef<[u8]> for PageWriteGuard<'_> {
    fn as_ref(&self) -> &[u8] {
        self.data()
    }
}

impl AsMut<[u8]> for PageWriteGuard<'_> {
    fn as_mut(&mut self) -> &mut [u8] {
        self.data_mut()
    }
}

impl Drop for PageWriteGuard<'_> {
    fn drop(&mut self) {
        self.lock.take();
        self.pool.unpin_from_guard(self.frame_id, self.dirty);
    }
}
