//! Buffer pool manager: page fetch/new/unpin/flush over a frame arena.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;

use super::arena::PageArena;
use super::error::BufferPoolError;
use super::frame::{Frame, FrameId, FrameMeta};
use super::guard::{PageReadGuard, PageWriteGuard};
use super::replacer::Replacer;
use crate::storage::error::StorageError;
use crate::storage::io::PageIo;
use crate::storage::page::{PageHeader, PageId, PAGE_HEADER_SIZE};

/// Hook invoked with `(page_id, page_lsn)` immediately before a dirty page
/// is written back. The coordination point for a future write-ahead log: the
/// callback must not re-enter the buffer pool.
pub type FlushCallback = Box<dyn Fn(PageId, u64) + Send + Sync>;

/// Buffer pool counters, readable at any time via [`BufferPool::stats`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BufferStats {
    /// Fetches answered from a resident frame.
    pub hits: u64,
    /// Fetches that had to read from disk.
    pub misses: u64,
    /// Resident pages displaced to make room.
    pub evictions: u64,
    /// Dirty pages written back by `flush_page` or eviction.
    pub flushes: u64,
}

/// Mutable pool state, all guarded by one mutex.
///
/// Frame content is *not* here; it lives behind each frame's own RwLock so
/// that pinned pages can be read and mutated without holding the pool mutex.
struct PoolState {
    /// Maps resident pages to their frames. Unique: one frame per page.
    page_table: HashMap<PageId, FrameId>,
    /// Per-frame metadata, indexed by frame id.
    metas: Vec<FrameMeta>,
    /// Frames holding no page.
    free_list: VecDeque<FrameId>,
    /// Victim policy, chosen at construction.
    replacer: Box<dyn Replacer>,
    stats: BufferStats,
    flush_cb: Option<FlushCallback>,
}

/// Page cache with a fixed frame arena and a pluggable victim policy.
///
/// # Pin discipline
///
/// [`fetch_page`](Self::fetch_page), [`fetch_page_mut`](Self::fetch_page_mut)
/// and [`new_page`](Self::new_page) return guards that pin the page and hold
/// the frame's latch (shared for reads, exclusive for writes) until dropped.
/// A page with outstanding pins is never evicted.
///
/// # Lock order
///
/// The pool mutex is acquired first, frame latches second. Guards release
/// their latch before retaking the pool mutex to unpin, so the order never
/// inverts.
pub struct BufferPool {
    disk: Arc<dyn PageIo>,
    page_size: usize,
    num_frames: usize,
    frames: Vec<Frame>,
    state: Mutex<PoolState>,
    /// Backing memory for every frame; dropped last.
    _arena: PageArena,
}

impl BufferPool {
    /// Creates a pool with `num_frames` frames over the given backend.
    ///
    /// # Panics
    ///
    /// Panics when `num_frames` is 0 or the backend's page size cannot hold
    /// a page header.
    pub fn new(disk: Arc<dyn PageIo>, num_frames: usize, replacer: Box<dyn Replacer>) -> Self {
        assert!(num_frames > 0, "buffer pool needs at least one frame");
        let page_size = disk.page_size();
        assert!(
            page_size >= PAGE_HEADER_SIZE,
            "page size {} cannot hold a page header",
            page_size
        );

        let arena = PageArena::new(num_frames, page_size);
        let frames: Vec<Frame> = (0..num_frames)
            .map(|i| Frame::new(arena.frame_data(i, page_size)))
            .collect();
        let metas = (0..num_frames).map(|_| FrameMeta::new()).collect();
        let free_list: VecDeque<FrameId> = (0..num_frames).collect();

        Self {
            disk,
            page_size,
            num_frames,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::with_capacity(num_frames),
                metas,
                free_list,
                replacer,
                stats: BufferStats::default(),
                flush_cb: None,
            }),
            _arena: arena,
        }
    }

    /// The pool's page size in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Number of frames.
    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Number of pages currently resident.
    pub fn resident_pages(&self) -> usize {
        self.state.lock().page_table.len()
    }

    /// Snapshot of the pool counters.
    pub fn stats(&self) -> BufferStats {
        self.state.lock().stats
    }

    /// Installs the pre-write hook invoked before every write-back.
    pub fn register_flush_callback(&self, cb: FlushCallback) {
        self.state.lock().flush_cb = Some(cb);
    }

    /// Fetches a page for reading, pinning it for the guard's lifetime.
    ///
    /// # Errors
    ///
    /// - [`BufferPoolError::NoFreeFrames`] when every frame is pinned.
    /// - [`BufferPoolError::Storage`] when the read fails; the pool is left
    ///   in its prior state.
    pub fn fetch_page(&self, pid: PageId) -> Result<PageReadGuard<'_>, BufferPoolError> {
        let fid = self.load_page(pid)?;
        let lock = self.frames[fid].data.read();
        Ok(PageReadGuard::new(self, fid, pid, lock))
    }

    /// Fetches a page for writing, with the frame's exclusive latch.
    ///
    /// The page is not marked dirty automatically; call
    /// [`PageWriteGuard::mark_dirty`] after mutating.
    pub fn fetch_page_mut(&self, pid: PageId) -> Result<PageWriteGuard<'_>, BufferPoolError> {
        let fid = self.load_page(pid)?;
        let lock = self.frames[fid].data.write();
        Ok(PageWriteGuard::new(self, fid, pid, lock))
    }

    /// Allocates the next page id from the backend, grows the file by one
    /// zero page, and returns the pinned (zeroed) page.
    ///
    /// Table heaps normally allocate through the segment manager, which can
    /// recycle freed pages; this stays available as the direct route.
    pub fn new_page(&self) -> Result<PageWriteGuard<'_>, BufferPoolError> {
        let mut state = self.state.lock();
        let fid = self.acquire_frame(&mut state)?;
        let pid = PageId::new(self.disk.page_count() as u32);

        let write_result = {
            let mut data = self.frames[fid].data.write();
            data.as_mut_slice().fill(0);
            self.disk.write_page(pid, data.as_slice())
        };
        if let Err(e) = write_result {
            state.free_list.push_front(fid);
            return Err(e.into());
        }

        state.metas[fid].reset(pid);
        state.page_table.insert(pid, fid);
        state.replacer.pin(fid);
        drop(state);

        let lock = self.frames[fid].data.write();
        Ok(PageWriteGuard::new(self, fid, pid, lock))
    }

    /// Explicitly unpins a page.
    ///
    /// Guards unpin automatically on drop; this is the escape hatch for
    /// callers that manage pins by hand.
    ///
    /// # Errors
    ///
    /// - [`BufferPoolError::PageNotResident`] when the page is not cached.
    /// - [`BufferPoolError::NotPinned`] when its pin count is already zero.
    pub fn unpin_page(&self, pid: PageId, is_dirty: bool) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        let fid = *state
            .page_table
            .get(&pid)
            .ok_or(BufferPoolError::PageNotResident(pid))?;

        if state.metas[fid].pin_count == 0 {
            return Err(BufferPoolError::NotPinned(pid));
        }
        state.metas[fid].pin_count -= 1;
        state.metas[fid].dirty |= is_dirty;
        if state.metas[fid].pin_count == 0 {
            state.replacer.unpin(fid);
        }
        Ok(())
    }

    /// Writes a resident page back to disk if it is dirty.
    ///
    /// Clean pages are a no-op (no I/O). The registered flush callback runs
    /// before the write with the page's current `page_lsn`.
    ///
    /// # Errors
    ///
    /// [`BufferPoolError::PageNotResident`] when the page is not cached.
    pub fn flush_page(&self, pid: PageId) -> Result<(), BufferPoolError> {
        let mut state = self.state.lock();
        let fid = *state
            .page_table
            .get(&pid)
            .ok_or(BufferPoolError::PageNotResident(pid))?;
        if self.flush_frame(&mut state, fid)? {
            state.stats.flushes += 1;
        }
        Ok(())
    }

    /// Best-effort write-back of every dirty frame. Failures are logged and
    /// skipped so one bad page does not block the rest of a shutdown sweep.
    pub fn flush_all(&self) {
        let mut state = self.state.lock();
        for fid in 0..self.num_frames {
            if let Err(e) = self.flush_frame(&mut state, fid) {
                log::warn!("flush_all: frame {} write-back failed: {}", fid, e);
            }
        }
    }

    /// Resolves `pid` to a pinned frame, loading from disk on a miss.
    fn load_page(&self, pid: PageId) -> Result<FrameId, BufferPoolError> {
        let mut state = self.state.lock();

        if let Some(&fid) = state.page_table.get(&pid) {
            state.metas[fid].pin_count += 1;
            state.replacer.pin(fid);
            state.stats.hits += 1;
            return Ok(fid);
        }

        let fid = self.acquire_frame(&mut state)?;

        let read_result = {
            // The frame has no pins, so its latch is uncontended.
            let mut data = self.frames[fid].data.write();
            self.disk.read_page(pid, data.as_mut_slice())
        };
        if let Err(e) = read_result {
            // No mapping was installed; recycle the frame and surface the
            // error with the pool in its prior state.
            state.free_list.push_front(fid);
            return Err(e.into());
        }

        state.metas[fid].reset(pid);
        state.page_table.insert(pid, fid);
        state.replacer.pin(fid);
        state.stats.misses += 1;
        Ok(fid)
    }

    /// Produces an empty frame: free list first, then a policy victim.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId, BufferPoolError> {
        if let Some(fid) = state.free_list.pop_front() {
            return Ok(fid);
        }

        let victim = state
            .replacer
            .victim()
            .ok_or(BufferPoolError::NoFreeFrames)?;

        if let Some(old_pid) = state.metas[victim].page_id {
            match self.flush_frame(state, victim) {
                Ok(true) => state.stats.flushes += 1,
                Ok(false) => {}
                Err(e) => {
                    // The victim keeps its page; put it back in the
                    // candidate set before surfacing the error.
                    state.replacer.unpin(victim);
                    return Err(e.into());
                }
            }
            state.page_table.remove(&old_pid);
            state.metas[victim].clear();
            state.stats.evictions += 1;
            log::debug!("evicted page {} from frame {}", old_pid, victim);
        }

        Ok(victim)
    }

    /// Writes one frame back if it holds a dirty page. Returns whether a
    /// write happened. Does not touch counters; callers account.
    fn flush_frame(&self, state: &mut PoolState, fid: FrameId) -> Result<bool, StorageError> {
        let Some(pid) = state.metas[fid].page_id else {
            return Ok(false);
        };
        if !state.metas[fid].dirty {
            return Ok(false);
        }

        let data = self.frames[fid].data.read();
        let page_lsn = PageHeader::read_from(&data.as_slice()[..PAGE_HEADER_SIZE]).page_lsn;
        if let Some(cb) = &state.flush_cb {
            cb(pid, page_lsn);
        }
        self.disk.write_page(pid, data.as_slice())?;
        drop(data);

        state.metas[fid].dirty = false;
        Ok(true)
    }

    /// Unpin path for guard drops. The guard has already released its frame
    /// latch, so taking the pool mutex here cannot invert the lock order.
    pub(super) fn unpin_from_guard(&self, fid: FrameId, is_dirty: bool) {
        let mut state = self.state.lock();
        let meta = &mut state.metas[fid];
        debug_assert!(meta.pin_count > 0, "guard drop with pin_count == 0");
        if meta.pin_count == 0 {
            return;
        }
        meta.pin_count -= 1;
        meta.dirty |= is_dirty;
        if meta.pin_count == 0 {
            state.replacer.unpin(fid);
        }
    }

    #[cfg(test)]
    pub(crate) fn frame_of(&self, pid: PageId) -> Option<FrameId> {
        self.state.lock().page_table.get(&pid).copied()
    }

    #[cfg(test)]
    pub(crate) fn pin_count_of(&self, pid: PageId) -> Option<u32> {
        let state = self.state.lock();
        let fid = *state.page_table.get(&pid)?;
        Some(state.metas[fid].pin_count)
    }

    #[cfg(test)]
    pub(crate) fn is_dirty(&self, pid: PageId) -> Option<bool> {
        let state = self.state.lock();
        let fid = *state.page_table.get(&pid)?;
        Some(state.metas[fid].dirty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::buffer::replacer::ReplacerConfig;
    use crate::storage::io::MemIo;
    use std::sync::atomic::{AtomicU64, Ordering};

    const PAGE_SIZE: usize = 1024;

    fn test_pool(frames: usize) -> BufferPool {
        let disk = Arc::new(MemIo::new(PAGE_SIZE));
        BufferPool::new(disk, frames, ReplacerConfig::Clock.build(frames))
    }

    #[test]
    fn test_new_page_grows_backend() {
        let pool = test_pool(4);
        let guard = pool.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(0));
        drop(guard);

        let guard = pool.new_page().unwrap();
        assert_eq!(guard.page_id(), PageId::new(1));
        drop(guard);

        assert_eq!(pool.resident_pages(), 2);
    }

    #[test]
    fn test_fetch_hit_and_miss_counters() {
        let pool = test_pool(4);
        let pid = {
            let g = pool.new_page().unwrap();
            g.page_id()
        };

        // new_page counts as neither hit nor miss.
        assert_eq!(pool.stats(), BufferStats::default());

        drop(pool.fetch_page(pid).unwrap());
        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);

        // Evict everything by filling the pool, then refetch.
        for _ in 0..4 {
            drop(pool.new_page().unwrap());
        }
        drop(pool.fetch_page(pid).unwrap());
        assert_eq!(pool.stats().misses, 1);
    }

    #[test]
    fn test_write_read_roundtrip_through_guards() {
        let pool = test_pool(2);
        let pid = {
            let mut g = pool.new_page().unwrap();
            g.data_mut()[10] = 77;
            g.mark_dirty();
            g.page_id()
        };

        let g = pool.fetch_page(pid).unwrap();
        assert_eq!(g.data()[10], 77);
    }

    #[test]
    fn test_dirty_page_survives_eviction() {
        let pool = test_pool(1);
        let pid = {
            let mut g = pool.new_page().unwrap();
            g.data_mut()[0] = 5;
            g.mark_dirty();
            g.page_id()
        };

        // The single frame is reused, forcing eviction and write-back.
        drop(pool.new_page().unwrap());
        assert_eq!(pool.stats().evictions, 1);
        assert_eq!(pool.stats().flushes, 1);

        let g = pool.fetch_page(pid).unwrap();
        assert_eq!(g.data()[0], 5);
    }

    #[test]
    fn test_all_pinned_fails_unavailable() {
        let pool = test_pool(2);
        let _g1 = pool.new_page().unwrap();
        let _g2 = pool.new_page().unwrap();

        assert!(matches!(
            pool.new_page(),
            Err(BufferPoolError::NoFreeFrames)
        ));
    }

    #[test]
    fn test_fetch_missing_page_leaves_pool_unchanged() {
        let pool = test_pool(2);
        let result = pool.fetch_page(PageId::new(99));
        assert!(matches!(
            result,
            Err(BufferPoolError::Storage(StorageError::PageNotFound(_)))
        ));
        assert_eq!(pool.resident_pages(), 0);

        // The recycled frame is still usable.
        drop(pool.new_page().unwrap());
        drop(pool.new_page().unwrap());
        assert_eq!(pool.resident_pages(), 2);
    }

    #[test]
    fn test_unpin_page_errors() {
        let pool = test_pool(2);
        assert!(matches!(
            pool.unpin_page(PageId::new(0), false),
            Err(BufferPoolError::PageNotResident(_))
        ));

        let pid = {
            let g = pool.new_page().unwrap();
            g.page_id()
        };
        // The guard already unpinned it.
        assert!(matches!(
            pool.unpin_page(pid, false),
            Err(BufferPoolError::NotPinned(_))
        ));
    }

    #[test]
    fn test_repeated_flush_is_noop() {
        let pool = test_pool(2);
        let pid = {
            let mut g = pool.new_page().unwrap();
            g.data_mut()[0] = 1;
            g.mark_dirty();
            g.page_id()
        };

        pool.flush_page(pid).unwrap();
        assert_eq!(pool.stats().flushes, 1);
        assert_eq!(pool.is_dirty(pid), Some(false));

        // Clean page: no further I/O, counter unchanged.
        pool.flush_page(pid).unwrap();
        pool.flush_page(pid).unwrap();
        assert_eq!(pool.stats().flushes, 1);
    }

    #[test]
    fn test_flush_callback_sees_page_lsn() {
        let pool = test_pool(2);
        let seen = Arc::new(AtomicU64::new(0));
        let seen_cb = Arc::clone(&seen);
        pool.register_flush_callback(Box::new(move |_pid, lsn| {
            seen_cb.store(lsn, Ordering::SeqCst);
        }));

        let pid = {
            let mut g = pool.new_page().unwrap();
            let mut header = PageHeader::new(g.page_id(), PAGE_SIZE);
            header.page_lsn = 4242;
            header.write_to(g.data_mut());
            g.mark_dirty();
            g.page_id()
        };

        pool.flush_page(pid).unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 4242);
    }

    #[test]
    fn test_flush_all_clears_dirty_bits() {
        let pool = test_pool(4);
        let mut pids = Vec::new();
        for i in 0..3u8 {
            let mut g = pool.new_page().unwrap();
            g.data_mut()[0] = i;
            g.mark_dirty();
            pids.push(g.page_id());
        }

        pool.flush_all();
        for pid in pids {
            assert_eq!(pool.is_dirty(pid), Some(false));
            assert_eq!(pool.pin_count_of(pid), Some(0));
        }
    }

    #[test]
    fn test_single_copy_per_page() {
        let pool = test_pool(4);
        let pid = {
            let g = pool.new_page().unwrap();
            g.page_id()
        };

        let g1 = pool.fetch_page(pid).unwrap();
        let g2 = pool.fetch_page(pid).unwrap();
        assert_eq!(pool.frame_of(pid), Some(0));
        assert_eq!(pool.pin_count_of(pid), Some(2));
        drop(g1);
        drop(g2);
        assert_eq!(pool.pin_count_of(pid), Some(0));
        assert_eq!(pool.resident_pages(), 1);
    }
}
