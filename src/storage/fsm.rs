//! Free space manager: a bucketed index from free bytes to candidate pages.
//!
//! Pages are grouped into buckets by their last reported contiguous free
//! size. With ascending thresholds `t0 < t1 < ... < tN-1` the buckets
//! partition `[0, inf)`:
//!
//! ```text
//! bucket 0: [0, t0)
//! bucket 1: [t0, t1)
//! ...
//! bucket N: [tN-1, inf)
//! ```
//!
//! [`find`](FreeSpaceManager::find) starts at the smallest bucket that could
//! satisfy a request and scans upward, which biases placement toward dense
//! pages and slows fragmentation growth.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::StorageError;
use super::page::{PageId, SegmentId};

/// Rebuild support: how the FSM asks the segment layer about pages.
///
/// Registered after startup so the FSM stays decoupled from the segment
/// manager's lifetime.
pub trait SegmentProbe: Send + Sync {
    /// Number of addressable pages in the segment.
    fn page_count(&self, seg: SegmentId) -> u64;

    /// The page's header `free_size`, or 0 on any failure.
    fn probe_page_free(&self, seg: SegmentId, pid: PageId) -> u16;
}

struct FsmState {
    /// Ascending, deduplicated bucket thresholds.
    thresholds: Vec<u32>,
    /// Page ids per bucket; `thresholds.len() + 1` buckets.
    buckets: Vec<HashSet<PageId>>,
    pid_bucket: HashMap<PageId, usize>,
    pid_free: HashMap<PageId, u16>,
    probe: Option<Arc<dyn SegmentProbe>>,
}

impl FsmState {
    /// Bucket index for a free-byte count: the number of thresholds at or
    /// below the value.
    fn bucket_index(&self, free_bytes: u32) -> usize {
        self.thresholds.partition_point(|&t| t <= free_bytes)
    }
}

/// Thread-safe index of pages by free bytes.
pub struct FreeSpaceManager {
    inner: Mutex<FsmState>,
}

impl FreeSpaceManager {
    /// Creates an FSM with the given bucket thresholds. Thresholds are
    /// sorted and deduplicated; `thresholds.len() + 1` buckets result.
    pub fn new(mut thresholds: Vec<u32>) -> Self {
        thresholds.sort_unstable();
        thresholds.dedup();
        let buckets = (0..=thresholds.len()).map(|_| HashSet::new()).collect();
        Self {
            inner: Mutex::new(FsmState {
                thresholds,
                buckets,
                pid_bucket: HashMap::new(),
                pid_free: HashMap::new(),
                probe: None,
            }),
        }
    }

    /// Finds any page whose recorded free space is at least `need_bytes`.
    ///
    /// Scans from the smallest adequate bucket upward; the order within a
    /// bucket is unspecified. Returns `None` when no tracked page fits.
    pub fn find(&self, need_bytes: u16) -> Option<PageId> {
        let state = self.inner.lock();
        let start = state.bucket_index(need_bytes as u32);
        for bucket in &state.buckets[start..] {
            for &pid in bucket {
                if let Some(&free) = state.pid_free.get(&pid) {
                    if free >= need_bytes {
                        return Some(pid);
                    }
                }
            }
        }
        None
    }

    /// Records the page's current free space, inserting it if untracked and
    /// moving it between buckets only when the bucket actually changes.
    pub fn update(&self, pid: PageId, free_bytes: u16) {
        let mut state = self.inner.lock();
        let new_bucket = state.bucket_index(free_bytes as u32);

        if let Some(old_bucket) = state.pid_bucket.get(&pid).copied() {
            if old_bucket != new_bucket {
                state.buckets[old_bucket].remove(&pid);
                state.buckets[new_bucket].insert(pid);
                state.pid_bucket.insert(pid, new_bucket);
            }
            state.pid_free.insert(pid, free_bytes);
            return;
        }

        state.buckets[new_bucket].insert(pid);
        state.pid_bucket.insert(pid, new_bucket);
        state.pid_free.insert(pid, free_bytes);
    }

    /// Drops a page from the index. Silent no-op when untracked.
    pub fn remove(&self, pid: PageId) {
        let mut state = self.inner.lock();
        let Some(bucket) = state.pid_bucket.remove(&pid) else {
            return;
        };
        state.buckets[bucket].remove(&pid);
        state.pid_free.remove(&pid);
    }

    /// Attaches the segment probe used by
    /// [`rebuild_from_segment`](Self::rebuild_from_segment).
    pub fn register_probe(&self, probe: Arc<dyn SegmentProbe>) {
        self.inner.lock().probe = Some(probe);
    }

    /// Clears the index and repopulates it by probing every page of `seg`.
    ///
    /// # Errors
    ///
    /// [`StorageError::Unavailable`] when no probe is registered.
    pub fn rebuild_from_segment(&self, seg: SegmentId) -> Result<(), StorageError> {
        let mut state = self.inner.lock();
        let probe = state
            .probe
            .clone()
            .ok_or_else(|| StorageError::Unavailable("no segment probe registered".into()))?;

        for bucket in &mut state.buckets {
            bucket.clear();
        }
        state.pid_bucket.clear();
        state.pid_free.clear();

        let pages = probe.page_count(seg);
        for i in 0..pages {
            let pid = PageId::new(i as u32);
            let free = probe.probe_page_free(seg, pid);
            let bucket = state.bucket_index(free as u32);
            state.buckets[bucket].insert(pid);
            state.pid_bucket.insert(pid, bucket);
            state.pid_free.insert(pid, free);
        }
        log::debug!("fsm rebuilt from segment {}: {} pages", seg, pages);
        Ok(())
    }

    /// Number of page ids per bucket.
    pub fn bin_sizes(&self) -> Vec<usize> {
        let state = self.inner.lock();
        state.buckets.iter().map(|b| b.len()).collect()
    }

    /// Snapshot of the normalized thresholds.
    pub fn bin_thresholds(&self) -> Vec<u32> {
        self.inner.lock().thresholds.clone()
    }

    /// Total number of tracked pages.
    pub fn tracked_pages(&self) -> usize {
        self.inner.lock().pid_bucket.len()
    }
}
