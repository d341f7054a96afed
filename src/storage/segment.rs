//! Segment management: one file per table or index.
//!
//! The segment manager owns the mapping `segment id -> file` and hands out
//! page numbers within each segment: freed pages go on a per-segment LIFO
//! free list and are reused before the file grows. Files never shrink.
//!
//! The free list is in-memory only. Pages on it at shutdown are leaked
//! until a full-segment rebuild reclaims them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use super::error::StorageError;
use super::fsm::SegmentProbe;
use super::io::{DiskManager, PageIo};
use super::page::{PageHeader, PageId, SegmentId, PAGE_FORMAT_VERSION, PAGE_HEADER_SIZE};

struct Segment {
    disk: Arc<DiskManager>,
    /// Previously freed page numbers, reused most-recent-first.
    free_list: Vec<PageId>,
}

/// Allocates and recycles pages within segment files.
///
/// Segments are created lazily: the first operation that touches a segment
/// id opens (and if necessary creates) its file under the base directory.
/// All public methods are thread-safe behind one mutex.
pub struct SegmentManager {
    page_size: usize,
    base_dir: PathBuf,
    segments: Mutex<HashMap<SegmentId, Segment>>,
}

impl SegmentManager {
    /// Creates a manager rooted at `base_dir`. The directory must exist and
    /// be writable by the time the first segment is touched.
    pub fn new(page_size: usize, base_dir: impl Into<PathBuf>) -> Self {
        Self {
            page_size,
            base_dir: base_dir.into(),
            segments: Mutex::new(HashMap::new()),
        }
    }

    /// The page size shared by all segments of this manager.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// The directory holding the segment files.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Deterministic file path for a segment.
    pub fn segment_path(&self, seg: SegmentId) -> PathBuf {
        self.base_dir.join(format!("seg_{}.dbseg", seg))
    }

    /// Opens the segment's file, creating it if missing.
    pub fn ensure_segment(&self, seg: SegmentId) -> Result<(), StorageError> {
        let mut segments = self.segments.lock();
        self.ensure_locked(&mut segments, seg)?;
        Ok(())
    }

    /// Returns the I/O handle of a segment, creating the segment if needed.
    pub fn disk(&self, seg: SegmentId) -> Result<Arc<DiskManager>, StorageError> {
        let mut segments = self.segments.lock();
        let segment = self.ensure_locked(&mut segments, seg)?;
        Ok(Arc::clone(&segment.disk))
    }

    /// Allocates a page number in `seg`: the top of the free list when one
    /// exists, otherwise a fresh page appended at the end of the file.
    pub fn allocate_page(&self, seg: SegmentId) -> Result<PageId, StorageError> {
        let mut segments = self.segments.lock();
        let segment = self.ensure_locked(&mut segments, seg)?;

        if let Some(pid) = segment.free_list.pop() {
            return Ok(pid);
        }

        let count = segment.disk.page_count();
        let pid = PageId::new(count as u32);
        segment.disk.resize(count + 1)?;
        Ok(pid)
    }

    /// Returns a page to the segment's free list. The file is not shrunk.
    /// No-op for segments that were never touched.
    pub fn free_page(&self, seg: SegmentId, pid: PageId) {
        let mut segments = self.segments.lock();
        if let Some(segment) = segments.get_mut(&seg) {
            segment.free_list.push(pid);
        }
    }

    /// Number of addressable pages in the segment; 0 when untouched.
    pub fn page_count(&self, seg: SegmentId) -> u64 {
        let segments = self.segments.lock();
        segments.get(&seg).map_or(0, |s| s.disk.page_count())
    }

    /// Reads a page and reports its header's `free_size`.
    ///
    /// Returns 0 on any failure, including an unrecognized format version,
    /// so never-initialized (all-zero) pages probe as full.
    pub fn probe_page_free(&self, seg: SegmentId, pid: PageId) -> u16 {
        let disk = {
            let segments = self.segments.lock();
            match segments.get(&seg) {
                Some(segment) => Arc::clone(&segment.disk),
                None => return 0,
            }
        };

        let mut buf = vec![0u8; self.page_size];
        if disk.read_page(pid, &mut buf).is_err() {
            return 0;
        }
        let header = PageHeader::read_from(&buf[..PAGE_HEADER_SIZE]);
        if header.format_version != PAGE_FORMAT_VERSION {
            return 0;
        }
        header.free_size
    }

    fn ensure_locked<'a>(
        &self,
        segments: &'a mut HashMap<SegmentId, Segment>,
        seg: SegmentId,
    ) -> Result<&'a mut Segment, StorageError> {
        if !segments.contains_key(&seg) {
            let path = self.segment_path(seg);
            let disk = DiskManager::open(&path, self.page_size)?;
            log::debug!("opened segment {} at {}", seg, path.display());
            segments.insert(
                seg,
                Segment {
                    disk: Arc::new(disk),
                    free_list: Vec::new(),
                },
            );
        }
        Ok(segments.get_mut(&seg).expect("segment just inserted"))
    }
}

impl SegmentProbe for SegmentManager {
    fn page_count(&self, seg: SegmentId) -> u64 {
        SegmentManager::page_count(self, seg)
    }

    fn probe_page_free(&self, seg: SegmentId, pid: PageId) -> u16 {
        SegmentManager::probe_page_free(self, seg, pid)
    }
}
