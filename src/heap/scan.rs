//! Sequential heap scan.

use super::page::{Rid, SlottedPage};
use super::table::TableHeap;
use crate::record::Tuple;
use crate::storage::PageId;

/// Iterator over a heap's live tuples in page-major, slot-major order.
///
/// Each page is pinned only while it is being examined and unpinned before
/// the scan moves on; yielded tuples are materialized copies whose lifetime
/// is independent of any pin. Tombstones are skipped, as are pages that
/// cannot be fetched or slots that fail to read (the failure is logged).
///
/// Rows inserted or moved to higher pages during iteration may or may not
/// be observed; the scan makes no snapshot promise.
pub struct TableScan<'a> {
    heap: &'a TableHeap,
    next_page: u32,
    next_slot: u32,
}

impl<'a> TableScan<'a> {
    pub(super) fn new(heap: &'a TableHeap) -> Self {
        Self {
            heap,
            next_page: 0,
            next_slot: 0,
        }
    }
}

impl Iterator for TableScan<'_> {
    type Item = (Rid, Tuple);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let pages = self.heap.segments().page_count(self.heap.segment_id());
            if u64::from(self.next_page) >= pages {
                return None;
            }

            let pid = PageId::new(self.next_page);
            let guard = match self.heap.pool().fetch_page(pid) {
                Ok(guard) => guard,
                Err(e) => {
                    log::debug!("scan: skipping unreadable page {}: {}", pid, e);
                    self.next_page += 1;
                    self.next_slot = 0;
                    continue;
                }
            };

            let page = SlottedPage::new(guard.data());
            let slot_count = u32::from(page.slot_count());
            while self.next_slot < slot_count {
                let slot = self.next_slot as u16;
                self.next_slot += 1;
                match page.get(slot) {
                    Ok(bytes) => {
                        let tuple = Tuple::from_bytes(bytes.to_vec());
                        return Some((Rid::new(pid, slot), tuple));
                    }
                    Err(super::HeapError::SlotNotFound(_)) => {}
                    Err(e) => {
                        log::debug!("scan: skipping slot {} of page {}: {}", slot, pid, e);
                    }
                }
            }

            self.next_page += 1;
            self.next_slot = 0;
        }
    }
}
