//! Slotted data-page layout: a small header, a slot-occupancy bitmap, then a
//! fixed number of equal-size record slots.

use crate::record::{bitmap, NO_PAGE};
use crate::storage::buffer::PageGuard;
use crate::storage::PAGE_SIZE;

// Data-page header: num_records (i32), next_free_page_no (i32).
const NUM_RECORDS_OFFSET: usize = 0;
const NEXT_FREE_OFFSET: usize = 4;
pub(crate) const PAGE_HDR_SIZE: usize = 8;

/// Slot geometry shared by every data page of one heap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageLayout {
    pub record_size: usize,
    pub num_records_per_page: usize,
    pub bitmap_size: usize,
}

impl PageLayout {
    /// Pick the largest slot count such that header, bitmap and slots all
    /// fit in one page.
    pub fn for_record_size(record_size: usize) -> Self {
        let avail = PAGE_SIZE - PAGE_HDR_SIZE;
        let mut n = avail * 8 / (record_size * 8 + 1);
        while n > 0 && bitmap::bytes_for(n) + n * record_size > avail {
            n -= 1;
        }
        Self {
            record_size,
            num_records_per_page: n,
            bitmap_size: bitmap::bytes_for(n),
        }
    }
}

/// View of one pinned data page. Consuming it with [`RecordPage::unpin`]
/// releases the pin; dropping it releases the pin clean.
pub(crate) struct RecordPage {
    guard: PageGuard,
    layout: PageLayout,
}

impl RecordPage {
    pub fn new(guard: PageGuard, layout: PageLayout) -> Self {
        Self { guard, layout }
    }

    pub fn page_no(&self) -> i32 {
        self.guard.page_id().page_no
    }

    /// Zero the header and bitmap of a freshly allocated page.
    pub fn init(&mut self) {
        self.set_num_records(0);
        self.set_next_free_page_no(NO_PAGE);
        let range = PAGE_HDR_SIZE..PAGE_HDR_SIZE + self.layout.bitmap_size;
        self.guard[range].fill(0);
    }

    pub fn num_records(&self) -> i32 {
        self.read_i32(NUM_RECORDS_OFFSET)
    }

    pub fn set_num_records(&mut self, num_records: i32) {
        self.write_i32(NUM_RECORDS_OFFSET, num_records);
    }

    pub fn next_free_page_no(&self) -> i32 {
        self.read_i32(NEXT_FREE_OFFSET)
    }

    pub fn set_next_free_page_no(&mut self, page_no: i32) {
        self.write_i32(NEXT_FREE_OFFSET, page_no);
    }

    pub fn bitmap(&self) -> &[u8] {
        &self.guard[PAGE_HDR_SIZE..PAGE_HDR_SIZE + self.layout.bitmap_size]
    }

    pub fn is_occupied(&self, slot_no: usize) -> bool {
        bitmap::is_set(self.bitmap(), slot_no)
    }

    pub fn set_occupied(&mut self, slot_no: usize) {
        bitmap::set(self.bitmap_mut(), slot_no);
    }

    pub fn clear_occupied(&mut self, slot_no: usize) {
        bitmap::clear(self.bitmap_mut(), slot_no);
    }

    pub fn slot(&self, slot_no: usize) -> &[u8] {
        let offset = self.slot_offset(slot_no);
        &self.guard[offset..offset + self.layout.record_size]
    }

    pub fn slot_mut(&mut self, slot_no: usize) -> &mut [u8] {
        let offset = self.slot_offset(slot_no);
        &mut self.guard[offset..offset + self.layout.record_size]
    }

    /// Release the pin, recording whether the page was modified.
    pub fn unpin(self, dirty: bool) {
        self.guard.unpin(dirty);
    }

    fn bitmap_mut(&mut self) -> &mut [u8] {
        &mut self.guard[PAGE_HDR_SIZE..PAGE_HDR_SIZE + self.layout.bitmap_size]
    }

    fn slot_offset(&self, slot_no: usize) -> usize {
        PAGE_HDR_SIZE + self.layout.bitmap_size + slot_no * self.layout.record_size
    }

    fn read_i32(&self, offset: usize) -> i32 {
        i32::from_le_bytes([
            self.guard[offset],
            self.guard[offset + 1],
            self.guard[offset + 2],
            self.guard[offset + 3],
        ])
    }

    fn write_i32(&mut self, offset: usize, value: i32) {
        self.guard[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}
