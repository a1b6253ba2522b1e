//! Sequential scan over the occupied slots of a heap file.

use crate::record::error::RecordResult;
use crate::record::heap_file::HeapFile;
use crate::record::rid::Rid;
use crate::record::{bitmap, FIRST_RECORD_PAGE};

/// Cursor over a heap file's records in (page, slot) order, skipping holes.
/// Holds one page pinned at a time, only while advancing. Borrowing the file
/// shared keeps it unmodified for the scan's lifetime.
pub struct RecordScan<'a> {
    file: &'a HeapFile,
    rid: Rid,
}

impl<'a> RecordScan<'a> {
    /// Position on the first record, or at the end for an empty file.
    pub fn open(file: &'a HeapFile) -> RecordResult<Self> {
        let mut scan = Self {
            file,
            rid: Rid::new(FIRST_RECORD_PAGE, -1),
        };
        scan.seek_from(FIRST_RECORD_PAGE, 0)?;
        Ok(scan)
    }

    /// The record the cursor is on. Meaningless once `is_end` is true.
    pub fn rid(&self) -> Rid {
        self.rid
    }

    pub fn is_end(&self) -> bool {
        self.rid.page_no >= self.file.num_pages()
    }

    /// Advance to the next occupied slot, crossing page boundaries.
    pub fn next(&mut self) -> RecordResult<()> {
        if self.is_end() {
            return Ok(());
        }
        self.seek_from(self.rid.page_no, (self.rid.slot_no + 1) as usize)
    }

    fn seek_from(&mut self, mut page_no: i32, mut start: usize) -> RecordResult<()> {
        let slots = self.file.num_records_per_page() as usize;
        while page_no < self.file.num_pages() {
            let page = self.file.fetch_page_handle(page_no)?;
            let found = bitmap::next_set_bit(page.bitmap(), slots, start);
            drop(page);
            if let Some(slot) = found {
                self.rid = Rid::new(page_no, slot as i32);
                return Ok(());
            }
            page_no += 1;
            start = 0;
        }
        self.rid = Rid::new(page_no, -1);
        Ok(())
    }
}
