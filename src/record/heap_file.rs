//! Heap files: fixed-size records in slotted pages, addressed by Rid.
//!
//! Page 0 of the file holds the header; data pages start at page 1. Pages
//! with at least one free slot form a singly-linked free list threaded
//! through the page headers, with its head in the file header. Inserts pull
//! from the head, so a page leaves the list the moment it fills and is
//! prepended again when a delete reopens a slot.

use crate::record::error::{RecordError, RecordResult};
use crate::record::page::{PageLayout, RecordPage};
use crate::record::rid::{Record, Rid};
use crate::record::{bitmap, NO_PAGE};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::disk::DiskManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{FileId, PageId};
use std::sync::Arc;

pub(crate) const FILE_HDR_SIZE: usize = 20;

/// Header persisted on page 0 of every heap file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapFileHeader {
    pub record_size: i32,
    pub num_records_per_page: i32,
    pub bitmap_size: i32,
    pub num_pages: i32,
    pub first_free_page_no: i32,
}

impl HeapFileHeader {
    pub fn new(record_size: usize) -> Self {
        let layout = PageLayout::for_record_size(record_size);
        Self {
            record_size: record_size as i32,
            num_records_per_page: layout.num_records_per_page as i32,
            bitmap_size: layout.bitmap_size as i32,
            num_pages: 1,
            first_free_page_no: NO_PAGE,
        }
    }

    pub fn to_bytes(&self) -> [u8; FILE_HDR_SIZE] {
        let mut buf = [0u8; FILE_HDR_SIZE];
        buf[0..4].copy_from_slice(&self.record_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.num_records_per_page.to_le_bytes());
        buf[8..12].copy_from_slice(&self.bitmap_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.num_pages.to_le_bytes());
        buf[16..20].copy_from_slice(&self.first_free_page_no.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; FILE_HDR_SIZE]) -> Self {
        let read = |offset: usize| {
            i32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
        };
        Self {
            record_size: read(0),
            num_records_per_page: read(4),
            bitmap_size: read(8),
            num_pages: read(12),
            first_free_page_no: read(16),
        }
    }

    fn layout(&self) -> PageLayout {
        PageLayout {
            record_size: self.record_size as usize,
            num_records_per_page: self.num_records_per_page as usize,
            bitmap_size: self.bitmap_size as usize,
        }
    }
}

/// An open heap file. Created and closed by the record manager; all record
/// access goes through the buffer pool.
pub struct HeapFile {
    fd: FileId,
    hdr: HeapFileHeader,
    buffer_pool: BufferPoolManager,
    disk: Arc<DiskManager>,
}

impl HeapFile {
    pub(crate) fn new(
        fd: FileId,
        hdr: HeapFileHeader,
        buffer_pool: BufferPoolManager,
        disk: Arc<DiskManager>,
    ) -> Self {
        Self {
            fd,
            hdr,
            buffer_pool,
            disk,
        }
    }

    pub fn fd(&self) -> FileId {
        self.fd
    }

    pub fn record_size(&self) -> usize {
        self.hdr.record_size as usize
    }

    pub fn num_records_per_page(&self) -> i32 {
        self.hdr.num_records_per_page
    }

    pub fn num_pages(&self) -> i32 {
        self.hdr.num_pages
    }

    pub fn first_free_page_no(&self) -> i32 {
        self.hdr.first_free_page_no
    }

    pub(crate) fn header(&self) -> &HeapFileHeader {
        &self.hdr
    }

    /// Copy the record at `rid` out of its page.
    pub fn get_record(&self, rid: Rid) -> RecordResult<Record> {
        let slot = self.slot_index(rid)?;
        let page = self.fetch_page_handle(rid.page_no)?;
        if !page.is_occupied(slot) {
            return Err(RecordError::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }
        let record = Record::new(page.slot(slot).to_vec());
        page.unpin(false);
        Ok(record)
    }

    /// Insert a record into the first free slot of the free-list head,
    /// creating a new page when the list is empty.
    pub fn insert_record(&mut self, buf: &[u8]) -> RecordResult<Rid> {
        self.check_record_len(buf)?;
        let mut page = self.create_page_handle()?;
        let slot = match bitmap::first_clear_bit(
            page.bitmap(),
            self.hdr.num_records_per_page as usize,
        ) {
            Some(slot) => slot,
            // The free list only holds pages with a free slot.
            None => {
                return Err(StorageError::Internal(format!(
                    "free-list page {} has no free slot",
                    page.page_no()
                ))
                .into())
            }
        };
        page.slot_mut(slot).copy_from_slice(buf);
        page.set_occupied(slot);
        page.set_num_records(page.num_records() + 1);
        if page.num_records() == self.hdr.num_records_per_page {
            // Page is full now: splice it off the free list.
            self.hdr.first_free_page_no = page.next_free_page_no();
        }
        let rid = Rid::new(page.page_no(), slot as i32);
        page.unpin(true);
        Ok(rid)
    }

    /// Place a record at a specific Rid. Used by redo and external loaders;
    /// an already-occupied slot is simply overwritten.
    pub fn insert_record_at(&mut self, rid: Rid, buf: &[u8]) -> RecordResult<()> {
        self.check_record_len(buf)?;
        let slot = self.slot_index(rid)?;
        let mut page = self.fetch_page_handle(rid.page_no)?;
        if !page.is_occupied(slot) {
            page.set_occupied(slot);
            page.set_num_records(page.num_records() + 1);
            if page.num_records() == self.hdr.num_records_per_page {
                self.hdr.first_free_page_no = page.next_free_page_no();
            }
        }
        page.slot_mut(slot).copy_from_slice(buf);
        page.unpin(true);
        Ok(())
    }

    /// Overwrite the record at `rid` in place.
    pub fn update_record(&mut self, rid: Rid, buf: &[u8]) -> RecordResult<()> {
        self.check_record_len(buf)?;
        let slot = self.slot_index(rid)?;
        let mut page = self.fetch_page_handle(rid.page_no)?;
        if !page.is_occupied(slot) {
            return Err(RecordError::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }
        page.slot_mut(slot).copy_from_slice(buf);
        page.unpin(true);
        Ok(())
    }

    /// Delete the record at `rid`, returning its page to the free list when
    /// this opens the first free slot.
    pub fn delete_record(&mut self, rid: Rid) -> RecordResult<()> {
        let slot = self.slot_index(rid)?;
        let mut page = self.fetch_page_handle(rid.page_no)?;
        if !page.is_occupied(slot) {
            return Err(RecordError::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }
        page.clear_occupied(slot);
        page.set_num_records(page.num_records() - 1);
        if page.num_records() == self.hdr.num_records_per_page - 1 {
            // Just went from full to not-full.
            self.release_page_handle(&mut page);
        }
        page.unpin(true);
        Ok(())
    }

    /// Pin a data page and wrap it with this file's slot geometry.
    pub(crate) fn fetch_page_handle(&self, page_no: i32) -> RecordResult<RecordPage> {
        if page_no < 0 || page_no >= self.hdr.num_pages {
            return Err(StorageError::PageNotExist {
                file: self.disk.file_name(self.fd)?,
                page_no,
            }
            .into());
        }
        let guard = self
            .buffer_pool
            .fetch_page(PageId::new(self.fd, page_no))?
            .ok_or_else(|| {
                StorageError::Internal("buffer pool has no evictable frame".into())
            })?;
        Ok(RecordPage::new(guard, self.hdr.layout()))
    }

    /// Allocate and initialize a fresh data page and make it the free-list
    /// head.
    fn create_new_page_handle(&mut self) -> RecordResult<RecordPage> {
        let (page_id, guard) = self.buffer_pool.new_page(self.fd)?.ok_or_else(|| {
            StorageError::Internal("buffer pool has no evictable frame".into())
        })?;
        let mut page = RecordPage::new(guard, self.hdr.layout());
        page.init();
        self.hdr.num_pages += 1;
        self.hdr.first_free_page_no = page_id.page_no;
        Ok(page)
    }

    /// The free-list head, or a fresh page when the list is empty.
    fn create_page_handle(&mut self) -> RecordResult<RecordPage> {
        if self.hdr.first_free_page_no == NO_PAGE {
            return self.create_new_page_handle();
        }
        self.fetch_page_handle(self.hdr.first_free_page_no)
    }

    /// Prepend a page that just regained a free slot to the free list.
    fn release_page_handle(&mut self, page: &mut RecordPage) {
        page.set_next_free_page_no(self.hdr.first_free_page_no);
        self.hdr.first_free_page_no = page.page_no();
    }

    fn slot_index(&self, rid: Rid) -> RecordResult<usize> {
        if rid.slot_no < 0 || rid.slot_no >= self.hdr.num_records_per_page {
            return Err(RecordError::RecordNotFound {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }
        Ok(rid.slot_no as usize)
    }

    fn check_record_len(&self, buf: &[u8]) -> StorageResult<()> {
        if buf.len() != self.hdr.record_size as usize {
            return Err(StorageError::Internal(format!(
                "record buffer is {} bytes, file stores {}-byte records",
                buf.len(),
                self.hdr.record_size
            )));
        }
        Ok(())
    }
}
