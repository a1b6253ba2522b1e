//! Heap-file lifecycle: create, open, close and destroy the files that back
//! tables. Record access itself lives on [`HeapFile`].

use crate::record::heap_file::{HeapFile, HeapFileHeader, FILE_HDR_SIZE};
use crate::record::page::PageLayout;
use crate::storage::buffer::BufferPoolManager;
use crate::storage::disk::DiskManager;
use crate::storage::error::{StorageError, StorageResult};
use std::path::Path;
use std::sync::Arc;

pub struct RecordManager {
    disk: Arc<DiskManager>,
    buffer_pool: BufferPoolManager,
}

impl RecordManager {
    pub fn new(disk: Arc<DiskManager>, buffer_pool: BufferPoolManager) -> Self {
        Self { disk, buffer_pool }
    }

    /// Create a heap file for `record_size`-byte records and persist its
    /// header. The file is left closed.
    pub fn create_file(&self, path: &Path, record_size: usize) -> StorageResult<()> {
        if record_size == 0 || PageLayout::for_record_size(record_size).num_records_per_page == 0 {
            return Err(StorageError::Internal(format!(
                "record size {} does not fit in a page",
                record_size
            )));
        }
        self.disk.create_file(path)?;
        let fd = self.disk.open_file(path)?;
        let hdr = HeapFileHeader::new(record_size);
        self.disk.write_page(fd, 0, &hdr.to_bytes())?;
        self.disk.close_file(fd)
    }

    /// Open a heap file and read its header. The disk manager's allocation
    /// counter restarts at zero on open, so it is reseeded here from the
    /// header's page count.
    pub fn open_file(&self, path: &Path) -> StorageResult<HeapFile> {
        let fd = self.disk.open_file(path)?;
        let mut buf = [0u8; FILE_HDR_SIZE];
        self.disk.read_page(fd, 0, &mut buf)?;
        let hdr = HeapFileHeader::from_bytes(&buf);
        self.disk.set_next_page_no(fd, hdr.num_pages)?;
        Ok(HeapFile::new(
            fd,
            hdr,
            self.buffer_pool.clone(),
            self.disk.clone(),
        ))
    }

    /// Flush the file's pages, persist its header, and close it.
    pub fn close_file(&self, file: HeapFile) -> StorageResult<()> {
        let fd = file.fd();
        self.buffer_pool.flush_all_pages(fd)?;
        self.disk.write_page(fd, 0, &file.header().to_bytes())?;
        self.disk.close_file(fd)
    }

    /// Remove a heap file. Open files must be closed first.
    pub fn destroy_file(&self, path: &Path) -> StorageResult<()> {
        self.disk.destroy_file(path)
    }
}
