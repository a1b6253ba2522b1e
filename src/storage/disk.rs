//! Filesystem-level operations and raw page I/O. No caching happens here;
//! the buffer pool above decides what stays in memory.

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::FileId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

pub const PAGE_SIZE: usize = 4096;

struct OpenFile {
    path: PathBuf,
    file: Mutex<File>,
    /// Next page number to hand out for this file. Post-incremented by
    /// `allocate_page`; numbers are never reused.
    next_page_no: AtomicI32,
}

#[derive(Default)]
struct FileTable {
    by_path: HashMap<PathBuf, FileId>,
    by_id: HashMap<FileId, Arc<OpenFile>>,
    next_id: u32,
}

#[derive(Default)]
struct LogFile {
    path: Option<PathBuf>,
    file: Option<File>,
}

/// Creates, opens, closes and destroys files, reads and writes fixed-size
/// pages by `(FileId, page_no)`, and appends to a single log file.
///
/// At most one handle is open per path; the path/id registry enforces this.
pub struct DiskManager {
    files: RwLock<FileTable>,
    log: Mutex<LogFile>,
}

impl DiskManager {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(FileTable::default()),
            log: Mutex::new(LogFile::default()),
        }
    }

    pub fn is_file(path: &Path) -> bool {
        path.is_file()
    }

    pub fn is_dir(path: &Path) -> bool {
        path.is_dir()
    }

    pub fn create_dir(path: &Path) -> StorageResult<()> {
        fs::create_dir(path)?;
        Ok(())
    }

    pub fn destroy_dir(path: &Path) -> StorageResult<()> {
        fs::remove_dir_all(path)?;
        Ok(())
    }

    pub fn get_file_size(path: &Path) -> StorageResult<u64> {
        Ok(fs::metadata(path)?.len())
    }

    /// Create an empty regular file. The file is not left open.
    pub fn create_file(&self, path: &Path) -> StorageResult<()> {
        if Self::is_file(path) {
            return Err(StorageError::FileExists(path.to_path_buf()));
        }
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => StorageError::FileExists(path.to_path_buf()),
                _ => StorageError::Io(e),
            })?;
        Ok(())
    }

    /// Remove a file. Open files must be closed first.
    pub fn destroy_file(&self, path: &Path) -> StorageResult<()> {
        if !Self::is_file(path) {
            return Err(StorageError::FileNotFound(path.to_path_buf()));
        }
        if self.files.read().by_path.contains_key(path) {
            return Err(StorageError::FileNotClosed(path.to_path_buf()));
        }
        fs::remove_file(path)?;
        Ok(())
    }

    /// Open a file for read/write and record it in the registry. Opening a
    /// path twice without closing it fails with `FileNotClosed`.
    pub fn open_file(&self, path: &Path) -> StorageResult<FileId> {
        if !Self::is_file(path) {
            return Err(StorageError::FileNotFound(path.to_path_buf()));
        }
        let mut files = self.files.write();
        if files.by_path.contains_key(path) {
            return Err(StorageError::FileNotClosed(path.to_path_buf()));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let id = FileId(files.next_id);
        files.next_id += 1;
        files.by_path.insert(path.to_path_buf(), id);
        files.by_id.insert(
            id,
            Arc::new(OpenFile {
                path: path.to_path_buf(),
                file: Mutex::new(file),
                next_page_no: AtomicI32::new(0),
            }),
        );
        Ok(id)
    }

    /// Close an open file and clear it from the registry.
    pub fn close_file(&self, fd: FileId) -> StorageResult<()> {
        let mut files = self.files.write();
        let entry = files
            .by_id
            .remove(&fd)
            .ok_or(StorageError::FileNotOpen(fd))?;
        files.by_path.remove(&entry.path);
        Ok(())
    }

    /// Path the handle was opened with.
    pub fn file_name(&self, fd: FileId) -> StorageResult<PathBuf> {
        Ok(self.entry(fd)?.path.clone())
    }

    /// Read exactly `buf.len()` bytes at offset `page_no * PAGE_SIZE`.
    /// A short read is an `Internal` error, not a retryable condition.
    pub fn read_page(&self, fd: FileId, page_no: i32, buf: &mut [u8]) -> StorageResult<()> {
        let entry = self.entry(fd)?;
        let mut file = entry.file.lock();
        file.seek(SeekFrom::Start(Self::page_offset(page_no)?))?;
        file.read_exact(buf).map_err(|e| match e.kind() {
            ErrorKind::UnexpectedEof => StorageError::Internal(format!(
                "short read of page {} in {}",
                page_no,
                entry.path.display()
            )),
            _ => StorageError::Io(e),
        })
    }

    /// Write exactly `buf.len()` bytes at offset `page_no * PAGE_SIZE`,
    /// extending the file if the offset is past the end.
    pub fn write_page(&self, fd: FileId, page_no: i32, buf: &[u8]) -> StorageResult<()> {
        let entry = self.entry(fd)?;
        let mut file = entry.file.lock();
        file.seek(SeekFrom::Start(Self::page_offset(page_no)?))?;
        file.write_all(buf).map_err(|e| match e.kind() {
            ErrorKind::WriteZero => StorageError::Internal(format!(
                "short write of page {} in {}",
                page_no,
                entry.path.display()
            )),
            _ => StorageError::Io(e),
        })
    }

    /// Hand out the next page number for a file. This is the only page-number
    /// allocator; numbers are monotonic per file and never reused.
    pub fn allocate_page(&self, fd: FileId) -> StorageResult<i32> {
        Ok(self.entry(fd)?.next_page_no.fetch_add(1, Ordering::SeqCst))
    }

    /// Page numbers are never reclaimed; disk-level holes are left in place.
    pub fn deallocate_page(&self, _fd: FileId, _page_no: i32) {}

    /// Reset the allocation counter for a file.
    ///
    /// The counter is not persisted and restarts at zero every time a file is
    /// opened; callers reopening an existing file must seed it from their own
    /// page count or later allocations will collide with existing pages.
    pub fn set_next_page_no(&self, fd: FileId, page_no: i32) -> StorageResult<()> {
        self.entry(fd)?.next_page_no.store(page_no, Ordering::SeqCst);
        Ok(())
    }

    /// Register where the log file lives. Called once when a database is
    /// created or opened; the file itself opens lazily on first use.
    pub fn set_log_path(&self, path: &Path) {
        let mut log = self.log.lock();
        log.path = Some(path.to_path_buf());
        log.file = None;
    }

    /// Append `buf` at the end of the log file.
    pub fn write_log(&self, buf: &[u8]) -> StorageResult<()> {
        let mut log = self.log.lock();
        let file = Self::log_file(&mut log)?;
        file.seek(SeekFrom::End(0))?;
        file.write_all(buf)?;
        Ok(())
    }

    /// Read up to `buf.len()` bytes of the log starting at `offset`.
    ///
    /// Returns `Some(n)` for the bytes actually read, `Some(0)` at end of
    /// file, and `None` when `offset` lies beyond the end of the file.
    pub fn read_log(&self, buf: &mut [u8], offset: u64) -> StorageResult<Option<usize>> {
        let mut log = self.log.lock();
        let file = Self::log_file(&mut log)?;
        let size = file.metadata()?.len();
        if offset > size {
            return Ok(None);
        }
        let n = usize::min(buf.len(), (size - offset) as usize);
        if n == 0 {
            return Ok(Some(0));
        }
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..n])?;
        Ok(Some(n))
    }

    fn log_file(log: &mut LogFile) -> StorageResult<&mut File> {
        match &mut log.file {
            Some(file) => Ok(file),
            file @ None => {
                let path = log
                    .path
                    .as_ref()
                    .ok_or_else(|| StorageError::Internal("log path not set".into()))?;
                if !Self::is_file(path) {
                    return Err(StorageError::FileNotFound(path.clone()));
                }
                let opened = OpenOptions::new().read(true).write(true).open(path)?;
                Ok(file.insert(opened))
            }
        }
    }

    fn entry(&self, fd: FileId) -> StorageResult<Arc<OpenFile>> {
        self.files
            .read()
            .by_id
            .get(&fd)
            .cloned()
            .ok_or(StorageError::FileNotOpen(fd))
    }

    fn page_offset(page_no: i32) -> StorageResult<u64> {
        if page_no < 0 {
            return Err(StorageError::Internal(format!(
                "negative page number {}",
                page_no
            )));
        }
        Ok(page_no as u64 * PAGE_SIZE as u64)
    }
}

impl Default for DiskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use tempfile::tempdir;

    #[test]
    fn test_create_open_close_destroy() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let dm = DiskManager::new();

        dm.create_file(&path)?;
        assert!(matches!(
            dm.create_file(&path),
            Err(StorageError::FileExists(_))
        ));

        let fd = dm.open_file(&path)?;
        assert_eq!(dm.file_name(fd)?, path);

        // Double open and destroy-while-open are both rejected.
        assert!(matches!(
            dm.open_file(&path),
            Err(StorageError::FileNotClosed(_))
        ));
        assert!(matches!(
            dm.destroy_file(&path),
            Err(StorageError::FileNotClosed(_))
        ));

        dm.close_file(fd)?;
        assert!(matches!(
            dm.close_file(fd),
            Err(StorageError::FileNotOpen(_))
        ));

        dm.destroy_file(&path)?;
        assert!(matches!(
            dm.destroy_file(&path),
            Err(StorageError::FileNotFound(_))
        ));

        Ok(())
    }

    #[test]
    fn test_open_nonexistent_file() {
        let dm = DiskManager::new();
        let result = dm.open_file(Path::new("/nonexistent/file.db"));
        assert!(matches!(result, Err(StorageError::FileNotFound(_))));
    }

    #[test]
    fn test_write_and_read_page() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let dm = DiskManager::new();
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;

        let mut write_buf = vec![0u8; PAGE_SIZE];
        write_buf[0] = 42;
        write_buf[PAGE_SIZE - 1] = 24;
        dm.write_page(fd, 0, &write_buf)?;

        let mut read_buf = vec![0u8; PAGE_SIZE];
        dm.read_page(fd, 0, &mut read_buf)?;
        assert_eq!(read_buf, write_buf);

        dm.close_file(fd)?;
        Ok(())
    }

    #[test]
    fn test_page_boundary() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let dm = DiskManager::new();
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;

        dm.write_page(fd, 0, &vec![1u8; PAGE_SIZE])?;
        dm.write_page(fd, 1, &vec![2u8; PAGE_SIZE])?;

        let mut buf = vec![0u8; PAGE_SIZE];
        dm.read_page(fd, 0, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 1));
        dm.read_page(fd, 1, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 2));

        Ok(())
    }

    #[test]
    fn test_partial_page_io() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let dm = DiskManager::new();
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;

        // Header-sized transfers read and write exactly the buffer length.
        let hdr = [7u8; 20];
        dm.write_page(fd, 0, &hdr)?;
        let mut buf = [0u8; 20];
        dm.read_page(fd, 0, &mut buf)?;
        assert_eq!(buf, hdr);

        Ok(())
    }

    #[test]
    fn test_short_read_is_internal_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let dm = DiskManager::new();
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;

        let mut buf = vec![0u8; PAGE_SIZE];
        let result = dm.read_page(fd, 10, &mut buf);
        assert!(matches!(result, Err(StorageError::Internal(_))));

        Ok(())
    }

    #[test]
    fn test_allocate_page_is_monotonic() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let dm = DiskManager::new();
        dm.create_file(&path)?;
        let fd = dm.open_file(&path)?;

        assert_eq!(dm.allocate_page(fd)?, 0);
        assert_eq!(dm.allocate_page(fd)?, 1);
        assert_eq!(dm.allocate_page(fd)?, 2);
        dm.deallocate_page(fd, 1);
        assert_eq!(dm.allocate_page(fd)?, 3);

        Ok(())
    }

    #[test]
    fn test_counter_reseed_after_reopen() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let dm = DiskManager::new();
        dm.create_file(&path)?;

        let fd = dm.open_file(&path)?;
        assert_eq!(dm.allocate_page(fd)?, 0);
        assert_eq!(dm.allocate_page(fd)?, 1);
        dm.close_file(fd)?;

        // A fresh open restarts the counter at zero; the reseed hook moves it
        // past the pages that already exist.
        let fd = dm.open_file(&path)?;
        assert_eq!(dm.allocate_page(fd)?, 0);
        dm.set_next_page_no(fd, 2)?;
        assert_eq!(dm.allocate_page(fd)?, 2);

        Ok(())
    }

    #[test]
    fn test_file_ids_are_not_reused() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let dm = DiskManager::new();
        dm.create_file(&path)?;

        let fd1 = dm.open_file(&path)?;
        dm.close_file(fd1)?;
        let fd2 = dm.open_file(&path)?;
        assert_ne!(fd1, fd2);

        Ok(())
    }

    #[test]
    fn test_log_append_and_read() -> Result<()> {
        let dir = tempdir()?;
        let log_path = dir.path().join("test.log");
        let dm = DiskManager::new();
        dm.create_file(&log_path)?;
        dm.set_log_path(&log_path);

        dm.write_log(b"hello ")?;
        dm.write_log(b"world")?;

        let mut buf = [0u8; 16];
        assert_eq!(dm.read_log(&mut buf, 0)?, Some(11));
        assert_eq!(&buf[..11], b"hello world");

        // Reads past the current end report EOF; offsets beyond it, None.
        assert_eq!(dm.read_log(&mut buf, 11)?, Some(0));
        assert_eq!(dm.read_log(&mut buf, 12)?, None);

        // A short tail read returns only what exists.
        assert_eq!(dm.read_log(&mut buf, 6)?, Some(5));
        assert_eq!(&buf[..5], b"world");

        Ok(())
    }

    #[test]
    fn test_dir_helpers() -> Result<()> {
        let dir = tempdir()?;
        let sub = dir.path().join("db");

        assert!(!DiskManager::is_dir(&sub));
        DiskManager::create_dir(&sub)?;
        assert!(DiskManager::is_dir(&sub));
        DiskManager::destroy_dir(&sub)?;
        assert!(!DiskManager::is_dir(&sub));

        Ok(())
    }
}
