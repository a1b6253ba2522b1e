//! Fixed-size cache of page frames in front of the disk manager.
//!
//! All pool state (frames, page table, free list) sits behind one mutex; the
//! replacer has its own. The pool may call into the replacer while holding
//! its lock, never the other way around. I/O for misses and flushes happens
//! with the pool lock held, which serializes them.

pub mod lru;
pub mod replacer;

use crate::storage::disk::{DiskManager, PAGE_SIZE};
use crate::storage::error::StorageResult;
use crate::storage::page::{FileId, PageId};
use parking_lot::Mutex;
use replacer::{FrameId, Replacer};
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

struct Frame {
    id: PageId,
    data: Box<[u8; PAGE_SIZE]>,
    pin_count: u32,
    dirty: bool,
}

impl Frame {
    fn new() -> Self {
        Self {
            id: PageId::INVALID,
            data: Box::new([0u8; PAGE_SIZE]),
            pin_count: 0,
            dirty: false,
        }
    }

    fn reset(&mut self) {
        self.id = PageId::INVALID;
        self.pin_count = 0;
        self.dirty = false;
        self.data.fill(0);
    }
}

struct PoolState {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
}

struct BufferPoolInner {
    state: Mutex<PoolState>,
    replacer: Mutex<Box<dyn Replacer>>,
    disk: Arc<DiskManager>,
}

#[derive(Clone)]
pub struct BufferPoolManager {
    inner: Arc<BufferPoolInner>,
}

impl BufferPoolManager {
    pub fn new(disk: Arc<DiskManager>, replacer: Box<dyn Replacer>, pool_size: usize) -> Self {
        let frames = (0..pool_size).map(|_| Frame::new()).collect();
        let free_list = (0..pool_size).collect();
        Self {
            inner: Arc::new(BufferPoolInner {
                state: Mutex::new(PoolState {
                    frames,
                    page_table: HashMap::with_capacity(pool_size),
                    free_list,
                }),
                replacer: Mutex::new(replacer),
                disk,
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.inner.state.lock().frames.len()
    }

    /// Pin `page_id` into a frame, reading it from disk on a miss. Returns
    /// `None` when every frame is pinned.
    pub fn fetch_page(&self, page_id: PageId) -> StorageResult<Option<PageGuard>> {
        let mut state = self.inner.state.lock();

        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &mut state.frames[frame_id];
            frame.pin_count += 1;
            let data = frame.data.as_mut() as *mut [u8; PAGE_SIZE];
            self.inner.replacer.lock().pin(frame_id);
            return Ok(Some(self.guard(page_id, frame_id, data)));
        }

        let frame_id = match self.find_victim(&mut state) {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        // Write back whatever the victim held, then drop its mapping.
        let old_id = state.frames[frame_id].id;
        if state.frames[frame_id].dirty {
            let result = self.inner.disk.write_page(
                old_id.file_id,
                old_id.page_no,
                &state.frames[frame_id].data[..],
            );
            if let Err(e) = result {
                self.abandon_victim(&mut state, frame_id);
                return Err(e);
            }
            state.frames[frame_id].dirty = false;
        }
        state.page_table.remove(&old_id);

        let result = self.inner.disk.read_page(
            page_id.file_id,
            page_id.page_no,
            &mut state.frames[frame_id].data[..],
        );
        if let Err(e) = result {
            // The frame's bytes are no longer meaningful; retire it.
            state.frames[frame_id].reset();
            state.free_list.push_back(frame_id);
            return Err(e);
        }

        let frame = &mut state.frames[frame_id];
        frame.id = page_id;
        frame.pin_count = 1;
        let data = frame.data.as_mut() as *mut [u8; PAGE_SIZE];
        state.page_table.insert(page_id, frame_id);
        self.inner.replacer.lock().pin(frame_id);
        Ok(Some(self.guard(page_id, frame_id, data)))
    }

    /// Allocate a fresh page number in `file_id` and pin a zeroed frame for
    /// it. The page reaches disk only through a later flush or eviction of
    /// the dirty frame. Returns `None` when every frame is pinned.
    pub fn new_page(&self, file_id: FileId) -> StorageResult<Option<(PageId, PageGuard)>> {
        let mut state = self.inner.state.lock();

        let frame_id = match self.find_victim(&mut state) {
            Some(frame_id) => frame_id,
            None => return Ok(None),
        };

        let page_no = match self.inner.disk.allocate_page(file_id) {
            Ok(page_no) => page_no,
            Err(e) => {
                self.abandon_victim(&mut state, frame_id);
                return Err(e);
            }
        };
        let page_id = PageId::new(file_id, page_no);

        if let Err(e) = self.update_page(&mut state, frame_id, page_id) {
            self.abandon_victim(&mut state, frame_id);
            return Err(e);
        }

        let frame = &mut state.frames[frame_id];
        frame.pin_count = 1;
        let data = frame.data.as_mut() as *mut [u8; PAGE_SIZE];
        self.inner.replacer.lock().pin(frame_id);
        Ok(Some((page_id, self.guard(page_id, frame_id, data))))
    }

    /// Drop one pin on a resident page. Returns false for pages that are not
    /// resident or not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        unpin_frame(&self.inner, page_id, is_dirty)
    }

    /// Write a resident page back to disk, dirty or not, and clear its dirty
    /// bit. Returns false only when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<bool> {
        let mut state = self.inner.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(false),
        };
        let frame = &mut state.frames[frame_id];
        self.inner
            .disk
            .write_page(page_id.file_id, page_id.page_no, &frame.data[..])?;
        frame.dirty = false;
        Ok(true)
    }

    /// Evict a resident, unpinned page and recycle its frame. Absent pages
    /// succeed vacuously; pinned pages fail. The disk-level page number is
    /// not reclaimed.
    pub fn delete_page(&self, page_id: PageId) -> StorageResult<bool> {
        let mut state = self.inner.state.lock();
        let frame_id = match state.page_table.get(&page_id) {
            Some(&frame_id) => frame_id,
            None => return Ok(true),
        };
        if state.frames[frame_id].pin_count > 0 {
            return Ok(false);
        }
        if state.frames[frame_id].dirty {
            self.inner.disk.write_page(
                page_id.file_id,
                page_id.page_no,
                &state.frames[frame_id].data[..],
            )?;
            state.frames[frame_id].dirty = false;
        }
        state.page_table.remove(&page_id);
        // The frame joins the free list, so the replacer must forget it.
        self.inner.replacer.lock().pin(frame_id);
        state.frames[frame_id].reset();
        state.free_list.push_back(frame_id);
        Ok(true)
    }

    /// Write back every resident page of `file_id` and clear its dirty bit.
    pub fn flush_all_pages(&self, file_id: FileId) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        let PoolState {
            frames, page_table, ..
        } = &mut *state;
        for (&page_id, &frame_id) in page_table.iter() {
            if page_id.file_id != file_id {
                continue;
            }
            let frame = &mut frames[frame_id];
            self.inner
                .disk
                .write_page(page_id.file_id, page_id.page_no, &frame.data[..])?;
            frame.dirty = false;
        }
        Ok(())
    }

    /// Free list first, replacer second. `None` means every frame is pinned.
    fn find_victim(&self, state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Some(frame_id);
        }
        self.inner.replacer.lock().victim()
    }

    /// Put a victim frame back where it came from after a failed operation.
    fn abandon_victim(&self, state: &mut PoolState, frame_id: FrameId) {
        if state.frames[frame_id].id.is_valid() {
            self.inner.replacer.lock().unpin(frame_id);
        } else {
            state.free_list.push_front(frame_id);
        }
    }

    /// Flush the frame if dirty, remap it to `new_id`, and zero its bytes.
    fn update_page(
        &self,
        state: &mut PoolState,
        frame_id: FrameId,
        new_id: PageId,
    ) -> StorageResult<()> {
        let old_id = state.frames[frame_id].id;
        if state.frames[frame_id].dirty {
            self.inner.disk.write_page(
                old_id.file_id,
                old_id.page_no,
                &state.frames[frame_id].data[..],
            )?;
            state.frames[frame_id].dirty = false;
        }
        state.page_table.remove(&old_id);
        state.page_table.insert(new_id, frame_id);
        let frame = &mut state.frames[frame_id];
        frame.data.fill(0);
        frame.id = new_id;
        Ok(())
    }

    fn guard(&self, page_id: PageId, frame_id: FrameId, data: *mut [u8; PAGE_SIZE]) -> PageGuard {
        PageGuard {
            inner: Arc::clone(&self.inner),
            page_id,
            frame_id,
            data,
            released: false,
        }
    }
}

fn unpin_frame(inner: &BufferPoolInner, page_id: PageId, is_dirty: bool) -> bool {
    let mut state = inner.state.lock();
    let frame_id = match state.page_table.get(&page_id) {
        Some(&frame_id) => frame_id,
        None => return false,
    };
    let frame = &mut state.frames[frame_id];
    if frame.pin_count == 0 {
        return false;
    }
    frame.pin_count -= 1;
    // Dirty accumulates: one dirty unpin keeps the page dirty until it is
    // written back, however many clean unpins follow.
    frame.dirty |= is_dirty;
    if frame.pin_count == 0 {
        inner.replacer.lock().unpin(frame_id);
    }
    true
}

/// One pin on a resident page. Dereferences to the frame's bytes; release it
/// with [`PageGuard::unpin`], reporting whether the page was modified.
/// Dropping the guard releases the pin clean.
pub struct PageGuard {
    inner: Arc<BufferPoolInner>,
    page_id: PageId,
    frame_id: FrameId,
    data: *mut [u8; PAGE_SIZE],
    released: bool,
}

impl PageGuard {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Release the pin, recording whether the caller modified the page.
    pub fn unpin(mut self, dirty: bool) {
        self.released = true;
        unpin_frame(&self.inner, self.page_id, dirty);
    }
}

impl Deref for PageGuard {
    type Target = [u8; PAGE_SIZE];

    fn deref(&self) -> &Self::Target {
        // SAFETY: the pin held by this guard keeps the frame mapped to
        // `page_id`, and frame bytes live in a Box whose address is stable.
        unsafe { &*self.data }
    }
}

impl DerefMut for PageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        // SAFETY: as for `deref`; callers serialize access to one page above
        // this layer.
        unsafe { &mut *self.data }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if !self.released {
            unpin_frame(&self.inner, self.page_id, false);
        }
    }
}

// SAFETY: the raw data pointer targets a stably-allocated frame buffer that
// outlives the guard; the pool's locks guard all shared metadata.
unsafe impl Send for PageGuard {}
unsafe impl Sync for PageGuard {}

#[cfg(test)]
mod tests {
    use super::lru::LruReplacer;
    use super::*;
    use crate::storage::error::StorageError;
    use anyhow::Result;
    use std::path::Path;
    use tempfile::TempDir;

    fn setup(pool_size: usize) -> Result<(TempDir, Arc<DiskManager>, BufferPoolManager, FileId)> {
        let dir = tempfile::tempdir()?;
        let disk = Arc::new(DiskManager::new());
        let fd = open_test_file(&disk, dir.path(), "test.db")?;
        let replacer = Box::new(LruReplacer::new(pool_size));
        let pool = BufferPoolManager::new(disk.clone(), replacer, pool_size);
        Ok((dir, disk, pool, fd))
    }

    fn open_test_file(disk: &DiskManager, dir: &Path, name: &str) -> Result<FileId> {
        let path = dir.join(name);
        disk.create_file(&path)?;
        Ok(disk.open_file(&path)?)
    }

    fn seed_page(disk: &DiskManager, fd: FileId, page_no: i32, fill: u8) -> Result<()> {
        disk.write_page(fd, page_no, &[fill; PAGE_SIZE])?;
        Ok(())
    }

    fn pin_count(pool: &BufferPoolManager, page_id: PageId) -> Option<u32> {
        let state = pool.inner.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(state.frames[frame_id].pin_count)
    }

    fn is_dirty(pool: &BufferPoolManager, page_id: PageId) -> Option<bool> {
        let state = pool.inner.state.lock();
        let frame_id = *state.page_table.get(&page_id)?;
        Some(state.frames[frame_id].dirty)
    }

    fn is_resident(pool: &BufferPoolManager, page_id: PageId) -> bool {
        pool.inner.state.lock().page_table.contains_key(&page_id)
    }

    fn evictable(pool: &BufferPoolManager) -> usize {
        pool.inner.replacer.lock().size()
    }

    fn free_frames(pool: &BufferPoolManager) -> usize {
        pool.inner.state.lock().free_list.len()
    }

    #[test]
    fn test_fetch_hit_shares_frame() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(3)?;
        seed_page(&disk, fd, 0, 0xAB)?;
        let p = PageId::new(fd, 0);

        let g1 = pool.fetch_page(p)?.expect("pool has room");
        let g2 = pool.fetch_page(p)?.expect("hit");
        assert_eq!(g1[0], 0xAB);
        assert_eq!(g2[0], 0xAB);
        assert_eq!(pin_count(&pool, p), Some(2));

        g1.unpin(false);
        g2.unpin(false);
        assert_eq!(pin_count(&pool, p), Some(0));
        assert_eq!(evictable(&pool), 1);

        Ok(())
    }

    #[test]
    fn test_lru_eviction_writes_back_dirty_page() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(2)?;
        for page_no in 0..3 {
            seed_page(&disk, fd, page_no, 0x11 * (page_no as u8 + 1))?;
        }
        let (p0, p1, p2) = (
            PageId::new(fd, 0),
            PageId::new(fd, 1),
            PageId::new(fd, 2),
        );

        let mut g0 = pool.fetch_page(p0)?.expect("room");
        g0[0] = 0xEE;
        g0.unpin(true);

        let g1 = pool.fetch_page(p1)?.expect("room");
        g1.unpin(false);

        // p0 is the LRU victim; its modified bytes must reach disk.
        let _g2 = pool.fetch_page(p2)?.expect("evicts p0");
        assert!(!is_resident(&pool, p0));
        assert!(is_resident(&pool, p1));
        assert!(is_resident(&pool, p2));

        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(fd, 0, &mut buf)?;
        assert_eq!(buf[0], 0xEE);
        assert_eq!(buf[1], 0x11);

        Ok(())
    }

    #[test]
    fn test_pool_exhaustion_reports_full() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(2)?;
        for page_no in 0..3 {
            seed_page(&disk, fd, page_no, 0)?;
        }
        disk.set_next_page_no(fd, 3)?;

        let g0 = pool.fetch_page(PageId::new(fd, 0))?.expect("room");
        let g1 = pool.fetch_page(PageId::new(fd, 1))?.expect("room");

        assert!(pool.fetch_page(PageId::new(fd, 2))?.is_none());
        assert!(pool.new_page(fd)?.is_none());

        drop(g0);
        assert!(pool.fetch_page(PageId::new(fd, 2))?.is_some());
        drop(g1);

        Ok(())
    }

    #[test]
    fn test_new_page_starts_zeroed() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(4)?;

        let (page_id, mut guard) = pool.new_page(fd)?.expect("room");
        assert_eq!(page_id, PageId::new(fd, 0));
        assert!(guard.iter().all(|&b| b == 0));

        guard[0] = 7;
        guard.unpin(true);

        assert!(pool.flush_page(page_id)?);
        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(fd, 0, &mut buf)?;
        assert_eq!(buf[0], 7);

        Ok(())
    }

    #[test]
    fn test_unpin_dirty_accumulates() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(2)?;
        seed_page(&disk, fd, 0, 0)?;
        let p = PageId::new(fd, 0);

        let g1 = pool.fetch_page(p)?.expect("room");
        let g2 = pool.fetch_page(p)?.expect("hit");

        g1.unpin(true);
        // A later clean unpin must not lose the dirty bit.
        g2.unpin(false);
        assert_eq!(is_dirty(&pool, p), Some(true));

        Ok(())
    }

    #[test]
    fn test_unpin_misuse_returns_false() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(2)?;
        seed_page(&disk, fd, 0, 0)?;
        let p = PageId::new(fd, 0);

        assert!(!pool.unpin_page(p, false)); // not resident

        let guard = pool.fetch_page(p)?.expect("room");
        guard.unpin(false);
        assert!(!pool.unpin_page(p, false)); // pin count already zero

        Ok(())
    }

    #[test]
    fn test_flush_clean_page_is_idempotent() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(2)?;
        seed_page(&disk, fd, 0, 0x5A)?;
        let p = PageId::new(fd, 0);

        let guard = pool.fetch_page(p)?.expect("room");
        guard.unpin(false);

        assert!(pool.flush_page(p)?);
        assert!(pool.flush_page(p)?);

        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(fd, 0, &mut buf)?;
        assert!(buf.iter().all(|&b| b == 0x5A));

        assert!(!pool.flush_page(PageId::new(fd, 99))?);
        Ok(())
    }

    #[test]
    fn test_delete_page_recycles_frame() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(2)?;
        seed_page(&disk, fd, 0, 0x42)?;
        let p = PageId::new(fd, 0);

        // Absent pages delete vacuously.
        assert!(pool.delete_page(PageId::new(fd, 50))?);

        let guard = pool.fetch_page(p)?.expect("room");
        assert!(!pool.delete_page(p)?); // pinned
        guard.unpin(true);

        assert!(pool.delete_page(p)?);
        assert!(!is_resident(&pool, p));
        assert_eq!(evictable(&pool), 0);
        assert_eq!(free_frames(&pool), 2);

        // The dirty frame was written back before recycling.
        let mut buf = [0u8; PAGE_SIZE];
        disk.read_page(fd, 0, &mut buf)?;
        assert_eq!(buf[0], 0x42);

        Ok(())
    }

    #[test]
    fn test_flush_all_pages_by_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let disk = Arc::new(DiskManager::new());
        let fd_a = open_test_file(&disk, dir.path(), "a.db")?;
        let fd_b = open_test_file(&disk, dir.path(), "b.db")?;
        let pool = BufferPoolManager::new(disk.clone(), Box::new(LruReplacer::new(8)), 8);

        for fd in [fd_a, fd_b] {
            for page_no in 0..2 {
                let (page_id, mut guard) = pool.new_page(fd)?.expect("room");
                assert_eq!(page_id.page_no, page_no);
                guard[0] = 0xC0 + page_no as u8;
                guard.unpin(true);
            }
        }

        pool.flush_all_pages(fd_a)?;

        for page_no in 0..2 {
            assert_eq!(is_dirty(&pool, PageId::new(fd_a, page_no)), Some(false));
            assert_eq!(is_dirty(&pool, PageId::new(fd_b, page_no)), Some(true));
            let mut buf = [0u8; PAGE_SIZE];
            disk.read_page(fd_a, page_no, &mut buf)?;
            assert_eq!(buf[0], 0xC0 + page_no as u8);
        }

        Ok(())
    }

    #[test]
    fn test_fetch_unreadable_page_leaves_pool_consistent() -> Result<()> {
        let (_dir, _disk, pool, fd) = setup(2)?;

        // Nothing on disk yet, so the read comes up short.
        let result = pool.fetch_page(PageId::new(fd, 0));
        assert!(matches!(result, Err(StorageError::Internal(_))));

        // The victim frame went back to the free list.
        assert_eq!(free_frames(&pool), 2);
        assert_eq!(evictable(&pool), 0);

        Ok(())
    }

    #[test]
    fn test_frame_partition_invariant() -> Result<()> {
        let (_dir, disk, pool, fd) = setup(3)?;
        for page_no in 0..4 {
            seed_page(&disk, fd, page_no, page_no as u8)?;
        }

        let check = |pool: &BufferPoolManager| {
            let state = pool.inner.state.lock();
            let pinned = state.frames.iter().filter(|f| f.pin_count > 0).count();
            let free = state.free_list.len();
            drop(state);
            assert_eq!(free + evictable(pool) + pinned, 3);
        };

        check(&pool);
        let g0 = pool.fetch_page(PageId::new(fd, 0))?.expect("room");
        check(&pool);
        let g1 = pool.fetch_page(PageId::new(fd, 1))?.expect("room");
        check(&pool);
        g0.unpin(true);
        check(&pool);
        let _g2 = pool.fetch_page(PageId::new(fd, 2))?.expect("room");
        check(&pool);
        let _g3 = pool.fetch_page(PageId::new(fd, 3))?.expect("evicts");
        check(&pool);
        g1.unpin(false);
        check(&pool);
        assert!(pool.delete_page(PageId::new(fd, 1))?);
        check(&pool);

        Ok(())
    }
}
