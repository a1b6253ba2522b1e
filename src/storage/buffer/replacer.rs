use std::fmt::Debug;

/// Index of a frame within the buffer pool's frame array.
pub type FrameId = usize;

/// Eviction policy over the set of unpinned frames. The buffer pool tells the
/// replacer which frames become pinned or evictable; the replacer never calls
/// back into the pool.
pub trait Replacer: Send + Sync + Debug {
    /// Remove and return the frame to evict. `None` if nothing is evictable.
    fn victim(&mut self) -> Option<FrameId>;

    /// Drop a frame from the evictable set. No-op for untracked frames.
    /// Called when a frame's pin count first becomes positive.
    fn pin(&mut self, frame_id: FrameId);

    /// Make a frame evictable. No-op if it is already tracked or the policy
    /// is at capacity. Called when a frame's pin count drops to zero.
    fn unpin(&mut self, frame_id: FrameId);

    /// Number of evictable frames.
    fn size(&self) -> usize;
}
