use super::replacer::{FrameId, Replacer};
use std::collections::{HashSet, VecDeque};

/// Least-recently-used eviction: frames leave the back of the queue in the
/// order they were unpinned.
#[derive(Debug)]
pub struct LruReplacer {
    /// Evictable frames, most recently unpinned at the front.
    queue: VecDeque<FrameId>,
    /// Membership set mirroring `queue`; every tracked frame appears exactly
    /// once in both.
    tracked: HashSet<FrameId>,
    /// Maximum number of frames the policy will track.
    max_size: usize,
}

impl LruReplacer {
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(max_size),
            tracked: HashSet::with_capacity(max_size),
            max_size,
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&mut self) -> Option<FrameId> {
        let frame_id = self.queue.pop_back()?;
        self.tracked.remove(&frame_id);
        Some(frame_id)
    }

    fn pin(&mut self, frame_id: FrameId) {
        if self.tracked.remove(&frame_id) {
            if let Some(pos) = self.queue.iter().position(|&f| f == frame_id) {
                self.queue.remove(pos);
            }
        }
    }

    fn unpin(&mut self, frame_id: FrameId) {
        // Idempotent: the pool may report every pin-count-reaches-zero
        // transition, not just the first.
        if self.tracked.contains(&frame_id) || self.queue.len() >= self.max_size {
            return;
        }
        self.queue.push_front(frame_id);
        self.tracked.insert(frame_id);
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_victim_order_is_lru() {
        let mut replacer = LruReplacer::new(3);

        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.victim(), None);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        assert_eq!(replacer.size(), 3);

        // Least recently unpinned goes first.
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_pin_removes_from_candidates() {
        let mut replacer = LruReplacer::new(3);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.pin(1);
        assert_eq!(replacer.size(), 1);

        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);

        replacer.unpin(1);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn test_duplicate_unpin_keeps_position() {
        let mut replacer = LruReplacer::new(3);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(1);
        assert_eq!(replacer.size(), 2);

        // The duplicate unpin of 1 must not move it behind 2.
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
    }

    #[test]
    fn test_pin_untracked_is_noop() {
        let mut replacer = LruReplacer::new(2);
        replacer.pin(999);
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_capacity_limit() {
        let mut replacer = LruReplacer::new(2);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3); // over capacity, dropped

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_interleaved_pin_unpin() {
        let mut replacer = LruReplacer::new(3);

        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);

        replacer.pin(2);
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.victim(), Some(1));

        replacer.unpin(2);
        replacer.unpin(4);

        assert_eq!(replacer.victim(), Some(3));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(4));
    }
}
