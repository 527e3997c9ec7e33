//! Buffer pooling for one window's presentations
//!
//! Presenting a frame needs a buffer the compositor is not reading. Creating
//! a memory file, mapping it and registering a `wl_buffer` every frame is
//! wasteful, so released buffers are kept and reused as long as the canvas
//! size does not change.
//!
//! # Invariants
//!
//! - Every buffer in a non-empty pool has the pool's size; a size change
//!   destroys the whole pool before anything else happens.
//! - A buffer is handed out only after it was atomically claimed, so two
//!   presentations never share one.
//! - After [`BufferPool::compact`] at most `max_free` released buffers remain;
//!   buffers the compositor still holds are never destroyed.

use log::debug;

use super::{check_size, SharedBuffer};
use crate::error::{DriverError, Result};
use crate::geometry::Size;
use crate::protocol::Protocol;

/// Default number of released buffers kept for reuse
pub const DEFAULT_MAX_FREE_BUFFERS: usize = 8;

/// Statistics about buffer pool reuse
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Buffers created
    pub allocations: usize,
    /// Buffers handed out again after a release
    pub reuses: usize,
    /// Buffers destroyed by compaction or invalidation
    pub destroyed: usize,
    /// Pool invalidations caused by a size change
    pub invalidations: usize,
}

impl PoolStats {
    /// Fraction of `take` calls served from the pool
    pub fn hit_rate(&self) -> f32 {
        let total = self.allocations + self.reuses;
        if total == 0 {
            0.0
        } else {
            self.reuses as f32 / total as f32
        }
    }
}

/// Buffers of a single size, owned by one window's frame state.
#[derive(Debug)]
pub struct BufferPool {
    buffers: Vec<SharedBuffer>,
    size: Size,
    max_free: usize,
    stats: PoolStats,
}

impl BufferPool {
    pub fn new(max_free: usize) -> Self {
        Self {
            buffers: Vec::new(),
            size: Size::ZERO,
            max_free: max_free.max(1),
            stats: PoolStats::default(),
        }
    }

    /// Size every pooled buffer has, [`Size::ZERO`] when empty.
    pub fn size(&self) -> Size {
        self.size
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn free_count(&self) -> usize {
        self.buffers.iter().filter(|b| b.is_free()).count()
    }

    pub fn max_free(&self) -> usize {
        self.max_free
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn buffers(&self) -> impl Iterator<Item = &SharedBuffer> {
        self.buffers.iter()
    }

    /// Returns a buffer of `size` that the compositor does not hold, marked
    /// busy.
    ///
    /// A size different from the pool's destroys every pooled buffer first.
    /// Otherwise the oldest released buffer is reused, and a new one is
    /// allocated only if none is released.
    pub fn take(&mut self, protocol: &dyn Protocol, size: Size) -> Result<&mut SharedBuffer> {
        check_size(size)?;

        if size != self.size {
            if !self.buffers.is_empty() {
                debug!("Buffer pool resized {} -> {}, discarding", self.size, size);
                self.stats.invalidations += 1;
            }
            self.destroy_all(protocol);
            self.size = size;
        }

        if let Some(index) = self.buffers.iter().position(|b| b.try_claim()) {
            let id = self.buffers[index].id();
            self.stats.reuses += 1;
            debug!("Reusing buffer {:?} ({} pooled)", id, self.buffers.len());

            self.compact(protocol);
            return self
                .buffers
                .iter_mut()
                .find(|b| b.id() == id)
                .ok_or(DriverError::UnknownBuffer(id));
        }

        let buffer = SharedBuffer::create(protocol, size)?;
        self.stats.allocations += 1;
        let index = self.buffers.len();
        self.buffers.push(buffer);
        Ok(&mut self.buffers[index])
    }

    /// Destroys the oldest released buffers until at most `max_free` remain.
    pub fn compact(&mut self, protocol: &dyn Protocol) {
        let free = self.free_count();
        if free < self.max_free {
            return;
        }

        let mut excess = free - self.max_free;
        let mut kept = Vec::with_capacity(self.buffers.len());
        for buffer in self.buffers.drain(..) {
            if excess > 0 && buffer.is_free() {
                excess -= 1;
                self.stats.destroyed += 1;
                buffer.destroy(protocol);
            } else {
                kept.push(buffer);
            }
        }
        self.buffers = kept;
    }

    /// Destroys every buffer, released or not, and forgets the size.
    pub fn destroy_all(&mut self, protocol: &dyn Protocol) {
        self.stats.destroyed += self.buffers.len();
        for buffer in self.buffers.drain(..) {
            buffer.destroy(protocol);
        }
        self.size = Size::ZERO;
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FREE_BUFFERS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::mock::{Call, MockProtocol};

    #[test]
    fn test_take_allocates_busy_buffer() {
        let protocol = MockProtocol::default();
        let mut pool = BufferPool::default();

        let buffer = pool.take(&protocol, Size::new(100, 50)).unwrap();
        assert_eq!(buffer.size(), Size::new(100, 50));
        assert!(!buffer.is_free());
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.stats().allocations, 1);
    }

    #[test]
    fn test_take_reuses_released_buffer() {
        let protocol = MockProtocol::default();
        let mut pool = BufferPool::default();
        let size = Size::new(10, 10);

        let first = pool.take(&protocol, size).unwrap().id();
        protocol.release(first);

        let second = pool.take(&protocol, size).unwrap();
        assert_eq!(second.id(), first);
        assert!(!second.is_free(), "reused buffer is claimed busy");
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.stats().reuses, 1);
        assert_eq!(pool.stats().hit_rate(), 0.5);
    }

    #[test]
    fn test_busy_buffers_are_never_shared() {
        let protocol = MockProtocol::default();
        let mut pool = BufferPool::default();
        let size = Size::new(10, 10);

        let a = pool.take(&protocol, size).unwrap().id();
        let b = pool.take(&protocol, size).unwrap().id();
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_size_change_discards_pool() {
        let protocol = MockProtocol::default();
        let mut pool = BufferPool::default();

        let old = pool.take(&protocol, Size::new(100, 50)).unwrap().id();
        let new = pool.take(&protocol, Size::new(200, 50)).unwrap();
        assert_eq!(new.size(), Size::new(200, 50));

        assert!(protocol.calls().contains(&Call::DestroyBuffer(old)));
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.size(), Size::new(200, 50));
        assert_eq!(pool.stats().invalidations, 1);
    }

    #[test]
    fn test_compact_keeps_busy_and_caps_free() {
        let protocol = MockProtocol::default();
        let mut pool = BufferPool::new(2);
        let size = Size::new(4, 4);

        let ids: Vec<_> = (0..5)
            .map(|_| pool.take(&protocol, size).unwrap().id())
            .collect();
        // Release the four oldest; the newest stays attached.
        for id in &ids[..4] {
            protocol.release(*id);
        }

        pool.compact(&protocol);
        assert_eq!(pool.free_count(), 2);
        assert_eq!(pool.len(), 3);
        assert!(pool.buffers().any(|b| b.id() == ids[4]));
        assert!(protocol.calls().contains(&Call::DestroyBuffer(ids[0])));
        assert!(protocol.calls().contains(&Call::DestroyBuffer(ids[1])));
    }

    #[test]
    fn test_oversized_take_fails_before_allocating() {
        let protocol = MockProtocol::default();
        let mut pool = BufferPool::default();

        let err = pool.take(&protocol, Size::new(65536, 65536)).unwrap_err();
        assert!(matches!(err, DriverError::BufferTooLarge { .. }));
        assert!(protocol.calls().is_empty());
    }

    #[test]
    fn test_destroy_all_resets_size() {
        let protocol = MockProtocol::default();
        let mut pool = BufferPool::default();
        pool.take(&protocol, Size::new(8, 8)).unwrap();
        pool.take(&protocol, Size::new(8, 8)).unwrap();

        pool.destroy_all(&protocol);
        assert!(pool.is_empty());
        assert_eq!(pool.size(), Size::ZERO);
        assert_eq!(
            protocol.count(|c| matches!(c, Call::DestroyBuffer(_))),
            2
        );
    }
}
