//! Bounded LRU frame cache shared by processing graphs.
//!
//! Entries are keyed by `(GraphId, frame index)`. Graph identities are never
//! reused, so a cached frame can only be served to the graph that rendered it.
//! When a graph is retired its entries are dropped with
//! [`FrameCache::invalidate_graph`].
//!
//! `get` needs the write lock because it refreshes recency; `peek` only reads.

use crate::pipeline::frame::Frame;
use crate::pipeline::id::GraphId;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

type CacheKey = (GraphId, u64);

/// Hit/miss counters and occupancy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub len: usize,
    pub capacity: usize,
}

pub struct FrameCache {
    entries: RwLock<LruCache<CacheKey, Frame>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl FrameCache {
    /// Create a cache holding at most `capacity` frames (minimum one).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: RwLock::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    // Lock poisoning is ignored.
    fn read(&self) -> RwLockReadGuard<'_, LruCache<CacheKey, Frame>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, LruCache<CacheKey, Frame>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Look up a frame and mark it most recently used.
    pub fn get(&self, graph: GraphId, frame_index: u64) -> Option<Frame> {
        let frame = self.write().get(&(graph, frame_index)).cloned();
        let counter = if frame.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        frame
    }

    /// Look up a frame without touching recency.
    pub fn peek(&self, graph: GraphId, frame_index: u64) -> Option<Frame> {
        self.read().peek(&(graph, frame_index)).cloned()
    }

    /// Whether a frame is cached, without touching recency.
    pub fn contains(&self, graph: GraphId, frame_index: u64) -> bool {
        self.read().contains(&(graph, frame_index))
    }

    /// Insert a frame, evicting the least recently used entry when full.
    pub fn put(&self, graph: GraphId, frame_index: u64, frame: Frame) {
        if let Some(((old_graph, old_index), _)) = self.write().push((graph, frame_index), frame) {
            if (old_graph, old_index) != (graph, frame_index) {
                tracing::trace!("Evicted frame {} of graph {}", old_index, old_graph);
            }
        }
    }

    /// Drop one entry. Returns the frame if it was cached.
    pub fn remove(&self, graph: GraphId, frame_index: u64) -> Option<Frame> {
        self.write().pop(&(graph, frame_index))
    }

    /// Drop every entry of `graph`. Returns the number of frames removed.
    pub fn invalidate_graph(&self, graph: GraphId) -> usize {
        let mut entries = self.write();
        let stale: Vec<CacheKey> = entries
            .iter()
            .filter(|((g, _), _)| *g == graph)
            .map(|(key, _)| *key)
            .collect();
        for key in &stale {
            entries.pop(key);
        }
        if !stale.is_empty() {
            tracing::debug!("Invalidated {} cached frames of graph {}", stale.len(), graph);
        }
        stale.len()
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.read().cap().get()
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.read();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            len: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

impl std::fmt::Debug for FrameCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameCache")
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::frame::PixelFormat;

    fn frame(value: u8) -> Frame {
        Frame::filled(1, 1, PixelFormat::Gray8, 24.0, value)
    }

    #[test]
    fn test_put_then_get() {
        let cache = FrameCache::new(4);
        let graph = GraphId::next();
        cache.put(graph, 3, frame(7));

        assert_eq!(cache.get(graph, 3).unwrap().data(), &[7]);
        assert!(cache.get(graph, 4).is_none());
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
    }

    #[test]
    fn test_keys_are_per_graph() {
        let cache = FrameCache::new(4);
        let (a, b) = (GraphId::next(), GraphId::next());
        cache.put(a, 0, frame(1));
        assert!(cache.peek(b, 0).is_none());
    }

    #[test]
    fn test_lru_eviction_respects_get() {
        let cache = FrameCache::new(2);
        let graph = GraphId::next();
        cache.put(graph, 0, frame(0));
        cache.put(graph, 1, frame(1));
        cache.get(graph, 0);
        cache.put(graph, 2, frame(2));

        assert!(cache.contains(graph, 0));
        assert!(!cache.contains(graph, 1));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_peek_does_not_refresh() {
        let cache = FrameCache::new(2);
        let graph = GraphId::next();
        cache.put(graph, 0, frame(0));
        cache.put(graph, 1, frame(1));
        cache.peek(graph, 0);
        cache.put(graph, 2, frame(2));
        assert!(!cache.contains(graph, 0));
    }

    #[test]
    fn test_invalidate_graph_only_touches_that_graph() {
        let cache = FrameCache::new(8);
        let (a, b) = (GraphId::next(), GraphId::next());
        for i in 0..3 {
            cache.put(a, i, frame(i as u8));
            cache.put(b, i, frame(i as u8));
        }
        assert_eq!(cache.invalidate_graph(a), 3);
        assert_eq!(cache.len(), 3);
        assert!(cache.peek(b, 2).is_some());
        assert_eq!(cache.invalidate_graph(a), 0);
    }

    #[test]
    fn test_zero_capacity_becomes_one() {
        let cache = FrameCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
