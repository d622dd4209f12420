//! Bounded per-tier frame cache with FIFO eviction and explicit release
//!
//! Structure: IndexMap<frame_idx, Bitmap>
//! - O(1) lookup by frame index
//! - Insertion order kept for eviction: the earliest inserted entry goes first.
//!   Lookups do NOT refresh an entry; a preload pass inserts many frames that
//!   are never looked at, so access recency would be meaningless here.
//! - Every bitmap leaving the cache (evicted, replaced, removed, cleared or
//!   rejected at commit) is handed to `FrameBackend::release`.

use indexmap::IndexMap;
use log::{debug, trace};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::entities::{Bitmap, FrameBackend, Tier};

/// Cache statistics for monitoring hit rate
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheStats {
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 { 0.0 } else { self.hits() as f64 / total as f64 }
    }
}

/// Bounded key -> bitmap store for one resolution tier
pub struct FrameCache {
    tier: Tier,
    entries: Mutex<IndexMap<usize, Bitmap>>,
    capacity: usize,
    backend: Arc<dyn FrameBackend>,
    stats: CacheStats,
}

impl FrameCache {
    /// Create cache holding at most `capacity` frames (minimum 1)
    pub fn new(tier: Tier, capacity: usize, backend: Arc<dyn FrameBackend>) -> Self {
        let capacity = capacity.max(1);
        debug!("FrameCache[{}] created: capacity={}", tier, capacity);
        Self {
            tier,
            entries: Mutex::new(IndexMap::with_capacity(capacity)),
            capacity,
            backend,
            stats: CacheStats::default(),
        }
    }

    /// Lookup for drawing; records hit/miss
    pub fn get(&self, frame_idx: usize) -> Option<Bitmap> {
        let result = self.peek(frame_idx);
        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        result
    }

    /// Lookup without touching stats
    pub fn peek(&self, frame_idx: usize) -> Option<Bitmap> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(&frame_idx).cloned()
    }

    pub fn contains(&self, frame_idx: usize) -> bool {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.contains_key(&frame_idx)
    }

    /// Insert unconditionally. Returns the cache size after insertion.
    pub fn insert(&self, frame_idx: usize, bitmap: Bitmap) -> usize {
        self.commit_if(frame_idx, bitmap, || true).unwrap_or_else(|rejected| {
            self.backend.release(rejected);
            self.len()
        })
    }

    /// Insert only if `accept()` holds, evaluated under the cache lock.
    ///
    /// On rejection the bitmap is returned untouched so the caller can release it.
    /// On success returns the cache size after insertion.
    pub fn commit_if(
        &self,
        frame_idx: usize,
        bitmap: Bitmap,
        accept: impl FnOnce() -> bool,
    ) -> Result<usize, Bitmap> {
        let mut dropped = Vec::new();
        let len = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if !accept() {
                return Err(bitmap);
            }

            // Replacing counts as a fresh insertion
            if let Some(old) = entries.shift_remove(&frame_idx) {
                trace!("FrameCache[{}] replaced frame {}", self.tier, frame_idx);
                dropped.push(old);
            }

            while entries.len() >= self.capacity {
                match entries.shift_remove_index(0) {
                    Some((evicted_idx, evicted)) => {
                        trace!("FrameCache[{}] evicted frame {}", self.tier, evicted_idx);
                        self.stats.record_eviction();
                        dropped.push(evicted);
                    }
                    None => break,
                }
            }

            entries.insert(frame_idx, bitmap);
            entries.len()
        };

        self.release_all(dropped);
        Ok(len)
    }

    /// Remove and release one frame. Returns true if it was present.
    pub fn remove(&self, frame_idx: usize) -> bool {
        let removed = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.shift_remove(&frame_idx)
        };
        match removed {
            Some(bitmap) => {
                self.backend.release(bitmap);
                true
            }
            None => false,
        }
    }

    /// Keep only frames for which `keep` holds; release the rest.
    pub fn retain(&self, mut keep: impl FnMut(usize) -> bool) -> usize {
        let dropped: Vec<Bitmap> = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            let doomed: Vec<usize> = entries.keys().copied().filter(|&idx| !keep(idx)).collect();
            doomed
                .into_iter()
                .filter_map(|idx| entries.shift_remove(&idx))
                .collect()
        };
        let count = dropped.len();
        self.release_all(dropped);
        count
    }

    /// Release every cached bitmap. Returns how many were released.
    pub fn clear(&self) -> usize {
        let dropped: Vec<Bitmap> = {
            let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            entries.drain(..).map(|(_, bitmap)| bitmap).collect()
        };
        let count = dropped.len();
        self.release_all(dropped);
        if count > 0 {
            debug!("FrameCache[{}] cleared: {} frames released", self.tier, count);
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cached indices, oldest insertion first
    pub fn keys(&self) -> Vec<usize> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.keys().copied().collect()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn release_all(&self, bitmaps: Vec<Bitmap>) {
        for bitmap in bitmaps {
            self.backend.release(bitmap);
        }
    }
}

impl Drop for FrameCache {
    fn drop(&mut self) {
        self.clear();
    }
}
