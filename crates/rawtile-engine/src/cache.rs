//! Byte-bounded LRU cache of rendered tiles.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tracing::debug;

use rawtile_core::RgbImage;

/// One cached tile: an owned interleaved-RGB copy of a tile's inner region.
#[derive(Debug, Clone, PartialEq)]
pub struct TileBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl TileBuffer {
    /// Takes ownership of a rendered tile image.
    pub fn from_rgb(img: RgbImage) -> Self {
        Self { width: img.width, height: img.height, data: img.data }
    }

    /// Accounted size: `w * h * 3 * sizeof(f32)`.
    pub fn byte_count(&self) -> usize {
        self.width as usize * self.height as usize * 3 * std::mem::size_of::<f32>()
    }
}

struct Entry {
    buf: Arc<TileBuffer>,
    bytes: usize,
}

struct CacheState {
    entries: HashMap<u64, Entry>,
    /// Access order, front = least recently used.
    access: VecDeque<u64>,
    total_bytes: usize,
    capacity: usize,
    hits: u64,
    misses: u64,
}

impl CacheState {
    fn evict_to_capacity(&mut self) {
        while self.total_bytes > self.capacity {
            let Some(victim) = self.access.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                self.total_bytes -= entry.bytes;
                debug!(key = victim, bytes = entry.bytes, "evicted tile");
            }
        }
    }

    fn remove_key(&mut self, key: u64) {
        if let Some(old) = self.entries.remove(&key) {
            self.total_bytes -= old.bytes;
            self.access.retain(|k| *k != key);
        }
    }
}

/// LRU tile cache keyed by 64-bit render fingerprints, bounded in bytes.
///
/// One mutex covers the map, the access order and the byte accumulator, so
/// every operation is atomic with respect to the others. Lookups hand out
/// shared handles; the cache keeps its own.
pub struct TileCache {
    state: Mutex<CacheState>,
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TileCache {
    /// Default byte budget: 128 MiB.
    pub const DEFAULT_CAPACITY: usize = 128 * 1024 * 1024;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    /// Creates a cache with an explicit byte budget.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                access: VecDeque::new(),
                total_bytes: 0,
                capacity,
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Fetches the tile under `key` if present with the expected
    /// dimensions. A hit promotes the entry to most-recently-used; a
    /// dimension mismatch counts as a miss but does not evict the entry.
    pub fn lookup(&self, key: u64, width: u32, height: u32) -> Option<Arc<TileBuffer>> {
        let mut state = self.state.lock().expect("tile cache mutex poisoned");
        match state.entries.get(&key) {
            Some(entry) if entry.buf.width == width && entry.buf.height == height => {
                let buf = Arc::clone(&entry.buf);
                state.hits += 1;
                state.access.retain(|k| *k != key);
                state.access.push_back(key);
                Some(buf)
            }
            _ => {
                state.misses += 1;
                None
            }
        }
    }

    /// Stores a tile under `key`, replacing any previous entry at the same
    /// key, then evicts from the LRU end until the budget is met. A buffer
    /// larger than the whole budget is simply not retained.
    pub fn insert(&self, key: u64, buf: TileBuffer) {
        let bytes = buf.byte_count();
        let mut state = self.state.lock().expect("tile cache mutex poisoned");
        state.remove_key(key);
        state.entries.insert(key, Entry { buf: Arc::new(buf), bytes });
        state.access.push_back(key);
        state.total_bytes += bytes;
        state.evict_to_capacity();
    }

    /// Changes the byte budget, evicting immediately if it shrank.
    pub fn set_capacity(&self, capacity: usize) {
        let mut state = self.state.lock().expect("tile cache mutex poisoned");
        state.capacity = capacity;
        state.evict_to_capacity();
    }

    /// Drops every entry.
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("tile cache mutex poisoned");
        state.entries.clear();
        state.access.clear();
        state.total_bytes = 0;
    }

    /// Number of cached tiles.
    pub fn len(&self) -> usize {
        self.state.lock().expect("tile cache mutex poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accounted bytes across all entries.
    pub fn total_bytes(&self) -> usize {
        self.state.lock().expect("tile cache mutex poisoned").total_bytes
    }

    /// Lookup hits since construction.
    pub fn hits(&self) -> u64 {
        self.state.lock().expect("tile cache mutex poisoned").hits
    }

    /// Lookup misses since construction.
    pub fn misses(&self) -> u64 {
        self.state.lock().expect("tile cache mutex poisoned").misses
    }

    /// Whether `key` is resident (any dimensions). Test and debug aid; does
    /// not touch LRU order or counters.
    pub fn contains(&self, key: u64) -> bool {
        self.state.lock().expect("tile cache mutex poisoned").entries.contains_key(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 1-pixel-tall strip accounting roughly `bytes` (each pixel costs
    /// 12 bytes, so 1024 in yields a 85x1 strip worth 1020).
    fn tile_of_bytes(bytes: usize) -> TileBuffer {
        let pixels = bytes / 12;
        TileBuffer {
            width: pixels as u32,
            height: 1,
            data: vec![0.0; pixels * 3],
        }
    }

    #[test]
    fn test_insert_lookup_roundtrip() {
        let cache = TileCache::with_capacity(1 << 20);
        let tile = TileBuffer { width: 2, height: 2, data: vec![0.5; 12] };
        cache.insert(7, tile.clone());
        let out = cache.lookup(7, 2, 2).expect("hit");
        assert_eq!(*out, tile);
        assert_eq!(cache.hits(), 1);
    }

    #[test]
    fn test_dimension_mismatch_is_miss_without_eviction() {
        let cache = TileCache::with_capacity(1 << 20);
        cache.insert(7, TileBuffer { width: 2, height: 2, data: vec![0.0; 12] });
        assert!(cache.lookup(7, 4, 4).is_none());
        assert_eq!(cache.misses(), 1);
        // The entry stays resident and is still a hit at its real size.
        assert!(cache.lookup(7, 2, 2).is_some());
    }

    #[test]
    fn test_byte_accounting_matches_entries() {
        let cache = TileCache::with_capacity(10 * 1024);
        for key in 0..5u64 {
            cache.insert(key, tile_of_bytes(1024));
        }
        assert_eq!(cache.total_bytes(), 5 * 1020); // 85 px * 12 bytes
        cache.clear();
        assert_eq!(cache.total_bytes(), 0);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_replace_same_key_deducts_old_bytes() {
        let cache = TileCache::with_capacity(1 << 20);
        cache.insert(1, tile_of_bytes(2048));
        let first = cache.total_bytes();
        cache.insert(1, tile_of_bytes(1024));
        assert!(cache.total_bytes() < first);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        // Capacity 3 KiB; four 1 KiB tiles A..D, lookup B, insert E.
        // D's insert evicts A; E's insert evicts C (order after the B
        // lookup is C, D, B). Survivors: B, D, E.
        let tile = || tile_of_bytes(1024);
        let cache = TileCache::with_capacity(3 * tile().byte_count());
        let (a, b, c, d, e) = (1u64, 2, 3, 4, 5);

        cache.insert(a, tile());
        cache.insert(b, tile());
        cache.insert(c, tile());
        cache.insert(d, tile());
        assert!(!cache.contains(a), "A is the LRU victim of D's insert");

        assert!(cache.lookup(b, tile().width, 1).is_some());
        cache.insert(e, tile());

        assert!(!cache.contains(c), "C is the LRU victim of E's insert");
        assert!(cache.contains(b));
        assert!(cache.contains(d));
        assert!(cache.contains(e));
    }

    #[test]
    fn test_shrinking_capacity_evicts_immediately() {
        let cache = TileCache::with_capacity(4 * 1020);
        for key in 0..4u64 {
            cache.insert(key, tile_of_bytes(1024));
        }
        assert_eq!(cache.len(), 4);
        cache.set_capacity(2 * 1020);
        assert_eq!(cache.len(), 2);
        assert!(cache.total_bytes() <= 2 * 1020);
        assert!(cache.contains(2) && cache.contains(3));
    }

    #[test]
    fn test_oversized_insert_is_dropped() {
        let cache = TileCache::with_capacity(1024);
        cache.insert(1, tile_of_bytes(8192));
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
    }
}
