//! In-memory, weight-bounded LRU image cache.

use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::domain::entities::{CacheKey, DecodedImage, Weigher};
use crate::domain::ports::ImageCachePort;

/// Full-screen images the memory tier should hold when a display size is known.
pub const SCREENS_OF_MEMORY_CACHE: u64 = 4;

/// Assumed bytes per decoded pixel.
pub const BYTES_PER_PIXEL: u64 = 4;

/// Fraction of the process memory budget given to the memory tier.
pub const MEMORY_BUDGET_DIVISOR: u64 = 8;

/// Computes the memory tier capacity in bytes.
///
/// One eighth of the memory budget, further capped at four full-screen
/// images when the display size is known.
#[must_use]
pub fn memory_capacity(memory_budget: u64, display: Option<(u32, u32)>) -> u64 {
    let of_budget = memory_budget / MEMORY_BUDGET_DIVISOR;
    match display {
        Some((width, height)) => {
            let screen_bytes = u64::from(width) * u64::from(height) * BYTES_PER_PIXEL;
            of_budget.min(screen_bytes.saturating_mul(SCREENS_OF_MEMORY_CACHE))
        }
        None => of_budget,
    }
}

struct Entry {
    image: DecodedImage,
    weight: u64,
}

struct Inner {
    entries: LruCache<CacheKey, Entry>,
    weight: u64,
}

/// In-memory LRU cache for decoded images, bounded by summed byte weight.
/// Thread-safe; one lock guards the whole tier.
pub struct MemoryImageCache {
    inner: Mutex<Inner>,
    capacity: u64,
    weigher: Weigher,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl MemoryImageCache {
    /// Creates a new cache holding at most `capacity` bytes.
    #[must_use]
    pub fn new(capacity: u64, weigher: Weigher) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                weight: 0,
            }),
            capacity,
            weigher,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Returns the configured capacity in bytes.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        let inner = self.inner.lock();
        CacheStats {
            hits,
            misses,
            evictions: self.evictions.load(Ordering::Relaxed),
            hit_rate,
            size: inner.entries.len(),
            weight: inner.weight,
            capacity: self.capacity,
        }
    }

    /// Peeks at an image without promoting it in the LRU.
    pub fn peek(&self, key: &CacheKey) -> Option<DecodedImage> {
        let inner = self.inner.lock();
        inner.entries.peek(key).map(|e| e.image.clone())
    }

    fn trim_to_capacity(&self, inner: &mut Inner) {
        while inner.weight > self.capacity {
            let Some((key, entry)) = inner.entries.pop_lru() else {
                break;
            };
            inner.weight -= entry.weight;
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, weight = entry.weight, "Evicted image from memory cache");
        }
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of capacity evictions.
    pub evictions: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of cached images.
    pub size: usize,
    /// Current summed weight in bytes.
    pub weight: u64,
    /// Capacity in bytes.
    pub capacity: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Cache: {} images, {}/{} bytes, {:.1}% hit rate ({} hits, {} misses, {} evictions)",
            self.size,
            self.weight,
            self.capacity,
            self.hit_rate,
            self.hits,
            self.misses,
            self.evictions
        )
    }
}

impl ImageCachePort for MemoryImageCache {
    fn get(&self, key: &CacheKey) -> Option<DecodedImage> {
        if key.is_empty() {
            return None;
        }
        let mut inner = self.inner.lock();
        if let Some(entry) = inner.entries.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache hit");
            Some(entry.image.clone())
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory cache miss");
            None
        }
    }

    fn put(&self, key: CacheKey, image: DecodedImage) -> Option<DecodedImage> {
        if key.is_empty() || !image.is_valid() {
            trace!(key = %key, "Rejected memory cache insert");
            return None;
        }
        let weight = self.weigher.weigh(image.image());
        let mut inner = self.inner.lock();
        debug!(key = %key, weight, "Storing image in memory cache");
        let previous = inner.entries.put(key, Entry { image, weight });
        if let Some(old) = &previous {
            inner.weight -= old.weight;
        }
        inner.weight += weight;
        self.trim_to_capacity(&mut inner);
        previous.map(|e| e.image)
    }

    fn remove(&self, key: &CacheKey) -> Option<DecodedImage> {
        if key.is_empty() {
            return None;
        }
        let mut inner = self.inner.lock();
        let entry = inner.entries.pop(key)?;
        inner.weight -= entry.weight;
        debug!(key = %key, "Removed image from memory cache");
        Some(entry.image)
    }

    fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    fn weight(&self) -> u64 {
        self.inner.lock().weight
    }

    fn evict_all(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.weight = 0;
        debug!("Cleared memory image cache");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 10x10 RGBA: 400 bytes.
    fn image() -> DecodedImage {
        DecodedImage::new(image::DynamicImage::new_rgba8(10, 10))
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::from_locator(s)
    }

    #[test]
    fn test_cache_put_and_get() {
        let cache = MemoryImageCache::new(10_000, Weigher::ByteCount);
        let img = image();

        assert!(cache.put(key("a"), img.clone()).is_none());
        let retrieved = cache.get(&key("a")).unwrap();

        assert!(retrieved.ptr_eq(&img));
        assert_eq!(cache.weight(), 400);
    }

    #[test]
    fn test_cache_miss() {
        let cache = MemoryImageCache::new(10_000, Weigher::ByteCount);
        assert!(cache.get(&key("nonexistent")).is_none());
    }

    #[test]
    fn test_invalid_image_is_rejected() {
        let cache = MemoryImageCache::new(10_000, Weigher::ByteCount);
        let blank = DecodedImage::new(image::DynamicImage::new_rgba8(0, 0));
        assert!(cache.put(key("a"), blank).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_put_replaces_and_returns_previous() {
        let cache = MemoryImageCache::new(10_000, Weigher::ByteCount);
        let first = image();
        let second = DecodedImage::new(image::DynamicImage::new_rgba8(5, 5));

        cache.put(key("a"), first.clone());
        let previous = cache.put(key("a"), second).unwrap();

        assert!(previous.ptr_eq(&first));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.weight(), 100);
    }

    #[test]
    fn test_eviction_is_weight_based_and_lru_ordered() {
        // Room for two 400-byte images.
        let cache = MemoryImageCache::new(800, Weigher::ByteCount);

        cache.put(key("1"), image());
        cache.put(key("2"), image());
        cache.put(key("3"), image());

        assert!(cache.peek(&key("1")).is_none());
        assert!(cache.peek(&key("2")).is_some());
        assert!(cache.peek(&key("3")).is_some());
        assert_eq!(cache.weight(), 800);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_resets_recency() {
        let cache = MemoryImageCache::new(800, Weigher::ByteCount);

        cache.put(key("1"), image());
        cache.put(key("2"), image());
        assert!(cache.get(&key("1")).is_some());
        cache.put(key("3"), image());

        assert!(cache.peek(&key("1")).is_some());
        assert!(cache.peek(&key("2")).is_none());
    }

    #[test]
    fn test_oversized_item_is_not_retained() {
        let cache = MemoryImageCache::new(399, Weigher::ByteCount);
        cache.put(key("big"), image());

        assert!(cache.get(&key("big")).is_none());
        assert_eq!(cache.weight(), 0);
    }

    #[test]
    fn test_remove_and_evict_all() {
        let cache = MemoryImageCache::new(10_000, Weigher::RowBytes);
        cache.put(key("1"), image());
        cache.put(key("2"), image());

        assert!(cache.remove(&key("1")).is_some());
        assert!(cache.remove(&key("1")).is_none());
        assert_eq!(cache.weight(), 400);

        cache.evict_all();
        assert!(cache.is_empty());
        assert_eq!(cache.weight(), 0);
    }

    #[test]
    fn test_cache_stats() {
        let cache = MemoryImageCache::new(10_000, Weigher::ByteCount);
        cache.put(key("1"), image());

        let _ = cache.get(&key("1"));
        let _ = cache.get(&key("missing"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
    }

    #[test]
    fn test_peek_does_not_promote() {
        let cache = MemoryImageCache::new(800, Weigher::ByteCount);
        cache.put(key("1"), image());
        cache.put(key("2"), image());

        let _ = cache.peek(&key("1"));
        cache.put(key("3"), image());

        assert!(cache.peek(&key("1")).is_none());
    }

    #[test]
    fn test_capacity_policy() {
        let budget = 512 * 1024 * 1024;
        assert_eq!(memory_capacity(budget, None), 64 * 1024 * 1024);
        // 1080x1920 screen: 8294400 bytes, four screens = 33177600.
        assert_eq!(memory_capacity(budget, Some((1080, 1920))), 33_177_600);
        // Small budget wins over a large screen.
        assert_eq!(memory_capacity(8 * 1024 * 1024, Some((4000, 4000))), 1024 * 1024);
    }
}
