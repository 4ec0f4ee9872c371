//! Port definition for the in-memory image tier.

use crate::domain::entities::{CacheKey, DecodedImage};

/// Port for decoded-image caching operations.
/// Implementations must be thread-safe and cheap enough to call from the
/// origin context.
pub trait ImageCachePort: Send + Sync {
    /// Attempts to get an image from the cache, marking it most recently used.
    /// Returns None if not cached or if the key is empty.
    fn get(&self, key: &CacheKey) -> Option<DecodedImage>;

    /// Stores an image, returning the value it replaced.
    /// Empty keys and invalid buffers are ignored.
    fn put(&self, key: CacheKey, image: DecodedImage) -> Option<DecodedImage>;

    /// Removes an image from the cache.
    fn remove(&self, key: &CacheKey) -> Option<DecodedImage>;

    /// Returns the current number of cached images.
    fn len(&self) -> usize;

    /// Returns true if the cache is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the summed weight of all cached images.
    fn weight(&self) -> u64;

    /// Clears all images from the cache.
    fn evict_all(&self);
}
