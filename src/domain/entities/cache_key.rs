//! Cache key derivation from resource locators.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept in a key (128 bits).
const KEY_DIGEST_BYTES: usize = 16;

/// Separates the content hash from the requested bounds in memory-tier keys.
/// Never part of the lowercase hex alphabet.
const BOUNDS_DELIMITER: char = '@';

/// Opaque cache key derived from a resource locator.
///
/// The disk tier uses the plain content hash; the memory tier uses a variant
/// qualified with the requested bounds, since decoded buffers are
/// size-specialized while raw bytes are not.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derives the content-hash key for a locator.
    #[must_use]
    pub fn from_locator(locator: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(locator.as_bytes());
        let digest = hasher.finalize();
        Self(hex::encode(&digest[..KEY_DIGEST_BYTES]))
    }

    /// Derives the dimension-qualified key used by the memory tier.
    ///
    /// Formatted as `<hash>@<width>x<height>`, so `(12, 34)` and `(1, 234)`
    /// never collide.
    #[must_use]
    pub fn for_memory(locator: &str, width: u32, height: u32) -> Self {
        let base = Self::from_locator(locator);
        Self(format!("{}{BOUNDS_DELIMITER}{width}x{height}", base.0))
    }

    /// Wraps an already-derived key, e.g. a file stem read back from disk.
    ///
    /// Returns `None` for an empty string.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        (!raw.is_empty()).then_some(Self(raw))
    }

    /// Returns the inner string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns true for an empty key, which every tier rejects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_fixed_length_hex() {
        let key = CacheKey::from_locator("https://example.com/a.png");
        assert_eq!(key.as_str().len(), 32);
        assert!(key.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_key_consistency() {
        let url = "https://example.com/image.png";
        assert_eq!(CacheKey::from_locator(url), CacheKey::from_locator(url));
        assert_ne!(
            CacheKey::from_locator(url),
            CacheKey::from_locator("https://example.com/image2.png")
        );
    }

    #[test]
    fn test_memory_key_is_unambiguous() {
        let url = "https://example.com/image.png";
        let a = CacheKey::for_memory(url, 12, 34);
        let b = CacheKey::for_memory(url, 1, 234);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with(CacheKey::from_locator(url).as_str()));
        assert!(a.as_str().ends_with("@12x34"));
    }

    #[test]
    fn test_memory_key_depends_on_bounds_only_through_suffix() {
        let url = "https://example.com/image.png";
        assert_eq!(
            CacheKey::for_memory(url, 400, 300),
            CacheKey::for_memory(url, 400, 300)
        );
        assert_ne!(
            CacheKey::for_memory(url, 400, 300),
            CacheKey::for_memory(url, 300, 400)
        );
    }

    #[test]
    fn test_from_raw_rejects_empty() {
        assert!(CacheKey::from_raw("").is_none());
        assert_eq!(
            CacheKey::from_raw("abc").map(|k| k.as_str().to_string()),
            Some("abc".to_string())
        );
    }
}
