//! Domain types for decoded images and their provenance.

use std::sync::Arc;

use super::CacheKey;

/// Requested decode bounds. Zero in either dimension means "no downscale".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Bounds {
    /// Requested width in pixels.
    pub width: u32,
    /// Requested height in pixels.
    pub height: u32,
}

impl Bounds {
    /// Creates new bounds.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns true when either dimension is zero.
    #[must_use]
    pub const fn is_unbounded(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// How a cache weighs a decoded buffer.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Weigher {
    /// Length of the raw pixel buffer.
    #[default]
    ByteCount,
    /// Bytes per row multiplied by the row count.
    RowBytes,
}

impl Weigher {
    /// Computes the weight of an image under this policy.
    #[must_use]
    pub fn weigh(self, image: &image::DynamicImage) -> u64 {
        match self {
            Self::ByteCount => image.as_bytes().len() as u64,
            Self::RowBytes => {
                let row_bytes =
                    u64::from(image.width()) * u64::from(image.color().bytes_per_pixel());
                row_bytes * u64::from(image.height())
            }
        }
    }
}

/// A decoded, possibly downscaled, pixel buffer.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: Arc<image::DynamicImage>,
}

impl DecodedImage {
    /// Wraps a decoded image.
    #[must_use]
    pub fn new(image: image::DynamicImage) -> Self {
        Self {
            image: Arc::new(image),
        }
    }

    /// Returns the shared pixel buffer.
    #[must_use]
    pub fn image(&self) -> &Arc<image::DynamicImage> {
        &self.image
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Byte footprint of the pixel buffer.
    #[must_use]
    pub fn byte_size(&self) -> u64 {
        self.image.as_bytes().len() as u64
    }

    /// A zero-area buffer holds no pixels and is never cached.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.width() > 0 && self.height() > 0
    }

    /// Returns true if both handles point at the same pixel buffer.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.image, &other.image)
    }
}

/// Where an image was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageSource {
    /// Loaded from in-memory LRU cache.
    MemoryCache,
    /// Loaded from disk cache.
    DiskCache,
    /// Downloaded from network.
    Network,
}

impl std::fmt::Display for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MemoryCache => write!(f, "memory"),
            Self::DiskCache => write!(f, "disk"),
            Self::Network => write!(f, "network"),
        }
    }
}

/// A successfully loaded image with its memory-tier key and source tier.
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Dimension-qualified memory-tier key.
    pub key: CacheKey,
    /// The decoded buffer.
    pub image: DecodedImage,
    /// Tier that satisfied the request.
    pub source: ImageSource,
}

/// Identifies a visual target that displays loaded images.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u64);

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighers_agree_on_packed_buffers() {
        let img = image::DynamicImage::new_rgba8(10, 7);
        assert_eq!(Weigher::ByteCount.weigh(&img), 280);
        assert_eq!(Weigher::RowBytes.weigh(&img), 280);

        let rgb = image::DynamicImage::new_rgb8(3, 3);
        assert_eq!(Weigher::RowBytes.weigh(&rgb), 27);
    }

    #[test]
    fn test_zero_area_image_is_invalid() {
        assert!(!DecodedImage::new(image::DynamicImage::new_rgb8(0, 10)).is_valid());
        assert!(DecodedImage::new(image::DynamicImage::new_rgb8(1, 1)).is_valid());
    }

    #[test]
    fn test_unbounded() {
        assert!(Bounds::new(0, 300).is_unbounded());
        assert!(Bounds::new(400, 0).is_unbounded());
        assert!(!Bounds::new(400, 300).is_unbounded());
    }
}
