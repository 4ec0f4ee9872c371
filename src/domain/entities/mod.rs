//! Domain entity definitions.

mod cache_key;
mod image;

pub use cache_key::CacheKey;
pub use image::{Bounds, DecodedImage, ImageSource, LoadedImage, TargetId, Weigher};
