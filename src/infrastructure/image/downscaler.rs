//! Power-of-two subsampling decode.

use std::io::Cursor;

use image::imageops::FilterType;
use tracing::trace;

use crate::domain::entities::{Bounds, DecodedImage};
use crate::domain::errors::{CacheError, CacheResult};

/// Largest power of two `f` such that `(height / 2) / f >= bounds.height` and
/// `(width / 2) / f >= bounds.width`. 1 when either bound is zero, the source
/// already fits, or no factor satisfies both.
#[must_use]
pub fn sample_factor(source_width: u32, source_height: u32, bounds: Bounds) -> u32 {
    if bounds.is_unbounded() {
        return 1;
    }

    let mut factor = 1u32;
    if source_height > bounds.height || source_width > bounds.width {
        let half_height = source_height / 2;
        let half_width = source_width / 2;
        while factor < (1 << 30)
            && half_height / (factor * 2) >= bounds.height
            && half_width / (factor * 2) >= bounds.width
        {
            factor *= 2;
        }
    }
    factor
}

/// Decodes raw bytes, subsampling by [`sample_factor`] so the buffer is no
/// larger than needed for `bounds`.
///
/// # Errors
/// Returns `DecodeError` if the format is unknown or the data is corrupt.
pub fn decode(bytes: &[u8], bounds: Bounds) -> CacheResult<DecodedImage> {
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;

    let factor = sample_factor(width, height, bounds);
    trace!(width, height, factor, "Decoding image");

    let img = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .decode()?;

    if img.width() == 0 || img.height() == 0 {
        return Err(CacheError::DecodeError("image has no pixels".to_string()));
    }

    let img = if factor > 1 {
        let target_width = (width / factor).max(1);
        let target_height = (height / factor).max(1);
        img.resize_exact(target_width, target_height, FilterType::Nearest)
    } else {
        img
    };

    Ok(DecodedImage::new(img))
}

/// Runs [`decode`] on the blocking pool.
///
/// # Errors
/// Returns `DecodeError` on decode failure or if the decode task panicked.
pub async fn decode_blocking(bytes: bytes::Bytes, bounds: Bounds) -> CacheResult<DecodedImage> {
    tokio::task::spawn_blocking(move || decode(&bytes, bounds))
        .await
        .map_err(|e| CacheError::DecodeError(format!("Decode task panicked: {e}")))?
}


#[cfg(test)]
mod tests {
    use super::test_support::png_bytes;
    use super::*;
    use test_case::test_case;

    #[test_case(4000, 3000, 400, 300, 4 ; "large_source")]
    #[test_case(4000, 3000, 0, 300, 1 ; "zero_width")]
    #[test_case(4000, 3000, 400, 0, 1 ; "zero_height")]
    #[test_case(100, 100, 200, 200, 1 ; "source_smaller")]
    #[test_case(200, 200, 100, 100, 1 ; "exact_half")]
    #[test_case(400, 400, 100, 100, 2 ; "quarter")]
    #[test_case(199, 199, 100, 100, 1 ; "just_under_half")]
    #[test_case(1024, 64, 64, 64, 1 ; "one_axis_fits")]
    fn test_sample_factor(sw: u32, sh: u32, rw: u32, rh: u32, expected: u32) {
        assert_eq!(sample_factor(sw, sh, Bounds::new(rw, rh)), expected);
    }

    #[test]
    fn test_decode_subsamples() {
        let bytes = png_bytes(400, 300);
        let img = decode(&bytes, Bounds::new(100, 75)).unwrap();
        assert_eq!((img.width(), img.height()), (200, 150));
    }

    #[test]
    fn test_decode_unbounded_keeps_size() {
        let bytes = png_bytes(40, 30);
        let img = decode(&bytes, Bounds::default()).unwrap();
        assert_eq!((img.width(), img.height()), (40, 30));
    }

    #[test]
    fn test_decode_garbage_fails() {
        let result = decode(b"definitely not an image", Bounds::new(10, 10));
        assert!(matches!(result, Err(CacheError::DecodeError(_))));
    }

    #[tokio::test]
    async fn test_decode_blocking() {
        let bytes = bytes::Bytes::from(png_bytes(8, 8));
        let img = decode_blocking(bytes, Bounds::new(2, 2)).await.unwrap();
        assert_eq!((img.width(), img.height()), (4, 4));
    }
}
