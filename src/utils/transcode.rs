//! Image recompression for document pages.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use crate::error::{AppError, Result};
use crate::models::QualityTier;

/// A JPEG-encoded page image.
#[derive(Debug, Clone)]
pub struct EncodedImage {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Decode `bytes`, downscale to fit the tier's maximum dimension and
/// re-encode as JPEG at the tier's quality. Images are never upscaled.
pub fn recompress(name: &str, bytes: &[u8], tier: QualityTier) -> Result<EncodedImage> {
    if bytes.is_empty() {
        return Err(AppError::image(name, "image data is empty"));
    }

    let decoded = image::load_from_memory(bytes).map_err(|e| AppError::image(name, e))?;

    let max = tier.max_dimension();
    let fitted = if decoded.width() > max || decoded.height() > max {
        decoded.resize(max, max, FilterType::Lanczos3)
    } else {
        decoded
    };

    let rgb = fitted.to_rgb8();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, tier.jpeg_quality())
        .encode_image(&rgb)
        .map_err(|e| AppError::image(name, e))?;

    Ok(EncodedImage {
        width: rgb.width(),
        height: rgb.height(),
        jpeg,
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downscales_large_images() {
        let bytes = testing::png(960, 480);
        let out = recompress("big.png", &bytes, QualityTier::Medium).unwrap();
        assert_eq!(out.width, 320);
        assert_eq!(out.height, 160);
        assert_eq!(&out.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_never_upscales() {
        let bytes = testing::png(40, 30);
        let out = recompress("small.png", &bytes, QualityTier::High).unwrap();
        assert_eq!((out.width, out.height), (40, 30));
    }

    #[test]
    fn test_rejects_garbage() {
        let err = recompress("bad.jpg", b"not an image", QualityTier::Low).unwrap_err();
        assert!(matches!(err, AppError::Image { .. }));
        assert!(recompress("empty.jpg", &[], QualityTier::Low).is_err());
    }
}
