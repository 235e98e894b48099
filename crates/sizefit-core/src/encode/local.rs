//! In-process encoder.
//!
//! Decodes the asset with the `image` crate and re-encodes it with the
//! requested codec. JPEG and PNG go through `image`'s own encoders; lossy WebP
//! goes through libwebp (the `image` crate's WebP encoder is lossless only).
//!
//! The encoder also honors a size ceiling: if an encode comes out larger than
//! the ceiling, the image is downscaled and encoded again, a bounded number of
//! times. From the search controller's point of view this is still one call.

use super::{EncodeError, Encoder};
use crate::asset::{clamp_quality, ImageAsset};
use crate::codec::TargetCodec;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder};
use std::io::Cursor;

/// Maximum number of downscale passes per call.
const MAX_RESAMPLE_STEPS: usize = 6;

/// Largest scale factor a single downscale pass may use.
const MAX_RESAMPLE_SCALE: f64 = 0.95;

/// Encoder that runs entirely in the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalEncoder {
    max_bytes: Option<usize>,
    resample: bool,
}

impl Default for LocalEncoder {
    fn default() -> Self {
        Self {
            max_bytes: None,
            resample: true,
        }
    }
}

impl LocalEncoder {
    /// Create an encoder whose size ceiling is the asset's own size.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use an absolute size ceiling instead of the asset size.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = Some(max_bytes);
        self
    }

    /// Never downscale; return the first encode as-is.
    pub fn without_resampling(mut self) -> Self {
        self.resample = false;
        self
    }

    /// Size ceiling that applies to `asset`.
    pub fn ceiling_for(&self, asset: &ImageAsset) -> usize {
        self.max_bytes.unwrap_or(asset.len())
    }
}

impl Encoder for LocalEncoder {
    fn encode(
        &self,
        asset: &ImageAsset,
        codec: TargetCodec,
        quality: f64,
    ) -> Result<Vec<u8>, EncodeError> {
        if codec == TargetCodec::Passthrough {
            return Ok(asset.bytes().to_vec());
        }

        let quality = clamp_quality(quality);
        let image =
            image::load_from_memory(asset.bytes()).map_err(|e| EncodeError::Decode(e.to_string()))?;

        let mut best = encode_image(&image, codec, quality)?;
        if !self.resample {
            return Ok(best);
        }

        let ceiling = self.ceiling_for(asset);
        let mut current = image;
        for _ in 0..MAX_RESAMPLE_STEPS {
            if best.len() <= ceiling {
                break;
            }

            let scale = (ceiling as f64 / best.len() as f64)
                .sqrt()
                .min(MAX_RESAMPLE_SCALE);
            let width = ((current.width() as f64 * scale).round() as u32).max(1);
            let height = ((current.height() as f64 * scale).round() as u32).max(1);
            if width == current.width() && height == current.height() {
                break;
            }

            tracing::debug!(
                codec = %codec,
                size = best.len(),
                ceiling,
                width,
                height,
                "downscaling to meet size ceiling"
            );
            current = current.resize_exact(width, height, FilterType::Triangle);
            let candidate = encode_image(&current, codec, quality)?;
            if candidate.len() < best.len() {
                best = candidate;
            }
        }

        Ok(best)
    }
}

/// Encode a decoded image with `codec` at `quality` (already clamped).
fn encode_image(
    image: &DynamicImage,
    codec: TargetCodec,
    quality: f64,
) -> Result<Vec<u8>, EncodeError> {
    match codec {
        TargetCodec::Jpeg => encode_jpeg(image, quality),
        TargetCodec::Webp => encode_webp(image, quality),
        TargetCodec::Png => encode_png(image, quality),
        TargetCodec::Passthrough => Err(EncodeError::Encode {
            codec,
            message: "passthrough has no encoder".to_string(),
        }),
    }
}

/// Map a `[0, 1]` quality onto a `1..=100` percent scale.
fn percent(quality: f64) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

fn encode_jpeg(image: &DynamicImage, quality: f64) -> Result<Vec<u8>, EncodeError> {
    let rgb = image.to_rgb8();
    let mut buffer = Cursor::new(Vec::new());

    let encoder = JpegEncoder::new_with_quality(&mut buffer, percent(quality));
    encoder
        .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
        .map_err(|e| EncodeError::Encode {
            codec: TargetCodec::Jpeg,
            message: e.to_string(),
        })?;

    Ok(buffer.into_inner())
}

#[cfg(feature = "webp")]
fn encode_webp(image: &DynamicImage, quality: f64) -> Result<Vec<u8>, EncodeError> {
    let rgba = image.to_rgba8();
    let encoder = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height());
    let memory = encoder
        .encode_simple(false, percent(quality) as f32)
        .map_err(|e| EncodeError::Encode {
            codec: TargetCodec::Webp,
            message: format!("{e:?}"),
        })?;

    Ok(memory.to_vec())
}

#[cfg(not(feature = "webp"))]
fn encode_webp(_image: &DynamicImage, _quality: f64) -> Result<Vec<u8>, EncodeError> {
    Err(EncodeError::Encode {
        codec: TargetCodec::Webp,
        message: "built without WebP support".to_string(),
    })
}

fn encode_png(image: &DynamicImage, quality: f64) -> Result<Vec<u8>, EncodeError> {
    let compression = match TargetCodec::png_level(quality) {
        0..=2 => CompressionType::Fast,
        3..=6 => CompressionType::Default,
        _ => CompressionType::Best,
    };

    let rgba = image.to_rgba8();
    let mut buffer = Cursor::new(Vec::new());

    let encoder = PngEncoder::new_with_quality(&mut buffer, compression, PngFilter::Adaptive);
    encoder
        .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)
        .map_err(|e| EncodeError::Encode {
            codec: TargetCodec::Png,
            message: e.to_string(),
        })?;

    Ok(buffer.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::RgbImage;

    /// PNG file bytes of a noisy `width x height` image.
    pub(crate) fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let image = RgbImage::from_fn(width, height, |x, y| {
            let v = (x * 37 + y * 91 + x * y * 13) as u8;
            image::Rgb([v, v.wrapping_mul(3), v.wrapping_add(97)])
        });

        let mut buffer = Cursor::new(Vec::new());
        PngEncoder::new(&mut buffer)
            .write_image(image.as_raw(), width, height, ExtendedColorType::Rgb8)
            .unwrap();
        buffer.into_inner()
    }

    fn png_asset(width: u32, height: u32) -> ImageAsset {
        ImageAsset::new(noisy_png(width, height), "image/png")
    }

    #[test]
    fn test_jpeg_output_has_markers() {
        let asset = png_asset(64, 48);
        let jpeg = LocalEncoder::new().encode(&asset, TargetCodec::Jpeg, 0.8).unwrap();

        assert_eq!(&jpeg[0..2], &[0xFF, 0xD8]);
        let len = jpeg.len();
        assert_eq!(&jpeg[len - 2..], &[0xFF, 0xD9]);
    }

    #[cfg(feature = "webp")]
    #[test]
    fn test_webp_output_has_riff_header() {
        let asset = png_asset(64, 48);
        let webp = LocalEncoder::new().encode(&asset, TargetCodec::Webp, 0.7).unwrap();

        assert_eq!(&webp[0..4], b"RIFF");
        assert_eq!(&webp[8..12], b"WEBP");
    }

    #[cfg(not(feature = "webp"))]
    #[test]
    fn test_webp_unavailable_without_feature() {
        let asset = png_asset(8, 8);
        let result = LocalEncoder::new().encode(&asset, TargetCodec::Webp, 0.7);
        assert!(matches!(result, Err(EncodeError::Encode { .. })));
    }

    #[test]
    fn test_png_output_has_signature() {
        let asset = png_asset(16, 16);
        let png = LocalEncoder::new()
            .without_resampling()
            .encode(&asset, TargetCodec::Png, 0.5)
            .unwrap();

        assert_eq!(&png[0..8], &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]);
    }

    #[test]
    fn test_quality_affects_jpeg_size() {
        let asset = png_asset(96, 96);
        let encoder = LocalEncoder::new().without_resampling();

        let low = encoder.encode(&asset, TargetCodec::Jpeg, 0.1).unwrap();
        let high = encoder.encode(&asset, TargetCodec::Jpeg, 1.0).unwrap();

        assert!(low.len() < high.len(), "low={} high={}", low.len(), high.len());
    }

    #[test]
    fn test_passthrough_returns_input() {
        let asset = ImageAsset::new(b"GIF89a not really".to_vec(), "image/gif");
        let out = LocalEncoder::new()
            .encode(&asset, TargetCodec::Passthrough, 0.3)
            .unwrap();
        assert_eq!(out, asset.bytes());
    }

    #[test]
    fn test_undecodable_input_is_decode_error() {
        let asset = ImageAsset::new(vec![0u8; 64], "image/jpeg");
        let result = LocalEncoder::new().encode(&asset, TargetCodec::Jpeg, 0.8);
        assert!(matches!(result, Err(EncodeError::Decode(_))));
    }

    #[test]
    fn test_ceiling_triggers_downscale() {
        let asset = png_asset(128, 128);
        let unconstrained = LocalEncoder::new()
            .without_resampling()
            .encode(&asset, TargetCodec::Jpeg, 1.0)
            .unwrap();

        let constrained = LocalEncoder::new()
            .with_max_bytes(unconstrained.len() / 4)
            .encode(&asset, TargetCodec::Jpeg, 1.0)
            .unwrap();

        assert!(constrained.len() < unconstrained.len());
    }

    #[test]
    fn test_ceiling_defaults_to_asset_size() {
        let asset = png_asset(10, 10);
        assert_eq!(LocalEncoder::new().ceiling_for(&asset), asset.len());
        assert_eq!(LocalEncoder::new().with_max_bytes(5).ceiling_for(&asset), 5);
    }

    #[test]
    fn test_local_encoder_is_deterministic() {
        let asset = png_asset(32, 32);
        let encoder = LocalEncoder::new();

        let first = encoder.encode(&asset, TargetCodec::Jpeg, 0.55).unwrap();
        let second = encoder.encode(&asset, TargetCodec::Jpeg, 0.55).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_percent_mapping() {
        assert_eq!(percent(0.1), 10);
        assert_eq!(percent(0.0), 1);
        assert_eq!(percent(0.556), 56);
        assert_eq!(percent(1.0), 100);
    }
}
