//! Image compression and format conversion.
//!
//! Both operations decode the source into a `DynamicImage` and re-encode it.
//! Decode and encode run together on the blocking pool under the
//! [`IMAGE_CEILING`] time limit so one pathological image cannot stall the
//! runtime.
//!
//! Compression keeps the source MIME type and downscales anything whose
//! longer edge exceeds [`MAX_IMAGE_DIMENSION`]. Conversion keeps the native
//! resolution and encodes at the fixed [`CONVERT_QUALITY`].

use super::run_blocking;
use crate::artifact::Artifact;
use crate::config::{CONVERT_QUALITY, IMAGE_CEILING, MAX_IMAGE_DIMENSION};
use crate::error::FileKitError;
use crate::intake::FileDescriptor;
use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{ColorType, DynamicImage, GenericImageView, ImageError};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Encodable output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageTarget {
    Jpeg,
    Png,
    WebP,
    Bmp,
}

impl ImageTarget {
    /// Map a MIME type (`image/jpeg`, `image/jpg`, …) to a target.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime.trim().to_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageTarget::Jpeg),
            "image/png" | "image/x-png" => Some(ImageTarget::Png),
            "image/webp" => Some(ImageTarget::WebP),
            "image/bmp" | "image/x-bmp" | "image/x-ms-bmp" => Some(ImageTarget::Bmp),
            _ => None,
        }
    }

    /// Map a format name (`webp`, `jpg`, `jpeg`, `png`, `bmp`) to a target.
    pub fn from_format(format: &str) -> Option<Self> {
        match format.trim().trim_start_matches('.').to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(ImageTarget::Jpeg),
            "png" => Some(ImageTarget::Png),
            "webp" => Some(ImageTarget::WebP),
            "bmp" => Some(ImageTarget::Bmp),
            _ => None,
        }
    }
}

/// Compress an image, keeping its MIME type.
///
/// `quality` must lie in `(0, 1]`. JPEG maps it onto the encoder quality
/// scale. PNG, WebP and BMP are lossless here and ignore it, so their size
/// never shrinks as quality rises.
pub async fn compress_image(
    file: &FileDescriptor,
    quality: f32,
) -> Result<Artifact, FileKitError> {
    validate_quality(quality)?;
    let bytes = file.load().await?;
    let name = file.name().to_string();
    let mime = file.mime_type().to_string();

    let (task_name, task_mime) = (name.clone(), mime.clone());
    let encoded = run_blocking("image compression", IMAGE_CEILING, move || {
        let img = decode(&task_name, &bytes)?;
        let img = fit_within(img, MAX_IMAGE_DIMENSION);
        let target = ImageTarget::from_mime(&task_mime).ok_or_else(|| {
            FileKitError::Compression {
                name: task_name.clone(),
                detail: format!("cannot re-encode '{task_mime}'"),
            }
        })?;
        encode(&img, target, quality).map_err(|e| FileKitError::Compression {
            name: task_name.clone(),
            detail: e.to_string(),
        })
    })
    .await?;

    debug!(
        "Compressed '{}': {} → {} bytes (quality {:.2})",
        name,
        file.byte_size(),
        encoded.len(),
        quality
    );
    Ok(Artifact::new(format!("compressed_{name}"), mime, encoded))
}

/// Re-encode an image as `image/{target_format}` at native resolution.
///
/// The output keeps the source name with its extension replaced by
/// `target_format` (or appended when the source has none).
pub async fn convert_image_format(
    file: &FileDescriptor,
    target_format: &str,
) -> Result<Artifact, FileKitError> {
    let format = target_format.trim().trim_start_matches('.').to_lowercase();
    let target = ImageTarget::from_format(&format).ok_or_else(|| FileKitError::Conversion {
        name: file.name().to_string(),
        detail: format!("unsupported target format '{target_format}'"),
    })?;
    let bytes = file.load().await?;
    let name = file.name().to_string();

    let task_name = name.clone();
    let encoded = run_blocking("image conversion", IMAGE_CEILING, move || {
        let img = decode(&task_name, &bytes)?;
        encode(&img, target, CONVERT_QUALITY).map_err(|e| FileKitError::Conversion {
            name: task_name.clone(),
            detail: e.to_string(),
        })
    })
    .await?;

    debug!("Converted '{}' → {} ({} bytes)", name, format, encoded.len());
    Ok(Artifact::new(
        replace_extension(&name, &format),
        format!("image/{format}"),
        encoded,
    ))
}

fn validate_quality(quality: f32) -> Result<(), FileKitError> {
    if quality.is_finite() && quality > 0.0 && quality <= 1.0 {
        Ok(())
    } else {
        Err(FileKitError::Validation(format!(
            "quality must be in (0, 1], got {quality}"
        )))
    }
}

fn decode(name: &str, bytes: &[u8]) -> Result<DynamicImage, FileKitError> {
    let img = image::load_from_memory(bytes).map_err(|e| FileKitError::Decode {
        name: name.to_string(),
        detail: e.to_string(),
    })?;
    debug!("Decoded '{}' → {}x{} px", name, img.width(), img.height());
    Ok(img)
}

/// Dimensions after scaling `(width, height)` so neither edge exceeds `max`.
///
/// Aspect ratio is preserved and the longer edge lands exactly on `max`.
pub fn scaled_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let ratio = f64::min(max as f64 / width as f64, max as f64 / height as f64);
    let w = ((width as f64 * ratio).round() as u32).clamp(1, max);
    let h = ((height as f64 * ratio).round() as u32).clamp(1, max);
    (w, h)
}

fn fit_within(img: DynamicImage, max: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    let (nw, nh) = scaled_dimensions(w, h, max);
    if (nw, nh) == (w, h) {
        return img;
    }
    debug!("Downscaling {}x{} → {}x{}", w, h, nw, nh);
    img.resize_exact(nw, nh, FilterType::Lanczos3)
}

fn encode(img: &DynamicImage, target: ImageTarget, quality: f32) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    match target {
        ImageTarget::Jpeg => {
            let q = ((quality * 100.0).round() as u8).clamp(1, 100);
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, q))?;
        }
        // Fixed deflate level: quality must not reorder output sizes.
        ImageTarget::Png => {
            let encoder =
                PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
            match img.color() {
                ColorType::Rgb32F | ColorType::Rgba32F => {
                    DynamicImage::ImageRgba8(img.to_rgba8()).write_with_encoder(encoder)?
                }
                _ => img.write_with_encoder(encoder)?,
            }
        }
        ImageTarget::WebP => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(WebPEncoder::new_lossless(&mut buf))?;
        }
        ImageTarget::Bmp => {
            let rgba = DynamicImage::ImageRgba8(img.to_rgba8());
            rgba.write_with_encoder(BmpEncoder::new(&mut buf))?;
        }
    }
    Ok(buf)
}

static RE_EXTENSION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.[^/.]+$").unwrap());

/// Swap the extension of `name` for `format`, appending one if missing.
pub fn replace_extension(name: &str, format: &str) -> String {
    if RE_EXTENSION.is_match(name) {
        RE_EXTENSION
            .replace(name, format!(".{format}").as_str())
            .into_owned()
    } else {
        format!("{name}.{format}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::BlobRegistry;
    use crate::config::{AcceptedTypes, OverflowPolicy};
    use crate::intake::{select, IntakePolicy, RawInput};
    use image::{Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn textured(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([
                (x * 7 % 256) as u8,
                (y * 13 % 256) as u8,
                ((x ^ y) * 3 % 256) as u8,
            ])
        }))
    }

    fn encoded(img: &DynamicImage, format: image::ImageFormat) -> Vec<u8> {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    async fn descriptor(name: &str, mime: &str, bytes: Vec<u8>) -> FileDescriptor {
        let policy = IntakePolicy {
            accepted_types: AcceptedTypes::Any,
            max_files: 1,
            max_file_size: u64::MAX,
            overflow: OverflowPolicy::Truncate,
        };
        let mut sel = select(
            vec![RawInput::from_bytes(name, mime, bytes)],
            &policy,
            &BlobRegistry::new(),
        )
        .await
        .unwrap();
        sel.accepted.remove(0)
    }

    #[test]
    fn scaled_dimensions_cap_longer_edge() {
        assert_eq!(scaled_dimensions(5000, 5000, 4096), (4096, 4096));
        assert_eq!(scaled_dimensions(8192, 4096, 4096), (4096, 2048));
        assert_eq!(scaled_dimensions(3000, 6000, 4096), (2048, 4096));
        assert_eq!(scaled_dimensions(100, 50, 4096), (100, 50));
    }

    #[test]
    fn extension_replacement() {
        assert_eq!(replace_extension("photo.jpeg", "webp"), "photo.webp");
        assert_eq!(replace_extension("archive.tar.png", "bmp"), "archive.tar.bmp");
        assert_eq!(replace_extension("noext", "png"), "noext.png");
    }

    #[test]
    fn target_lookup() {
        assert_eq!(ImageTarget::from_format("JPG"), Some(ImageTarget::Jpeg));
        assert_eq!(ImageTarget::from_format(".webp"), Some(ImageTarget::WebP));
        assert_eq!(ImageTarget::from_format("tiff"), None);
        assert_eq!(ImageTarget::from_mime("image/jpg"), Some(ImageTarget::Jpeg));
    }

    #[tokio::test]
    async fn compress_keeps_mime_and_prefixes_name() {
        let src = encoded(&textured(64, 48), image::ImageFormat::Jpeg);
        let file = descriptor("cat.jpg", "image/jpeg", src).await;
        let out = compress_image(&file, 0.5).await.unwrap();
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(out.name, "compressed_cat.jpg");
        let back = image::load_from_memory(out.payload()).unwrap();
        assert_eq!(back.dimensions(), (64, 48));
    }

    #[tokio::test]
    async fn compress_size_grows_with_quality() {
        let src = encoded(&textured(128, 128), image::ImageFormat::Png);
        let file = descriptor("tex.jpg", "image/jpeg", src).await;
        let mut last = 0u64;
        for q in [0.1f32, 0.4, 0.7, 1.0] {
            let out = compress_image(&file, q).await.unwrap();
            assert!(out.byte_size >= last, "quality {q}: {} < {last}", out.byte_size);
            last = out.byte_size;
        }
    }

    #[tokio::test]
    async fn png_size_never_shrinks_as_quality_rises() {
        let solid = RgbaImage::from_pixel(512, 512, Rgba([40, 90, 200, 255]));
        let src = encoded(&DynamicImage::ImageRgba8(solid), image::ImageFormat::Png);
        let file = descriptor("solid.png", "image/png", src).await;
        let mut sizes = Vec::new();
        for q in [0.1f32, 0.5, 0.9, 1.0] {
            sizes.push(compress_image(&file, q).await.unwrap().byte_size);
        }
        assert!(sizes.windows(2).all(|w| w[0] <= w[1]), "sizes {sizes:?}");
    }

    #[tokio::test]
    async fn compress_downscales_oversized_images() {
        let wide = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4200, 8, Rgba([9, 9, 9, 255])));
        let src = encoded(&wide, image::ImageFormat::Png);
        let file = descriptor("strip.png", "image/png", src).await;
        let out = compress_image(&file, 0.8).await.unwrap();
        let back = image::load_from_memory(out.payload()).unwrap();
        assert_eq!(back.width(), MAX_IMAGE_DIMENSION);
        assert_eq!(back.height(), 8);
    }

    #[tokio::test]
    async fn compress_rejects_bad_quality() {
        let file = descriptor("a.png", "image/png", vec![1, 2, 3]).await;
        for q in [0.0f32, -0.5, 1.5, f32::NAN] {
            let err = compress_image(&file, q).await.unwrap_err();
            assert!(matches!(err, FileKitError::Validation(_)), "q={q}");
        }
    }

    #[tokio::test]
    async fn undecodable_input_is_decode_error() {
        let file = descriptor("junk.png", "image/png", b"not an image".to_vec()).await;
        let err = compress_image(&file, 0.8).await.unwrap_err();
        assert!(matches!(err, FileKitError::Decode { .. }));
    }

    #[tokio::test]
    async fn compress_unknown_mime_is_compression_error() {
        let src = encoded(&textured(8, 8), image::ImageFormat::Png);
        let file = descriptor("a.png", "image/x-unknown", src).await;
        let err = compress_image(&file, 0.8).await.unwrap_err();
        assert!(matches!(err, FileKitError::Compression { .. }));
    }

    #[tokio::test]
    async fn convert_sets_mime_and_extension() {
        let src = encoded(&textured(32, 16), image::ImageFormat::Png);
        let file = descriptor("logo.png", "image/png", src).await;
        for format in ["webp", "jpg", "png", "bmp"] {
            let out = convert_image_format(&file, format).await.unwrap();
            assert_eq!(out.mime_type, format!("image/{format}"));
            assert_eq!(out.name, format!("logo.{format}"));
            let back = image::load_from_memory(out.payload()).unwrap();
            assert_eq!(back.dimensions(), (32, 16), "format {format}");
        }
    }

    #[tokio::test]
    async fn convert_does_not_downscale() {
        let big = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4200, 4, Rgba([1, 2, 3, 255])));
        let file = descriptor("big.png", "image/png", encoded(&big, image::ImageFormat::Png)).await;
        let out = convert_image_format(&file, "bmp").await.unwrap();
        let back = image::load_from_memory(out.payload()).unwrap();
        assert_eq!(back.width(), 4200);
    }

    #[tokio::test]
    async fn convert_rejects_unknown_target() {
        let file = descriptor("a.png", "image/png", vec![0]).await;
        let err = convert_image_format(&file, "tiff").await.unwrap_err();
        assert!(matches!(err, FileKitError::Conversion { .. }));
    }
}
