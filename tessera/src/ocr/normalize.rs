use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader, Limits};

use crate::config::Config;
use crate::error::{Result, TesseraError};
use crate::models::{ImageBlob, RasterImage};

/// Upper bound on decoder allocations. Decompression bombs fail with a
/// decode error instead of exhausting memory.
const MAX_DECODE_ALLOC: u64 = 512 * 1024 * 1024;
/// Largest side a decoder may report before the image is rejected.
const MAX_DECODE_SIDE: u32 = 32_768;

/// Validates uploads and decodes them into canonical rasters.
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    max_bytes: usize,
    max_dimension: u32,
}

impl ImageNormalizer {
    pub fn new(max_bytes: usize, max_dimension: u32) -> Self {
        Self {
            max_bytes,
            max_dimension: max_dimension.max(1),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.limits.max_payload_bytes,
            config.ocr.max_image_dimension,
        )
    }

    /// Cheap checks that need no decoding: payload size and format sniffing.
    pub fn check(&self, blob: &ImageBlob) -> Result<ImageFormat> {
        if blob.len() > self.max_bytes {
            return Err(TesseraError::PayloadTooLarge {
                size: blob.len(),
                limit: self.max_bytes,
            });
        }
        sniff_format(blob)
    }

    /// Decode a blob into a raster whose longer side does not exceed the
    /// configured maximum dimension.
    pub fn normalize(&self, blob: &ImageBlob) -> Result<RasterImage> {
        let format = self.check(blob)?;
        let img = decode(blob.bytes(), format)?;
        let img = resize_if_needed(img, self.max_dimension);
        RasterImage::new(img)
    }
}

/// Identify the real format from magic bytes. The declared content type is
/// only used in the error message.
fn sniff_format(blob: &ImageBlob) -> Result<ImageFormat> {
    let declared = blob.content_type().unwrap_or("unknown");

    let kind = infer::get(blob.bytes()).ok_or_else(|| {
        TesseraError::UnsupportedFormat(format!(
            "Not a recognizable image (declared {declared})"
        ))
    })?;

    match kind.mime_type() {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" => Ok(ImageFormat::Jpeg),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/bmp" => Ok(ImageFormat::Bmp),
        "image/tiff" => Ok(ImageFormat::Tiff),
        "image/webp" => Ok(ImageFormat::WebP),
        other => Err(TesseraError::UnsupportedFormat(format!(
            "{other} is not a supported image format (declared {declared})"
        ))),
    }
}

fn decode(bytes: &[u8], format: ImageFormat) -> Result<DynamicImage> {
    let mut limits = Limits::default();
    limits.max_alloc = Some(MAX_DECODE_ALLOC);
    limits.max_image_width = Some(MAX_DECODE_SIDE);
    limits.max_image_height = Some(MAX_DECODE_SIDE);

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);

    reader
        .decode()
        .map_err(|e| TesseraError::Decode(format!("Failed to decode {format:?} image: {e}")))
}

/// Resize image if it exceeds maximum dimension while maintaining aspect ratio
///
/// Uses Lanczos3 filter for high-quality downscaling
fn resize_if_needed(img: DynamicImage, max_dim: u32) -> DynamicImage {
    let (width, height) = img.dimensions();

    if width <= max_dim && height <= max_dim {
        return img;
    }

    let ratio = if width > height {
        max_dim as f32 / width as f32
    } else {
        max_dim as f32 / height as f32
    };

    let new_width = ((width as f32 * ratio) as u32).clamp(1, max_dim);
    let new_height = ((height as f32 * ratio) as u32).clamp(1, max_dim);

    img.resize_exact(new_width, new_height, image::imageops::FilterType::Lanczos3)
}
