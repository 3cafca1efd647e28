use image::{DynamicImage, GenericImageView, GrayImage, ImageFormat};

use crate::error::{Result, TesseraError};

/// Raw upload as received from the caller.
///
/// The declared content type is only a hint; the real format is sniffed from
/// the bytes during normalization.
#[derive(Debug, Clone)]
pub struct ImageBlob {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

impl ImageBlob {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Decoded pixel grid in canonical form: 8-bit luma or 8-bit RGB, no alpha,
/// positive width and height.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
}

impl RasterImage {
    /// Build a canonical raster from any decoded image.
    ///
    /// Alpha is flattened onto a white background, and 16-bit and float
    /// samples are reduced to 8-bit.
    pub fn new(image: DynamicImage) -> Result<Self> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(TesseraError::Decode(format!(
                "Image has zero dimension: {width}x{height}"
            )));
        }

        let image = match image {
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image,
            DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
            DynamicImage::ImageLumaA8(_) | DynamicImage::ImageLumaA16(_) => {
                DynamicImage::ImageLuma8(flatten_luma_alpha(&image))
            }
            DynamicImage::ImageRgba8(_)
            | DynamicImage::ImageRgba16(_)
            | DynamicImage::ImageRgba32F(_) => DynamicImage::ImageRgb8(flatten_rgb_alpha(&image)),
            _ => DynamicImage::ImageRgb8(image.to_rgb8()),
        };

        Ok(Self { image })
    }

    /// Wrap an image already known to be canonical (used by preprocessing
    /// steps that only ever produce luma or RGB output).
    pub(crate) fn from_canonical(image: DynamicImage) -> Self {
        debug_assert!(matches!(
            image,
            DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_)
        ));
        debug_assert!(image.width() > 0 && image.height() > 0);
        Self { image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of 8-bit channels: 1 for luma, 3 for RGB.
    pub fn channels(&self) -> u8 {
        self.image.color().channel_count()
    }

    pub fn is_grayscale(&self) -> bool {
        matches!(self.image, DynamicImage::ImageLuma8(_))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    pub fn to_luma8(&self) -> GrayImage {
        self.image.to_luma8()
    }

    /// True when every pixel has the same value.
    pub fn is_uniform(&self) -> bool {
        let stride = self.channels() as usize;
        let bytes = self.as_bytes();
        match bytes.get(..stride) {
            Some(first) => bytes.chunks_exact(stride).all(|px| px == first),
            None => true,
        }
    }

    /// Encode as PNG, the interchange format handed to OCR engines.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut output = Vec::new();
        self.image
            .write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
            .map_err(|e| TesseraError::Internal(format!("Failed to encode image: {e}")))?;
        Ok(output)
    }
}

impl PartialEq for RasterImage {
    fn eq(&self, other: &Self) -> bool {
        self.width() == other.width()
            && self.height() == other.height()
            && self.channels() == other.channels()
            && self.as_bytes() == other.as_bytes()
    }
}

impl Eq for RasterImage {}

fn blend_over_white(value: u8, alpha: u8) -> u8 {
    let value = value as u32;
    let alpha = alpha as u32;
    ((value * alpha + 255 * (255 - alpha) + 127) / 255) as u8
}

fn flatten_luma_alpha(image: &DynamicImage) -> GrayImage {
    let luma_a = image.to_luma_alpha8();
    GrayImage::from_fn(luma_a.width(), luma_a.height(), |x, y| {
        let px = luma_a.get_pixel(x, y);
        image::Luma([blend_over_white(px[0], px[1])])
    })
}

fn flatten_rgb_alpha(image: &DynamicImage) -> image::RgbImage {
    let rgba = image.to_rgba8();
    image::RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let px = rgba.get_pixel(x, y);
        image::Rgb([
            blend_over_white(px[0], px[3]),
            blend_over_white(px[1], px[3]),
            blend_over_white(px[2], px[3]),
        ])
    })
}
