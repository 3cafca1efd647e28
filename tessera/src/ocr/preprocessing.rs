use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma, Rgb};
use imageproc::contrast::otsu_level;
use imageproc::filter::median_filter;
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

use crate::models::{PreprocessConfig, RasterImage, Threshold};

const SHARPEN_SIGMA: f32 = 1.0;
const SHARPEN_THRESHOLD: i32 = 2;

const DESKEW_MAX_DEGREES: f32 = 15.0;
const DESKEW_STEP_DEGREES: f32 = 0.5;
const DESKEW_MIN_DEGREES: f32 = 0.5;
/// Skew is estimated on a copy no larger than this on its longer side.
const DESKEW_ESTIMATE_SIDE: u32 = 800;

/// Apply the configured transforms to a raster.
///
/// Steps run in a fixed order:
/// 1. Grayscale conversion
/// 2. Median denoise with radius `denoise`
/// 3. Unsharp mask
/// 4. Deskew by projection-profile analysis
/// 5. Binarization (fixed level or Otsu)
/// 6. Integer upscale with Lanczos3
///
/// The result depends only on the inputs. A raster whose pixels all share one
/// value is returned as-is, and a config with every step disabled is the
/// identity.
pub fn preprocess(image: RasterImage, config: &PreprocessConfig) -> RasterImage {
    if config.is_identity() || image.is_uniform() {
        return image;
    }

    let mut img = image.into_dynamic();

    if config.grayscale {
        img = to_luma(img);
    }
    if config.denoise > 0 {
        img = denoise(img, config.denoise);
    }
    if config.sharpen {
        img = img.unsharpen(SHARPEN_SIGMA, SHARPEN_THRESHOLD);
    }
    if config.deskew {
        img = deskew(img);
    }
    img = match config.threshold {
        Threshold::Off => img,
        // a pixel exactly at a fixed level counts as background
        Threshold::Fixed(level) => {
            DynamicImage::ImageLuma8(binarize(img.to_luma8(), |v| v >= level))
        }
        Threshold::Auto => {
            let gray = img.to_luma8();
            let level = otsu_level(&gray);
            DynamicImage::ImageLuma8(binarize(gray, |v| v > level))
        }
    };
    if config.upscale > 1 {
        img = upscale(img, config.upscale);
    }

    RasterImage::from_canonical(img)
}

fn to_luma(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) => img,
        other => DynamicImage::ImageLuma8(other.to_luma8()),
    }
}

fn denoise(img: DynamicImage, radius: u32) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(gray) => {
            DynamicImage::ImageLuma8(median_filter(&gray, radius, radius))
        }
        DynamicImage::ImageRgb8(rgb) => DynamicImage::ImageRgb8(median_filter(&rgb, radius, radius)),
        other => DynamicImage::ImageRgb8(median_filter(&other.to_rgb8(), radius, radius)),
    }
}

/// Pixels accepted by `is_white` become white, the rest black.
fn binarize(mut gray: GrayImage, is_white: impl Fn(u8) -> bool) -> GrayImage {
    for pixel in gray.pixels_mut() {
        pixel[0] = if is_white(pixel[0]) { 255 } else { 0 };
    }
    gray
}

fn upscale(img: DynamicImage, factor: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    img.resize_exact(
        width.saturating_mul(factor),
        height.saturating_mul(factor),
        FilterType::Lanczos3,
    )
}

fn deskew(img: DynamicImage) -> DynamicImage {
    let angle = estimate_skew(&img.to_luma8());
    if angle.abs() < DESKEW_MIN_DEGREES {
        return img;
    }

    tracing::debug!(angle, "Correcting skew");
    let theta = angle.to_radians();
    match img {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(rotate_about_center(
            &gray,
            theta,
            Interpolation::Bilinear,
            Luma([255]),
        )),
        other => DynamicImage::ImageRgb8(rotate_about_center(
            &other.to_rgb8(),
            theta,
            Interpolation::Bilinear,
            Rgb([255, 255, 255]),
        )),
    }
}

/// Rotation (degrees, clockwise) that makes rows of dark pixels most
/// horizontal, searched over ±15° in 0.5° steps.
///
/// Each candidate rotates the dark pixel coordinates and histograms their
/// row positions; the sharpest profile (largest sum of squared bin counts)
/// wins. Ties go to the smaller angle, so text that is already straight
/// stays at 0.
pub(crate) fn estimate_skew(gray: &GrayImage) -> f32 {
    let (width, height) = gray.dimensions();
    let longest = width.max(height);
    let sample = if longest > DESKEW_ESTIMATE_SIDE {
        let scale = DESKEW_ESTIMATE_SIDE as f32 / longest as f32;
        image::imageops::resize(
            gray,
            ((width as f32 * scale) as u32).max(1),
            ((height as f32 * scale) as u32).max(1),
            FilterType::Triangle,
        )
    } else {
        gray.clone()
    };

    let level = otsu_level(&sample);
    let (width, height) = sample.dimensions();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;

    let dark: Vec<(f32, f32)> = sample
        .enumerate_pixels()
        .filter(|(_, _, px)| px[0] <= level)
        .map(|(x, y, _)| (x as f32 - cx, y as f32 - cy))
        .collect();

    let total = (width as usize) * (height as usize);
    if dark.is_empty() || dark.len() == total {
        return 0.0;
    }

    let diagonal = ((width as f32).hypot(height as f32)).ceil() as usize + 2;
    let offset = diagonal as f32 / 2.0;
    let mut bins = vec![0u64; diagonal];

    let steps = (DESKEW_MAX_DEGREES / DESKEW_STEP_DEGREES) as i32;
    let candidates = std::iter::once(0).chain((1..=steps).flat_map(|k| [k, -k]));

    let mut best_angle = 0.0f32;
    let mut best_score = 0u64;
    for k in candidates {
        let angle = k as f32 * DESKEW_STEP_DEGREES;
        let (sin, cos) = angle.to_radians().sin_cos();

        bins.iter_mut().for_each(|b| *b = 0);
        for &(dx, dy) in &dark {
            let row = (dx * sin + dy * cos + offset).round();
            let idx = (row.max(0.0) as usize).min(diagonal - 1);
            bins[idx] += 1;
        }

        let score: u64 = bins.iter().map(|&c| c * c).sum();
        if score > best_score {
            best_score = score;
            best_angle = angle;
        }
    }

    best_angle
}
