use serde::{Deserialize, Serialize};

use crate::error::{Result, TesseraError};

pub const MAX_DENOISE_RADIUS: u32 = 8;
pub const MAX_UPSCALE_FACTOR: u32 = 4;

/// Binarization threshold.
///
/// `Auto` picks the threshold with Otsu's method over the 256-bin luma
/// histogram, which is deterministic for a given raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Threshold {
    Off,
    Fixed(u8),
    Auto,
}

impl std::fmt::Display for Threshold {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Off => write!(f, "off"),
            Self::Fixed(level) => write!(f, "{level}"),
            Self::Auto => write!(f, "auto"),
        }
    }
}

impl std::str::FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" | "otsu" => Ok(Self::Auto),
            "off" | "none" | "false" => Ok(Self::Off),
            other => other
                .parse::<u8>()
                .map(Self::Fixed)
                .map_err(|_| format!("Invalid threshold '{s}': expected auto, off or 0-255")),
        }
    }
}

/// Preprocessing options for one request.
///
/// Disabling every option (see [`PreprocessConfig::identity`]) makes
/// preprocessing the identity transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreprocessConfig {
    pub grayscale: bool,
    pub threshold: Threshold,
    pub deskew: bool,
    /// Median filter radius; 0 disables denoising.
    pub denoise: u32,
    pub sharpen: bool,
    /// Integer upscale factor; 1 leaves the size unchanged.
    pub upscale: u32,
}

impl PreprocessConfig {
    pub const fn identity() -> Self {
        Self {
            grayscale: false,
            threshold: Threshold::Off,
            deskew: false,
            denoise: 0,
            sharpen: false,
            upscale: 1,
        }
    }

    pub fn is_identity(&self) -> bool {
        !self.grayscale
            && self.threshold == Threshold::Off
            && !self.deskew
            && self.denoise == 0
            && !self.sharpen
            && self.upscale <= 1
    }

    pub fn validate(self) -> Result<Self> {
        if self.denoise > MAX_DENOISE_RADIUS {
            return Err(TesseraError::Validation(format!(
                "denoise must be between 0 and {MAX_DENOISE_RADIUS}, got {}",
                self.denoise
            )));
        }
        if self.upscale == 0 || self.upscale > MAX_UPSCALE_FACTOR {
            return Err(TesseraError::Validation(format!(
                "upscale must be between 1 and {MAX_UPSCALE_FACTOR}, got {}",
                self.upscale
            )));
        }
        Ok(self)
    }
}

impl Default for PreprocessConfig {
    /// Grayscale, 3x3 median denoise, unsharp mask and Otsu binarization.
    fn default() -> Self {
        Self {
            grayscale: true,
            threshold: Threshold::Auto,
            deskew: false,
            denoise: 1,
            sharpen: true,
            upscale: 1,
        }
    }
}
