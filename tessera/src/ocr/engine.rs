use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{LangTag, PageSegMode, RasterImage, RecognitionResult};

/// A text recognition backend.
///
/// Implementations must stop work promptly when `cancel` fires or when the
/// returned future is dropped; the adapter relies on dropping the future to
/// enforce its timeout.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Short identifier used in logs and health output.
    fn name(&self) -> &str;

    fn is_available(&self) -> bool {
        true
    }

    /// Page segmentation modes this engine accepts.
    fn supports_segmentation(&self, mode: PageSegMode) -> bool {
        // 0 only reports orientation, 2 is not implemented by Tesseract
        !matches!(mode, PageSegMode::OsdOnly | PageSegMode::AutoOnly)
    }

    async fn recognize(
        &self,
        image: &RasterImage,
        language: &LangTag,
        mode: PageSegMode,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult>;
}

/// Placeholder used when the configured backend could not be set up. Every
/// call fails with the reason it was disabled.
pub struct UnavailableEngine {
    reason: String,
}

impl UnavailableEngine {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for UnavailableEngine {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn is_available(&self) -> bool {
        false
    }

    async fn recognize(
        &self,
        _image: &RasterImage,
        _language: &LangTag,
        _mode: PageSegMode,
        _cancel: &CancellationToken,
    ) -> Result<RecognitionResult> {
        Err(crate::error::TesseraError::Recognition(self.reason.clone()))
    }
}
