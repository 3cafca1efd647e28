// Common test utilities for integration tests
#![allow(dead_code)]

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage};
use tokio_util::sync::CancellationToken;

use tessera::config::Config;
use tessera::error::{Result, TesseraError};
use tessera::models::{
    ImageBlob, LangTag, PageSegMode, RasterImage, RecognitionResult, RegionConfidence,
};
use tessera::ocr::{OcrAdapter, OcrEngine};
use tessera::processing::ProcessingPipeline;

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// What a [`FakeEngine`] saw on one call.
#[derive(Debug, Clone, PartialEq)]
pub struct SeenCall {
    pub width: u32,
    pub height: u32,
    pub language: String,
    pub mode: PageSegMode,
    pub pixels: Vec<u8>,
}

/// Engine double: answers with fixed text after an optional delay and
/// records every call.
#[derive(Clone, Default)]
pub struct FakeEngine {
    text: String,
    confidence: f32,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<SeenCall>>>,
}

impl FakeEngine {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            confidence: 0.87,
            ..Default::default()
        }
    }

    /// Reads nothing, like an engine handed a blank page.
    pub fn blank() -> Self {
        Self::new("")
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<SeenCall> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    async fn recognize(
        &self,
        image: &RasterImage,
        language: &LangTag,
        mode: PageSegMode,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(SeenCall {
            width: image.width(),
            height: image.height(),
            language: language.to_string(),
            mode,
            pixels: image.as_bytes().to_vec(),
        });

        tokio::select! {
            _ = cancel.cancelled() => return Err(TesseraError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        let regions = self
            .text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .enumerate()
            .map(|(i, _)| RegionConfidence {
                id: format!("b1.p1.l{}", i + 1),
                confidence: self.confidence,
                bbox: None,
            })
            .collect();
        Ok(RecognitionResult::new(
            self.text.clone(),
            regions,
            language.clone(),
        ))
    }
}

pub fn pipeline_with(engine: FakeEngine, config: &Config) -> ProcessingPipeline {
    let adapter = OcrAdapter::with_engine(Arc::new(engine), &config.ocr).unwrap();
    ProcessingPipeline::new(config, adapter)
}

pub fn config_with_languages(languages: &[&str]) -> Config {
    let mut config = Config::default();
    config.ocr.languages = languages.iter().map(|l| l.to_string()).collect();
    config.ocr.default_language = languages[0].to_string();
    config
}

fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), format)
        .expect("encode fixture");
    bytes
}

/// Uniform white PNG.
pub fn white_png(width: u32, height: u32) -> ImageBlob {
    let img = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    ImageBlob::new(
        encode(DynamicImage::ImageRgb8(img), ImageFormat::Png),
        Some("image/png".to_string()),
    )
}

/// Dark horizontal bars on white, roughly the shape of a few text lines.
pub fn text_like(width: u32, height: u32, format: ImageFormat) -> ImageBlob {
    let img = GrayImage::from_fn(width, height, |x, y| {
        let in_line = (y / 8) % 3 == 1;
        let in_word = (x / 12) % 4 != 3;
        if in_line && in_word && x > 4 && x + 4 < width {
            Luma([20])
        } else {
            Luma([235])
        }
    });
    ImageBlob::new(encode(DynamicImage::ImageLuma8(img), format), None)
}

pub fn not_an_image() -> ImageBlob {
    ImageBlob::new(
        b"%PDF-1.4 this is definitely not a raster image".to_vec(),
        Some("application/pdf".to_string()),
    )
}

// Re-export commonly used crates for convenience
pub use wiremock;
