use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::api::{VisionApiEngine, VisionProvider};
use super::engine::{OcrEngine, UnavailableEngine};
use super::tesseract::TesseractEngine;
use crate::config::{parse_engine_model, OcrConfig};
use crate::error::{Result, TesseraError};
use crate::models::{LangTag, PageSegMode, RasterImage, RecognitionResult};

/// Front door to the recognition engine: resolves and validates language and
/// segmentation options, then runs the engine under a hard timeout.
#[derive(Clone)]
pub struct OcrAdapter {
    engine: Arc<dyn OcrEngine>,
    languages: Vec<String>,
    default_language: LangTag,
    default_mode: PageSegMode,
    timeout: Duration,
}

impl OcrAdapter {
    /// Build the engine selected by `config.engine`. A remote engine that
    /// cannot be set up degrades to an unavailable engine instead of failing
    /// startup.
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let (prefix, _) = parse_engine_model(&config.engine);

        let engine: Arc<dyn OcrEngine> = match VisionProvider::from_name(prefix) {
            Some(provider) => match VisionApiEngine::new(config) {
                Ok(engine) => {
                    info!(provider = ?provider, "Vision OCR API backend initialized");
                    Arc::new(engine)
                }
                Err(e) => {
                    let reason = format!("{prefix} OCR backend unavailable: {e}");
                    warn!("{}", reason);
                    Arc::new(UnavailableEngine::new(reason))
                }
            },
            None => {
                info!(
                    path = %config.tesseract_path,
                    languages = ?config.languages,
                    "Tesseract OCR engine configured"
                );
                Arc::new(TesseractEngine::new(config))
            }
        };

        Self::with_engine(engine, config)
    }

    /// Wrap an explicit engine, validating the configured defaults.
    pub fn with_engine(engine: Arc<dyn OcrEngine>, config: &OcrConfig) -> Result<Self> {
        let mut adapter = Self {
            engine,
            languages: config.languages.clone(),
            default_language: LangTag::parse(&config.default_language)?,
            default_mode: config.default_psm,
            timeout: config.timeout(),
        };
        adapter.default_language = adapter.resolve_language(Some(&config.default_language))?;
        adapter.default_mode = adapter.resolve_segmentation(Some(&config.default_psm.to_string()))?;
        Ok(adapter)
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_available()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn languages(&self) -> &[String] {
        &self.languages
    }

    /// Resolve the requested language, or the default when absent. Every
    /// `+`-joined component must be in the configured set.
    pub fn resolve_language(&self, requested: Option<&str>) -> Result<LangTag> {
        let Some(raw) = requested.filter(|r| !r.trim().is_empty()) else {
            return Ok(self.default_language.clone());
        };

        let tag = LangTag::parse(raw)?;
        if let Some(unknown) = tag
            .components()
            .find(|c| !self.languages.iter().any(|l| l == c))
        {
            return Err(TesseraError::UnsupportedLanguage(format!(
                "'{unknown}' is not installed (available: {})",
                self.languages.join(", ")
            )));
        }
        Ok(tag)
    }

    /// Resolve the requested page segmentation mode, or the default when
    /// absent.
    pub fn resolve_segmentation(&self, requested: Option<&str>) -> Result<PageSegMode> {
        let mode = match requested.filter(|r| !r.trim().is_empty()) {
            Some(raw) => raw.parse::<PageSegMode>()?,
            None => return Ok(self.default_mode),
        };

        if !self.engine.supports_segmentation(mode) {
            return Err(TesseraError::InvalidSegmentationMode(format!(
                "Mode {mode} is not supported by the {} engine",
                self.engine.name()
            )));
        }
        Ok(mode)
    }

    /// Run recognition with the adapter's configured timeout.
    pub async fn recognize(
        &self,
        image: &RasterImage,
        language: &LangTag,
        mode: PageSegMode,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult> {
        self.recognize_within(image, language, mode, self.timeout, cancel)
            .await
    }

    /// Run recognition bounded by `timeout`. On expiry the engine future is
    /// dropped, which terminates any child process it owns.
    pub async fn recognize_within(
        &self,
        image: &RasterImage,
        language: &LangTag,
        mode: PageSegMode,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult> {
        let language = self.resolve_language(Some(language.as_str()))?;
        if !self.engine.supports_segmentation(mode) {
            return Err(TesseraError::InvalidSegmentationMode(format!(
                "Mode {mode} is not supported by the {} engine",
                self.engine.name()
            )));
        }

        match tokio::time::timeout(
            timeout,
            self.engine.recognize(image, &language, mode, cancel),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TesseraError::RecognitionTimeout(timeout.as_millis() as u64)),
        }
    }
}

impl std::fmt::Debug for OcrAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrAdapter")
            .field("engine", &self.engine.name())
            .field("languages", &self.languages)
            .field("default_language", &self.default_language)
            .field("default_mode", &self.default_mode)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowEngine {
        delay: Duration,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl OcrEngine for SlowEngine {
        fn name(&self) -> &str {
            "slow"
        }

        async fn recognize(
            &self,
            _image: &RasterImage,
            language: &LangTag,
            _mode: PageSegMode,
            _cancel: &CancellationToken,
        ) -> Result<RecognitionResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(RecognitionResult::new(
                "done".to_string(),
                Vec::new(),
                language.clone(),
            ))
        }
    }

    fn make_config(engine: &str, api_key: Option<&str>) -> OcrConfig {
        OcrConfig {
            engine: engine.to_string(),
            api_key: api_key.map(String::from),
            languages: vec!["eng".to_string(), "deu".to_string()],
            ..OcrConfig::default()
        }
    }

    fn adapter(delay: Duration) -> (OcrAdapter, Arc<SlowEngine>) {
        let engine = Arc::new(SlowEngine {
            delay,
            calls: AtomicUsize::new(0),
        });
        let adapter = OcrAdapter::with_engine(engine.clone(), &make_config("local/test", None))
            .unwrap();
        (adapter, engine)
    }

    fn raster() -> RasterImage {
        RasterImage::new(image::DynamicImage::new_luma8(4, 4)).unwrap()
    }

    #[test]
    fn test_local_model_routes_to_tesseract() {
        let adapter = OcrAdapter::new(&make_config("local/tesseract", None)).unwrap();
        assert_eq!(adapter.engine_name(), "tesseract");
        assert!(adapter.is_available());
    }

    #[test]
    fn test_remote_model_without_api_key_is_unavailable() {
        for engine in ["openai/gpt-4o", "mistral/pixtral-12b", "deepseek/deepseek-vl"] {
            let adapter = OcrAdapter::new(&make_config(engine, None)).unwrap();
            assert!(!adapter.is_available(), "{engine} should be unavailable");
        }
    }

    #[test]
    fn test_remote_model_with_api_key() {
        let adapter = OcrAdapter::new(&make_config("openai/gpt-4o", Some("k"))).unwrap();
        assert_eq!(adapter.engine_name(), "openai");
        assert!(adapter.is_available());
    }

    #[test]
    fn test_default_language_must_be_configured() {
        let config = OcrConfig {
            default_language: "fra".to_string(),
            ..make_config("local/tesseract", None)
        };
        assert!(matches!(
            OcrAdapter::new(&config),
            Err(TesseraError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_resolve_language() {
        let (adapter, _) = adapter(Duration::ZERO);
        assert_eq!(adapter.resolve_language(None).unwrap().as_str(), "eng");
        assert_eq!(adapter.resolve_language(Some("")).unwrap().as_str(), "eng");
        assert_eq!(
            adapter.resolve_language(Some("deu+eng")).unwrap().as_str(),
            "deu+eng"
        );
        assert!(matches!(
            adapter.resolve_language(Some("klingon")),
            Err(TesseraError::UnsupportedLanguage(_))
        ));
        assert!(matches!(
            adapter.resolve_language(Some("eng+fra")),
            Err(TesseraError::UnsupportedLanguage(_))
        ));
    }

    #[test]
    fn test_resolve_segmentation() {
        let (adapter, _) = adapter(Duration::ZERO);
        assert_eq!(
            adapter.resolve_segmentation(None).unwrap(),
            PageSegMode::SingleBlock
        );
        assert_eq!(
            adapter.resolve_segmentation(Some("11")).unwrap(),
            PageSegMode::SparseText
        );
        for bad in ["0", "2", "14", "block"] {
            assert!(
                matches!(
                    adapter.resolve_segmentation(Some(bad)),
                    Err(TesseraError::InvalidSegmentationMode(_))
                ),
                "{bad} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_unsupported_language_does_not_invoke_engine() {
        let (adapter, engine) = adapter(Duration::ZERO);
        let tag = LangTag::parse("fra").unwrap();
        let result = adapter
            .recognize(
                &raster(),
                &tag,
                PageSegMode::SingleBlock,
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(TesseraError::UnsupportedLanguage(_))));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout_is_recognition_timeout() {
        let (adapter, _) = adapter(Duration::from_secs(5));
        let tag = LangTag::parse("eng").unwrap();
        let result = adapter
            .recognize_within(
                &raster(),
                &tag,
                PageSegMode::SingleBlock,
                Duration::from_millis(20),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(result, Err(TesseraError::RecognitionTimeout(20))));
    }

    #[tokio::test]
    async fn test_unavailable_engine_fails_with_reason() {
        let adapter = OcrAdapter::new(&make_config("openai/gpt-4o", None)).unwrap();
        let tag = LangTag::parse("eng").unwrap();
        let result = adapter
            .recognize(
                &raster(),
                &tag,
                PageSegMode::SingleBlock,
                &CancellationToken::new(),
            )
            .await;
        match result {
            Err(TesseraError::Recognition(msg)) => assert!(msg.contains("unavailable")),
            other => panic!("expected recognition failure, got {other:?}"),
        }
    }
}
