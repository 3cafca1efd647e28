use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::models::{PageSegMode, PreprocessConfig, Threshold};

fn parse_env_or<T: std::str::FromStr>(var: &str, default: T) -> T
where
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(val) => match val.parse() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Invalid value '{}' for {}: {}. Using default.", val, var, e);
                default
            }
        },
        Err(_) => default,
    }
}

/// Like [`parse_env_or`], but zero also falls back to the default.
fn parse_env_nonzero(var: &str, default: u64) -> u64 {
    match parse_env_or(var, default) {
        0 => {
            tracing::warn!("{} must be greater than zero. Using default {}.", var, default);
            default
        }
        value => value,
    }
}

/// Parse `OCR_LANGUAGES`.
/// Format: comma-separated traineddata names, e.g. `eng,deu,chi_sim`
fn parse_languages(raw: &str) -> Vec<String> {
    let languages: Vec<String> = raw
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if languages.is_empty() {
        tracing::warn!("OCR_LANGUAGES is empty, falling back to 'eng'");
        vec!["eng".to_string()]
    } else {
        languages
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub limits: LimitsConfig,
    pub ocr: OcrConfig,
    pub preprocess: PreprocessConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub max_payload_bytes: usize,
    /// Maximum number of requests running the pipeline at once.
    pub max_concurrent: usize,
    /// Maximum number of requests waiting for a slot.
    pub queue_depth: usize,
    pub queue_timeout_ms: u64,
    pub request_timeout_secs: u64,
}

impl LimitsConfig {
    pub fn queue_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OcrConfig {
    /// Engine selection, `<provider>/<model>` (e.g. "local/tesseract", "openai/gpt-4o").
    pub engine: String,
    pub tesseract_path: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Language names callers may request.
    pub languages: Vec<String>,
    pub default_language: String,
    pub default_psm: PageSegMode,
    /// Tesseract `--oem` value.
    pub engine_mode: u8,
    pub char_whitelist: Option<String>,
    pub timeout_secs: u64,
    pub max_image_dimension: u32,
}

impl OcrConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 10 * 1024 * 1024,
            max_concurrent: 4,
            queue_depth: 16,
            queue_timeout_ms: 5000,
            request_timeout_secs: 60,
        }
    }
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            engine: "local/tesseract".to_string(),
            tesseract_path: "tesseract".to_string(),
            api_key: None,
            base_url: None,
            languages: vec!["eng".to_string()],
            default_language: "eng".to_string(),
            default_psm: PageSegMode::SingleBlock,
            engine_mode: 3,
            char_whitelist: None,
            timeout_secs: 30,
            max_image_dimension: 4096,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8000,
            },
            limits: LimitsConfig::default(),
            ocr: OcrConfig::default(),
            preprocess: PreprocessConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let languages = env::var("OCR_LANGUAGES")
            .map(|raw| parse_languages(&raw))
            .unwrap_or(defaults.ocr.languages);
        let default_language = env::var("OCR_DEFAULT_LANGUAGE")
            .ok()
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| languages[0].clone());

        Self {
            server: ServerConfig {
                host: env::var("TESSERA_HOST").unwrap_or(defaults.server.host),
                port: parse_env_or("TESSERA_PORT", defaults.server.port),
            },
            limits: LimitsConfig {
                max_payload_bytes: parse_env_or(
                    "TESSERA_MAX_PAYLOAD_BYTES",
                    defaults.limits.max_payload_bytes,
                ),
                max_concurrent: parse_env_or(
                    "TESSERA_MAX_CONCURRENT",
                    defaults.limits.max_concurrent,
                )
                .max(1),
                queue_depth: parse_env_or("TESSERA_QUEUE_DEPTH", defaults.limits.queue_depth),
                queue_timeout_ms: parse_env_or(
                    "TESSERA_QUEUE_TIMEOUT_MS",
                    defaults.limits.queue_timeout_ms,
                ),
                request_timeout_secs: parse_env_nonzero(
                    "TESSERA_REQUEST_TIMEOUT_SECS",
                    defaults.limits.request_timeout_secs,
                ),
            },
            ocr: OcrConfig {
                engine: env::var("OCR_ENGINE").unwrap_or(defaults.ocr.engine),
                tesseract_path: env::var("OCR_TESSERACT_PATH")
                    .unwrap_or(defaults.ocr.tesseract_path),
                api_key: env::var("OCR_API_KEY").ok(),
                base_url: env::var("OCR_BASE_URL").ok(),
                languages,
                default_language,
                default_psm: parse_env_or("OCR_DEFAULT_PSM", defaults.ocr.default_psm),
                engine_mode: parse_env_or("OCR_ENGINE_MODE", defaults.ocr.engine_mode),
                char_whitelist: env::var("OCR_CHAR_WHITELIST")
                    .ok()
                    .filter(|w| !w.is_empty()),
                timeout_secs: parse_env_nonzero("OCR_TIMEOUT", defaults.ocr.timeout_secs),
                max_image_dimension: parse_env_or(
                    "OCR_MAX_DIMENSION",
                    defaults.ocr.max_image_dimension,
                ),
            },
            preprocess: preprocess_from_env(defaults.preprocess),
        }
    }
}

/// Read the `PREPROCESS_*` defaults. An out-of-range combination would fail
/// every request that relies on it, so it is replaced as a whole.
fn preprocess_from_env(defaults: PreprocessConfig) -> PreprocessConfig {
    let config = PreprocessConfig {
        grayscale: parse_env_or("PREPROCESS_GRAYSCALE", defaults.grayscale),
        threshold: parse_env_or::<Threshold>("PREPROCESS_THRESHOLD", defaults.threshold),
        deskew: parse_env_or("PREPROCESS_DESKEW", defaults.deskew),
        denoise: parse_env_or("PREPROCESS_DENOISE", defaults.denoise),
        sharpen: parse_env_or("PREPROCESS_SHARPEN", defaults.sharpen),
        upscale: parse_env_or("PREPROCESS_UPSCALE", defaults.upscale),
    };

    match config.validate() {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!("Invalid preprocessing defaults: {}. Using built-in defaults.", e);
            defaults
        }
    }
}

/// Known remote OCR providers speaking the OpenAI-compatible vision API.
pub const KNOWN_REMOTE_PROVIDERS: &[&str] = &["openai", "mistral", "deepseek"];

/// Parse an engine name into (provider, model) tuple.
pub fn parse_engine_model(engine: &str) -> (&str, &str) {
    if let Some((prefix, rest)) = engine.split_once('/') {
        let prefix_lower = prefix.to_lowercase();
        if KNOWN_REMOTE_PROVIDERS.contains(&prefix_lower.as_str()) || prefix_lower == "local" {
            return (prefix, rest);
        }
    }
    // Default to treating the whole string as a local engine
    ("local", engine)
}
