use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::engine::OcrEngine;
use crate::config::{parse_engine_model, OcrConfig};
use crate::error::{Result, TesseraError};
use crate::models::{LangTag, PageSegMode, RasterImage, RecognitionResult};

/// Remote providers that speak the OpenAI chat-completions vision format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisionProvider {
    OpenAi,
    Mistral,
    DeepSeek,
}

impl VisionProvider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "mistral" => Some(Self::Mistral),
            "deepseek" => Some(Self::DeepSeek),
            _ => None,
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Mistral => "https://api.mistral.ai/v1",
            Self::DeepSeek => "https://api.deepseek.com/v1",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4o",
            Self::Mistral => "pixtral-12b-2409",
            Self::DeepSeek => "deepseek-vl",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Mistral => "mistral",
            Self::DeepSeek => "deepseek",
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

/// OCR through a hosted vision model. Only text comes back, so results carry
/// no regions.
#[derive(Clone, Debug)]
pub struct VisionApiEngine {
    client: Client,
    provider: VisionProvider,
    api_key: String,
    base_url: String,
    model: String,
}

impl VisionApiEngine {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let (prefix, model) = parse_engine_model(&config.engine);
        let provider = VisionProvider::from_name(prefix).ok_or_else(|| {
            TesseraError::Validation(format!("Unknown OCR provider '{prefix}'"))
        })?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            TesseraError::Validation(format!("API key required for {} OCR", provider.label()))
        })?;

        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| provider.default_base_url().to_string());

        let model = if model.is_empty() {
            provider.default_model().to_string()
        } else {
            model.to_string()
        };

        // The adapter owns the timeout; the client only bounds connecting.
        let client = Client::builder()
            .connect_timeout(config.timeout())
            .build()
            .map_err(|e| TesseraError::Internal(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            provider,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        })
    }

    fn build_request(&self, png: &[u8], language: &LangTag) -> ChatRequest {
        let data_url = format!("data:image/png;base64,{}", STANDARD.encode(png));
        let prompt = format!(
            "Extract all text from this image. The text is in language(s): {language}. \
             Return only the extracted text without any explanations or formatting."
        );

        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text { text: prompt },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            max_tokens: 4096,
        }
    }

    async fn make_request(&self, request: &ChatRequest) -> Result<String> {
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| TesseraError::Recognition(format!("OCR API request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(TesseraError::Recognition(format!(
                "OCR API request failed: {status} - {body}"
            )));
        }

        let chat_response: ChatResponse = resp
            .json()
            .await
            .map_err(|e| TesseraError::Recognition(format!("Failed to parse response: {e}")))?;

        chat_response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| TesseraError::Recognition("No response from API".to_string()))
    }
}

#[async_trait]
impl OcrEngine for VisionApiEngine {
    fn name(&self) -> &str {
        self.provider.label()
    }

    async fn recognize(
        &self,
        image: &RasterImage,
        language: &LangTag,
        _mode: PageSegMode,
        cancel: &CancellationToken,
    ) -> Result<RecognitionResult> {
        let raster = image.clone();
        let png = tokio::task::spawn_blocking(move || raster.encode_png())
            .await
            .map_err(|e| TesseraError::Internal(format!("PNG encoding task failed: {e}")))??;

        let request = self.build_request(&png, language);
        let text = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TesseraError::Cancelled),
            text = self.make_request(&request) => text?,
        };

        Ok(RecognitionResult::new(
            text.trim().to_string(),
            Vec::new(),
            language.clone(),
        ))
    }
}
