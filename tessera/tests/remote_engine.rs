mod common;

use image::ImageFormat;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::text_like;
use tessera::config::Config;
use tessera::error::TesseraError;
use tessera::models::{OcrRequest, RequestStage};
use tessera::ocr::OcrAdapter;
use tessera::processing::{LineItemExtractor, ProcessingPipeline};

fn remote_config(base_url: Option<String>, api_key: Option<&str>) -> Config {
    let mut config = Config::default();
    config.ocr.engine = "openai/gpt-4o-mini".to_string();
    config.ocr.base_url = base_url;
    config.ocr.api_key = api_key.map(String::from);
    config
}

fn remote_pipeline(config: &Config) -> ProcessingPipeline {
    let adapter = OcrAdapter::new(&config.ocr).unwrap();
    ProcessingPipeline::new(config, adapter)
}

#[tokio::test]
async fn vision_api_text_flows_through_pipeline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": "\n0nion 2kg + potatc 1kg\n"}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = remote_config(Some(server.uri()), Some("test-key"));
    let pipeline = remote_pipeline(&config);
    assert_eq!(pipeline.adapter().engine_name(), "openai");

    let outcome = pipeline
        .process(
            OcrRequest::new(text_like(40, 40, ImageFormat::Png)),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(outcome.result.text(), "0nion 2kg + potatc 1kg");
    assert_eq!(outcome.result.mean_confidence(), 0.0);

    let items = LineItemExtractor::new().unwrap().extract(outcome.result.text());
    let names: Vec<_> = items.iter().map(|i| i.itemname.as_str()).collect();
    assert_eq!(names, vec!["Onion", "Potato"]);
}

#[tokio::test]
async fn vision_api_error_is_recognition_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&server)
        .await;

    let config = remote_config(Some(server.uri()), Some("test-key"));
    let pipeline = remote_pipeline(&config);

    let failure = pipeline
        .process(
            OcrRequest::new(text_like(40, 40, ImageFormat::Png)),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(failure.error, TesseraError::Recognition(_)));
    assert_eq!(failure.stage, RequestStage::Recognizing);
    assert_eq!(pipeline.admission().in_flight(), 0);
}

#[tokio::test]
async fn missing_api_key_degrades_to_unavailable_engine() {
    let config = remote_config(None, None);
    let pipeline = remote_pipeline(&config);
    assert!(!pipeline.adapter().is_available());

    let failure = pipeline
        .process(
            OcrRequest::new(text_like(40, 40, ImageFormat::Png)),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(failure.error, TesseraError::Recognition(_)));
    assert!(failure.error.to_string().contains("API key required"));
}
