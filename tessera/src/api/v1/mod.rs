pub mod dto;
pub mod handlers;
pub mod openapi;
pub mod response;
pub mod router;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use image::{DynamicImage, ImageFormat};
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    use crate::api::routes::create_router;
    use crate::api::state::AppState;
    use crate::config::Config;
    use crate::error::Result;
    use crate::models::{LangTag, PageSegMode, RasterImage, RecognitionResult, RegionConfidence};
    use crate::ocr::{OcrAdapter, OcrEngine};

    const BOUNDARY: &str = "tessera-test-boundary";

    /// Always reads the same text, regardless of the image.
    struct FixedEngine(&'static str);

    #[async_trait]
    impl OcrEngine for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn recognize(
            &self,
            _image: &RasterImage,
            language: &LangTag,
            _mode: PageSegMode,
            _cancel: &CancellationToken,
        ) -> Result<RecognitionResult> {
            let region = RegionConfidence {
                id: "b1.p1.l1".to_string(),
                confidence: 0.9,
                bbox: None,
            };
            Ok(RecognitionResult::new(
                self.0.to_string(),
                vec![region],
                language.clone(),
            ))
        }
    }

    fn test_state(text: &'static str) -> AppState {
        let config = Config::default();
        let adapter = OcrAdapter::with_engine(Arc::new(FixedEngine(text)), &config.ocr).unwrap();
        AppState::new(config, adapter).unwrap()
    }

    fn png() -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::new_rgb8(16, 16)
            .write_to(&mut std::io::Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart(file: Option<&[u8]>, fields: &[(&str, &str)]) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(file) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"list.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(file);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_engine_and_load() {
        let app = create_router(test_state(""));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["status"], "ok");
        assert_eq!(json["data"]["engine"]["name"], "fixed");
        assert_eq!(json["data"]["load"]["inFlight"], 0);
        assert!(json.get("error").is_none());
    }

    #[tokio::test]
    async fn openapi_json_is_valid() {
        let app = create_router(test_state(""));

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/openapi.json")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let version = json["openapi"]
            .as_str()
            .expect("openapi field should be a string");
        assert!(
            version.starts_with("3"),
            "OpenAPI version should start with 3, got: {version}"
        );
        assert!(json["paths"].get("/api/v1/ocr").is_some());

        let request_id = &json["components"]["schemas"]["ResponseMeta"]["properties"]["requestId"];
        assert_eq!(request_id["type"], "string");
        assert_eq!(request_id["format"], "uuid");
    }

    #[tokio::test]
    async fn ocr_returns_text_and_timings() {
        let app = create_router(test_state("hello world"));

        let response = app
            .oneshot(upload(
                "/api/v1/ocr",
                multipart(Some(&png()), &[("language", "eng"), ("psm", "6")]),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["text"], "hello world");
        assert_eq!(json["data"]["language"], "eng");
        assert_eq!(json["data"]["regions"][0]["id"], "b1.p1.l1");
        assert!(json["data"]["timings"].get("totalMs").is_some());
        assert!(json["meta"]["requestId"].is_string());
    }

    #[tokio::test]
    async fn missing_file_is_invalid_request() {
        let app = create_router(test_state(""));

        let response = app
            .oneshot(upload("/api/v1/ocr", multipart(None, &[("language", "eng")])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json.get("data").is_none());
        assert_eq!(json["error"]["code"], "invalid_request");
    }

    #[tokio::test]
    async fn bad_boolean_field_is_invalid_request() {
        let app = create_router(test_state(""));

        let response = app
            .oneshot(upload(
                "/api/v1/ocr",
                multipart(Some(&png()), &[("deskew", "sometimes")]),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert!(json["error"]["message"]
            .as_str()
            .unwrap()
            .contains("deskew"));
    }

    #[tokio::test]
    async fn unsupported_language_reports_stage() {
        let app = create_router(test_state(""));

        let response = app
            .oneshot(upload(
                "/api/v1/ocr",
                multipart(Some(&png()), &[("language", "klingon")]),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "unsupported_language");
        assert_eq!(json["error"]["stage"], "received");
    }

    #[tokio::test]
    async fn non_image_upload_is_unsupported_format() {
        let app = create_router(test_state(""));

        let response = app
            .oneshot(upload(
                "/api/v1/ocr",
                multipart(Some(b"just some text, not an image"), &[]),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "unsupported_format");
    }

    #[tokio::test]
    async fn ocr_items_extracts_line_items() {
        let app = create_router(test_state("onion 2kg\nmilk 1 lit V"));

        let response = app
            .oneshot(upload("/api/v1/ocr:items", multipart(Some(&png()), &[])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["data"]["items"][0]["itemname"], "Onion");
        assert_eq!(json["data"]["items"][0]["quantity"], "2kg");
        assert_eq!(json["data"]["items"][1]["itemname"], "Milk");
        assert_eq!(json["data"]["items"][1]["quantity"], "1lit");
    }

    #[tokio::test]
    async fn process_image_returns_bare_items() {
        let app = create_router(test_state("rice 5kg + dal 1kg"));

        let response = app
            .oneshot(upload("/process-image", multipart(Some(&png()), &[])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json,
            serde_json::json!({
                "items": [
                    {"itemname": "Rice", "quantity": "5kg"},
                    {"itemname": "Dal", "quantity": "1kg"},
                ]
            })
        );
    }

    #[tokio::test]
    async fn process_image_ignores_option_fields() {
        let app = create_router(test_state("milk 2 lit"));

        let response = app
            .oneshot(upload(
                "/process-image",
                multipart(
                    Some(&png()),
                    &[("grayscale", "maybe"), ("threshold", "dark"), ("timeoutMs", "0")],
                ),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["items"][0]["itemname"], "Milk");
    }

    #[tokio::test]
    async fn process_image_errors_use_flat_error_body() {
        let app = create_router(test_state(""));

        let response = app
            .oneshot(upload("/process-image", multipart(Some(b"nope"), &[])))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "unsupported_format");
    }
}
