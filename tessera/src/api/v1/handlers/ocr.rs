//! v1 OCR handlers.
//!
//! Uploads arrive as `multipart/form-data` with a `file` field and optional
//! per-request overrides. The handlers translate the form into an
//! [`OcrRequest`], run it through the pipeline and wrap the outcome in an
//! [`ApiResponse`] envelope.

use std::time::Duration;

use axum::extract::multipart::{Field, MultipartError};
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use tokio_util::sync::CancellationToken;

use crate::api::v1::dto::OcrResponse;
use crate::api::v1::response::{ApiError, ApiResponse, ErrorCode, ResponseMeta};
use crate::api::AppState;
use crate::models::{ImageBlob, OcrRequest, PreprocessConfig, Threshold};

pub(super) fn parse_form_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn invalid(message: impl Into<String>) -> ApiError {
    ApiError::new(ErrorCode::InvalidRequest, message)
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::new(ErrorCode::PayloadTooLarge, err.body_text());
    }
    invalid(format!("Invalid multipart body: {}", err.body_text()))
}

async fn read_text(field: Field<'_>, name: &str) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map(|t| t.trim().to_string())
        .map_err(|e| invalid(format!("Invalid {name} value: {e}")))
}

fn parse_number<N: std::str::FromStr>(raw: &str, name: &str) -> Result<N, ApiError> {
    raw.parse::<N>()
        .map_err(|_| invalid(format!("{name} must be a non-negative integer, got '{raw}'")))
}

fn parse_bool(raw: &str, name: &str) -> Result<bool, ApiError> {
    parse_form_bool(raw)
        .ok_or_else(|| invalid(format!("{name} must be one of true/false/1/0/yes/no")))
}

async fn read_file(field: Field<'_>) -> Result<ImageBlob, ApiError> {
    let content_type = field.content_type().map(str::to_string);
    let bytes = field.bytes().await.map_err(multipart_error)?;
    Ok(ImageBlob::new(bytes.to_vec(), content_type))
}

/// Read only the image of an upload form. Other fields are skipped unparsed.
pub(super) async fn read_image_form(mut multipart: Multipart) -> Result<ImageBlob, ApiError> {
    let mut blob: Option<ImageBlob> = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if matches!(field.name(), Some("file" | "image")) {
            blob = Some(read_file(field).await?);
        }
    }
    blob.ok_or_else(|| invalid("Missing required 'file' field"))
}

/// Read an OCR upload form. Preprocessing options not present in the form
/// keep their value from `base`.
pub(super) async fn read_ocr_form(
    mut multipart: Multipart,
    base: PreprocessConfig,
) -> Result<OcrRequest, ApiError> {
    let mut blob: Option<ImageBlob> = None;
    let mut language: Option<String> = None;
    let mut psm: Option<String> = None;
    let mut timeout: Option<Duration> = None;
    let mut preprocess = base;

    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => return Err(multipart_error(e)),
        };
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "file" | "image" => blob = Some(read_file(field).await?),
            "language" | "lang" => {
                let raw = read_text(field, "language").await?;
                if !raw.is_empty() {
                    language = Some(raw);
                }
            }
            "psm" | "segmentation" => {
                let raw = read_text(field, "psm").await?;
                if !raw.is_empty() {
                    psm = Some(raw);
                }
            }
            "grayscale" => {
                let raw = read_text(field, "grayscale").await?;
                preprocess.grayscale = parse_bool(&raw, "grayscale")?;
            }
            "threshold" => {
                let raw = read_text(field, "threshold").await?;
                preprocess.threshold = raw.parse::<Threshold>().map_err(invalid)?;
            }
            "deskew" => {
                let raw = read_text(field, "deskew").await?;
                preprocess.deskew = parse_bool(&raw, "deskew")?;
            }
            "denoise" => {
                let raw = read_text(field, "denoise").await?;
                preprocess.denoise = parse_number(&raw, "denoise")?;
            }
            "sharpen" => {
                let raw = read_text(field, "sharpen").await?;
                preprocess.sharpen = parse_bool(&raw, "sharpen")?;
            }
            "upscale" => {
                let raw = read_text(field, "upscale").await?;
                preprocess.upscale = parse_number(&raw, "upscale")?;
            }
            "timeoutMs" | "timeout_ms" => {
                let raw = read_text(field, "timeoutMs").await?;
                let ms: u64 = parse_number(&raw, "timeoutMs")?;
                if ms == 0 {
                    return Err(invalid("timeoutMs must be greater than 0"));
                }
                timeout = Some(Duration::from_millis(ms));
            }
            _ => {}
        }
    }

    let Some(blob) = blob else {
        return Err(invalid("Missing required 'file' field"));
    };

    let mut request = OcrRequest::new(blob).with_preprocess(preprocess);
    if let Some(language) = language {
        request = request.with_language(language);
    }
    if let Some(psm) = psm {
        request = request.with_segmentation(psm);
    }
    if let Some(timeout) = timeout {
        request = request.with_timeout(timeout);
    }
    Ok(request)
}

/// `POST /api/v1/ocr`
///
/// Recognizes the text of one uploaded image. Options that are not sent fall
/// back to the service configuration.
#[utoipa::path(
    post,
    path = "/api/v1/ocr",
    tag = "ocr",
    operation_id = "ocr.recognize",
    request_body(
        content_type = "multipart/form-data",
        content = String,
        description = "Image `file` with optional language, psm, grayscale, threshold, deskew, denoise, sharpen, upscale and timeoutMs fields"
    ),
    responses(
        (status = 200, description = "Recognized text", body = OcrResponse),
        (status = 400, description = "Invalid request or unsupported option", body = ApiError),
        (status = 413, description = "Image too large", body = ApiError),
        (status = 415, description = "Unsupported image format", body = ApiError),
        (status = 422, description = "Image could not be decoded", body = ApiError),
        (status = 502, description = "OCR engine failure", body = ApiError),
        (status = 503, description = "Too many requests in flight", body = ApiError),
        (status = 504, description = "Recognition or request deadline expired", body = ApiError),
    )
)]
pub async fn recognize(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResponse<OcrResponse> {
    let base = *state.pipeline.preprocess_defaults();
    let request = match read_ocr_form(multipart, base).await {
        Ok(request) => request,
        Err(err) => return err.into(),
    };

    // Dropping the handler future (client went away) cancels the request.
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.pipeline.process(request, cancel).await {
        Ok(outcome) => {
            let meta = ResponseMeta {
                request_id: outcome.request_id,
            };
            ApiResponse::success_with_meta(OcrResponse::from(outcome), meta)
        }
        Err(failure) => failure.into(),
    }
}
