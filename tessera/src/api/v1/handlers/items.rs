//! Shopping-list extraction on top of recognition.

use axum::extract::{Multipart, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tokio_util::sync::CancellationToken;

use super::ocr::{read_image_form, read_ocr_form};
use crate::api::v1::dto::{ItemsResponse, LegacyItemsResponse};
use crate::api::v1::response::{ApiError, ApiResponse, ResponseMeta};
use crate::api::AppState;
use crate::models::{OcrRequest, PageSegMode, PreprocessConfig, Threshold};

/// Preprocessing used by `/process-image`: grayscale, 3x3 median, sharpen,
/// fixed threshold at 140 and a 3x upscale.
pub const LEGACY_PREPROCESS: PreprocessConfig = PreprocessConfig {
    grayscale: true,
    threshold: Threshold::Fixed(140),
    deskew: false,
    denoise: 1,
    sharpen: true,
    upscale: 3,
};

/// `POST /api/v1/ocr:items`
///
/// Recognizes an uploaded shopping list and returns both the raw text and the
/// `{itemname, quantity}` entries found in it.
#[utoipa::path(
    post,
    path = "/api/v1/ocr:items",
    tag = "ocr",
    operation_id = "ocr.items",
    request_body(
        content_type = "multipart/form-data",
        content = String,
        description = "Same form fields as /api/v1/ocr"
    ),
    responses(
        (status = 200, description = "Recognized text and line items", body = ItemsResponse),
        (status = 400, description = "Invalid request or unsupported option", body = ApiError),
        (status = 503, description = "Too many requests in flight", body = ApiError),
    )
)]
pub async fn ocr_items(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResponse<ItemsResponse> {
    let base = *state.pipeline.preprocess_defaults();
    let request = match read_ocr_form(multipart, base).await {
        Ok(request) => request,
        Err(err) => return err.into(),
    };

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    match state.pipeline.process(request, cancel).await {
        Ok(outcome) => {
            let items = state.items.extract(outcome.result.text());
            tracing::info!(request_id = %outcome.request_id, items = items.len(), "Extracted line items");
            let meta = ResponseMeta {
                request_id: outcome.request_id,
            };
            ApiResponse::success_with_meta(
                ItemsResponse {
                    mean_confidence: outcome.result.mean_confidence(),
                    text: outcome.result.text().to_string(),
                    items,
                    timings: outcome.timings,
                },
                meta,
            )
        }
        Err(failure) => failure.into(),
    }
}

/// `POST /process-image`
///
/// Only the `file` field is read; every other option is fixed to what the
/// route has always used.
pub async fn process_image(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<LegacyItemsResponse>, Response> {
    let blob = read_image_form(multipart)
        .await
        .map_err(|e| ApiResponse::<()>::from(e).into_response())?;
    let request = OcrRequest::new(blob)
        .with_preprocess(LEGACY_PREPROCESS)
        .with_segmentation(PageSegMode::SingleBlock.as_u8().to_string());

    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let outcome = state
        .pipeline
        .process(request, cancel)
        .await
        .map_err(|failure| failure.error.into_response())?;

    let items = state.items.extract(outcome.result.text());
    tracing::info!(request_id = %outcome.request_id, items = ?items, "Processed items");
    Ok(Json(LegacyItemsResponse { items }))
}
