use axum::Json;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use super::dto;
use super::handlers;
use super::response;
use crate::models;
use crate::processing;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tessera API",
        version = "1.0.0",
        description = "Self-hostable OCR service. Upload an image, get its text back.",
    ),
    paths(
        handlers::health::health_check,
        handlers::ocr::recognize,
        handlers::items::ocr_items,
    ),
    components(schemas(
        // Response envelope
        response::ErrorCode,
        response::ApiError,
        response::ResponseMeta,
        // OCR
        dto::OcrResponse,
        dto::ItemsResponse,
        dto::LegacyItemsResponse,
        models::RegionConfidence,
        models::BoundingBox,
        models::StageTimings,
        models::RequestStage,
        processing::LineItem,
        // Health (handler-local types)
        handlers::health::HealthData,
        handlers::health::EngineStatus,
        handlers::health::LoadStatus,
    )),
    tags(
        (name = "health", description = "Health check"),
        (name = "ocr", description = "Text recognition and line-item extraction"),
    ),
)]
pub struct ApiDoc;

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

pub fn redoc_router<S: Clone + Send + Sync + 'static>() -> axum::Router<S> {
    Redoc::with_url("/docs", ApiDoc::openapi()).into()
}
