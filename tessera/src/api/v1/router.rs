use axum::{
    routing::{get, post},
    Router,
};

use crate::api::state::AppState;

use super::handlers;

pub fn v1_router() -> Router<AppState> {
    let docs = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/openapi.json", get(super::openapi::openapi_json))
        .merge(super::openapi::redoc_router());

    let ocr = Router::new()
        .route("/ocr", post(handlers::ocr::recognize))
        .route("/ocr:items", post(handlers::items::ocr_items));

    Router::new().merge(docs).merge(ocr)
}
