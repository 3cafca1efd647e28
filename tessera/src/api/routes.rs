use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::v1;
use super::AppState;

/// Room for the multipart envelope around the image itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let body_limit = state
        .config
        .limits
        .max_payload_bytes
        .saturating_add(MULTIPART_OVERHEAD);

    let v1 = v1::router::v1_router();

    Router::new()
        .nest("/api/v1", v1)
        // legacy route for existing shopping-list clients
        .route("/process-image", post(v1::handlers::items::process_image))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
