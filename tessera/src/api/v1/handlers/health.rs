use axum::extract::State;
use serde::Serialize;

use crate::api::state::AppState;
use crate::api::v1::response::ApiResponse;

/// Health data returned inside the v1 envelope.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct HealthData {
    pub status: String,
    pub version: String,
    pub engine: EngineStatus,
    pub load: LoadStatus,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct EngineStatus {
    pub name: String,
    pub status: String,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadStatus {
    pub in_flight: usize,
    pub queued: usize,
    pub max_concurrent: usize,
    pub queue_depth: usize,
}

/// `GET /api/v1/health`
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Service health status", body = HealthData),
    )
)]
pub async fn health_check(State(state): State<AppState>) -> ApiResponse<HealthData> {
    let adapter = state.pipeline.adapter();
    let admission = state.pipeline.admission();

    let (status, engine_status) = if adapter.is_available() {
        ("ok", "available")
    } else {
        ("degraded", "unavailable")
    };

    ApiResponse::success(HealthData {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        engine: EngineStatus {
            name: adapter.engine_name().to_string(),
            status: engine_status.to_string(),
            languages: adapter.languages().to_vec(),
        },
        load: LoadStatus {
            in_flight: admission.in_flight(),
            queued: admission.queued(),
            max_concurrent: admission.max_concurrent(),
            queue_depth: admission.queue_depth(),
        },
    })
}
