use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use crate::state::{AppState, ServiceMetrics};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<ServiceMetrics>,
}

pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
}

async fn live(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(build_response("ok", &state))
}

async fn ready(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    if !state.ready() {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(build_response("not_configured", &state)),
        );
    }

    if let Some(metrics) = state.metrics()
        && metrics.available_permits == 0
    {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(build_response("degraded", &state)),
        );
    }

    (StatusCode::OK, Json(build_response("ok", &state)))
}

fn build_response(status: &'static str, state: &AppState) -> HealthResponse {
    HealthResponse {
        status,
        ready: state.ready(),
        metrics: state.metrics(),
    }
}
