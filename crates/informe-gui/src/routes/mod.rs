mod health;
mod report;

use axum::{Router, response::Html, routing::get};
use health::health_router;
use report::report_router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .nest("/health", health_router())
        .nest("/api", report_router())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Single embedded dashboard page; all dynamic behavior goes through the API.
async fn dashboard() -> Html<&'static str> {
    Html(include_str!("../../web/index.html"))
}
