use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{health_handler, metrics_handler, snapshots_handler, AppState};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/api/health", get(health_handler))
        .route("/api/snapshots", get(snapshots_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
