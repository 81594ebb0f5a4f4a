use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use prometheus::Registry;
use serde::Serialize;
use tracing::error;

use crate::adapters::exposition::{encode_text, text_content_type};
use crate::adapters::ServerCollector;
use crate::application::MetricsExporter;
use crate::domain::OsKind;

/// Error rendered as a plain 500 response
#[derive(Debug)]
pub struct AppError(String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.0).into_response()
    }
}

impl From<prometheus::Error> for AppError {
    fn from(err: prometheus::Error) -> Self {
        AppError(err.to_string())
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub exporter: Arc<MetricsExporter>,
    pub registry: Registry,
}

impl AppState {
    /// Registers the stat cache collector in a fresh registry
    pub fn new(exporter: Arc<MetricsExporter>) -> prometheus::Result<Self> {
        let registry = Registry::new();
        registry.register(Box::new(ServerCollector::new(Arc::clone(&exporter))?))?;
        Ok(Self { exporter, registry })
    }
}

/// Response entry for /api/snapshots
#[derive(Debug, Serialize)]
pub struct SnapshotResponse {
    pub host: String,
    #[serde(rename = "type")]
    pub os_kind: OsKind,
    pub online: bool,
    pub accessible: bool,
    pub cpu_utilization: f64,
    pub mem_utilization: f64,
    pub collected_at: DateTime<Utc>,
}

/// Handler for GET /metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = encode_text(&state.registry.gather()).inspect_err(|e| {
        error!(error = %e, "Failed to encode metrics");
    })?;

    Ok(([(header::CONTENT_TYPE, text_content_type())], body).into_response())
}

/// Handler for GET /api/health
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "healthy",
            "service": "osprobe",
            "version": env!("CARGO_PKG_VERSION"),
            "hosts": state.exporter.cache().len(),
        })),
    )
}

/// Handler for GET /api/snapshots
pub async fn snapshots_handler(State(state): State<AppState>) -> Json<Vec<SnapshotResponse>> {
    let snapshots = state
        .exporter
        .cache()
        .snapshot()
        .into_iter()
        .map(|(host, snapshot)| SnapshotResponse {
            os_kind: state.exporter.os_kind(&host),
            host,
            online: snapshot.online,
            accessible: snapshot.accessible,
            cpu_utilization: snapshot.cpu_utilization,
            mem_utilization: snapshot.mem_utilization,
            collected_at: snapshot.collected_at,
        })
        .collect();

    Json(snapshots)
}
