//! Health check endpoint.

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    /// Configured sources, in priority order
    pub sources: Vec<String>,
    pub fields: usize,
}

/// Create health routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/", get(root))
}

/// Health check handler.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.synchronizer.registry();
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sources: registry.sources().iter().map(|s| s.id().to_string()).collect(),
        fields: registry.canonical_fields().len(),
    })
}

/// Root handler.
async fn root() -> &'static str {
    "fieldsync server"
}
