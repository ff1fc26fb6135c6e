//! Sync endpoint routes.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use fieldsync_engine::{RecordKey, SyncPlan, SyncReport};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::{AppError, Result};
use crate::AppState;

/// Upper bound on keys accepted by one batch request.
pub const MAX_BATCH_KEYS: usize = 500;

/// Request body for POST /sync.
#[derive(Debug, Deserialize)]
pub struct BatchSyncRequest {
    pub keys: Vec<String>,
}

/// Response body for POST /sync.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
    pub reports: Vec<SyncReport>,
}

/// Create sync routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/sync", post(sync_batch_handler))
        .route("/sync/{key}", post(sync_handler))
        .route("/sync/{key}/plan", get(plan_handler))
}

fn parse_key(raw: String) -> Result<RecordKey> {
    if raw.trim().is_empty() {
        return Err(AppError::BadRequest("record key must not be empty".into()));
    }
    Ok(RecordKey::new(raw))
}

/// POST /sync/{key} - Sync one record across all sources.
async fn sync_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(key): Path<String>,
) -> Result<Json<SyncReport>> {
    let key = parse_key(key)?;
    let report = state.synchronizer.sync(&key).await;
    Ok(Json(report))
}

/// GET /sync/{key}/plan - Show what a sync would write.
async fn plan_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(key): Path<String>,
) -> Result<Json<SyncPlan>> {
    let key = parse_key(key)?;
    let plan = state.synchronizer.plan(&key).await;
    Ok(Json(plan))
}

/// POST /sync - Sync a batch of independent records.
async fn sync_batch_handler(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(request): Json<BatchSyncRequest>,
) -> Result<Json<BatchSyncResponse>> {
    if request.keys.is_empty() {
        return Err(AppError::BadRequest("keys must not be empty".into()));
    }
    if request.keys.len() > MAX_BATCH_KEYS {
        return Err(AppError::BadRequest(format!(
            "at most {} keys per request",
            MAX_BATCH_KEYS
        )));
    }

    let keys = request
        .keys
        .into_iter()
        .map(parse_key)
        .collect::<Result<Vec<_>>>()?;

    tracing::info!(keys = keys.len(), "batch sync requested");
    let reports = state.synchronizer.sync_many(keys).await;
    Ok(Json(BatchSyncResponse { reports }))
}
