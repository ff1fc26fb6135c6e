//! fieldsync server - runs field-level record sync against real stores.
//!
//! The server binds a [`fieldsync_engine::SchemaRegistry`] to one
//! [`adapter::SourceAdapter`] per configured source and exposes sync-by-key
//! over HTTP. Which keys to sync is up to the caller.

pub mod adapter;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod sync;

use crate::config::Config;
use crate::sync::Synchronizer;
use axum::Router;
use fieldsync_engine::{ConfigError, SchemaRegistry};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub synchronizer: Arc<Synchronizer>,
    pub config: Arc<Config>,
}

/// Build the HTTP application.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::create_routes())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Load the schema document (catalog, source mappings and priorities).
pub fn load_registry(path: impl AsRef<Path>) -> Result<SchemaRegistry, ConfigError> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;
    SchemaRegistry::from_json_str(&json)
}
