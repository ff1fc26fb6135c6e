//! fieldsync server binary.
//!
//! Loads the schema document, connects the configured stores and serves the
//! sync endpoints.

use fieldsync_engine::ConfigError as SchemaError;
use fieldsync_server::adapter::{AdapterSet, CrmAdapter, PgAdapter, SourceAdapter};
use fieldsync_server::config::Config;
use fieldsync_server::sync::Synchronizer;
use fieldsync_server::{app, db, load_registry, AppState};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Source id served by the Postgres adapter.
const POSTGRES_SOURCE: &str = "postgres";
/// Source id served by the CRM adapter.
const CRM_SOURCE: &str = "zoho";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fieldsync_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let registry = Arc::new(load_registry(&config.schema_path)?);
    tracing::info!(
        schema = %config.schema_path,
        fields = registry.canonical_fields().len(),
        sources = registry.sources().len(),
        "Schema loaded"
    );

    // Connect the stores
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();
    for source in registry.sources() {
        match source.id() {
            POSTGRES_SOURCE => {
                let pool = db::create_pool(&config.database_url, config.sync.call_timeout).await?;
                adapters.push(Arc::new(PgAdapter::new(
                    POSTGRES_SOURCE,
                    pool,
                    config.pg_table.clone(),
                    &registry,
                )?));
            }
            CRM_SOURCE => {
                let crm = config
                    .crm
                    .clone()
                    .ok_or_else(|| SchemaError::MissingAdapter(CRM_SOURCE.to_string()))?;
                let client = reqwest::Client::builder()
                    .timeout(config.sync.call_timeout)
                    .build()?;
                adapters.push(Arc::new(CrmAdapter::new(CRM_SOURCE, client, crm, &registry)?));
            }
            other => return Err(SchemaError::MissingAdapter(other.to_string()).into()),
        }
    }
    let adapters = AdapterSet::new(&registry, adapters)?;

    let synchronizer = Synchronizer::new(registry, adapters, config.sync);

    tracing::info!("Starting fieldsync server on {}:{}", config.host, config.port);

    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState {
        synchronizer: Arc::new(synchronizer),
        config: Arc::new(config),
    };

    // Start server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}
