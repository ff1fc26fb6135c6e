//! Configuration management for the server.

use crate::adapter::{CrmConfig, PgTable};
use crate::sync::SyncOptions;
use std::env;
use std::time::Duration;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address
    pub host: String,
    /// Server port
    pub port: u16,
    /// PostgreSQL connection URL
    pub database_url: String,
    /// Bearer token required on sync endpoints, if set
    pub auth_secret: Option<String>,
    /// Path of the JSON schema document (catalog, mappings, priorities)
    pub schema_path: String,
    /// Table backing the `postgres` source
    pub pg_table: PgTable,
    /// CRM settings, present when `CRM_BASE_URL` is set
    pub crm: Option<CrmConfig>,
    pub sync: SyncOptions,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let port = env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidPort)?;

        let database_url = env::var("DATABASE_URL").map_err(|_| ConfigError::MissingDatabaseUrl)?;

        let auth_secret = env::var("AUTH_SECRET").ok().filter(|s| !s.is_empty());

        let schema_path = env::var("SCHEMA_PATH")
            .unwrap_or_else(|_| "config/contacts.schema.json".to_string());

        let defaults = PgTable::default();
        let pg_table = PgTable {
            table: env::var("PG_TABLE").unwrap_or(defaults.table),
            key_column: env::var("PG_KEY_COLUMN").unwrap_or(defaults.key_column),
            updated_at_column: env::var("PG_UPDATED_AT_COLUMN")
                .unwrap_or(defaults.updated_at_column),
        };

        let crm = match env::var("CRM_BASE_URL") {
            Ok(base_url) => {
                let defaults = CrmConfig::default();
                Some(CrmConfig {
                    base_url,
                    token: env::var("CRM_TOKEN").map_err(|_| ConfigError::MissingCrmToken)?,
                    module: env::var("CRM_MODULE").unwrap_or(defaults.module),
                    key_field: env::var("CRM_KEY_FIELD").unwrap_or(defaults.key_field),
                    modified_field: env::var("CRM_MODIFIED_FIELD")
                        .unwrap_or(defaults.modified_field),
                })
            }
            Err(_) => None,
        };

        let defaults = SyncOptions::default();
        let call_timeout = match env::var("ADAPTER_TIMEOUT_MS") {
            Ok(raw) => Duration::from_millis(
                raw.parse()
                    .map_err(|_| ConfigError::InvalidNumber("ADAPTER_TIMEOUT_MS"))?,
            ),
            Err(_) => defaults.call_timeout,
        };
        let concurrency = match env::var("SYNC_CONCURRENCY") {
            Ok(raw) => raw
                .parse()
                .ok()
                .filter(|n| *n > 0)
                .ok_or(ConfigError::InvalidNumber("SYNC_CONCURRENCY"))?,
            Err(_) => defaults.concurrency,
        };

        Ok(Self {
            host,
            port,
            database_url,
            auth_secret,
            schema_path,
            pg_table,
            crm,
            sync: SyncOptions {
                call_timeout,
                concurrency,
            },
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("DATABASE_URL environment variable is required")]
    MissingDatabaseUrl,

    #[error("CRM_TOKEN is required when CRM_BASE_URL is set")]
    MissingCrmToken,

    #[error("Invalid PORT value")]
    InvalidPort,

    #[error("Invalid {0} value")]
    InvalidNumber(&'static str),
}
