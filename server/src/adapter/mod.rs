//! Source adapters.
//!
//! An adapter is the only thing that talks to a store. The sync core sees
//! every store through [`SourceAdapter`] and never holds a connection of its
//! own; pools and clients are created by the caller and handed in.

mod crm;
mod memory;
mod postgres;

pub use crm::{CrmAdapter, CrmConfig};
pub use memory::MemoryAdapter;
pub use postgres::{PgAdapter, PgTable};

use async_trait::async_trait;
use fieldsync_engine::{
    AdapterError, ConfigError, FieldSnapshot, FieldValue, NativeName, RecordKey, SchemaRegistry,
    SourceId, Timestamp,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Outcome of fetching one native field.
///
/// `Ok(None)` means the source has no record for the key. A record that
/// exists with the field unset is `Ok(Some(snapshot))` with no value.
pub type FetchResult = Result<Option<FieldSnapshot>, AdapterError>;

/// Read/write capability for one data source.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Source id, as configured in the schema.
    fn id(&self) -> &str;

    /// Fetch one native field of the record identified by `key`.
    async fn fetch(&self, key: &RecordKey, native: &str) -> FetchResult;

    /// Fetch several native fields at once.
    ///
    /// Sources that can read a whole record in one call should override
    /// this; the default issues one `fetch` per field. The planner puts one
    /// deadline on the whole batch, so the per-field fallback shares it
    /// across every `fetch` it makes.
    async fn fetch_batch(
        &self,
        key: &RecordKey,
        natives: &[&str],
    ) -> Vec<(NativeName, FetchResult)> {
        let mut results = Vec::with_capacity(natives.len());
        for native in natives {
            results.push((native.to_string(), self.fetch(key, native).await));
        }
        results
    }

    /// Upsert one native field with the winning value and its timestamp.
    ///
    /// Writing the same value twice must leave the source unchanged.
    async fn write(
        &self,
        key: &RecordKey,
        native: &str,
        value: &FieldValue,
        timestamp: Timestamp,
    ) -> Result<(), AdapterError>;
}

/// The fixed set of adapters, one per configured source.
#[derive(Clone)]
pub struct AdapterSet {
    adapters: HashMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl AdapterSet {
    /// Bind adapters to the registry's sources.
    ///
    /// Every configured source needs exactly one adapter and every adapter
    /// must belong to a configured source.
    pub fn new(
        registry: &SchemaRegistry,
        adapters: Vec<Arc<dyn SourceAdapter>>,
    ) -> Result<Self, ConfigError> {
        let mut by_id = HashMap::with_capacity(adapters.len());
        for adapter in adapters {
            let id = adapter.id().to_string();
            if registry.source(&id).is_none() {
                return Err(ConfigError::UnknownAdapter(id));
            }
            if by_id.insert(id.clone(), adapter).is_some() {
                return Err(ConfigError::DuplicateSource(id));
            }
        }

        if let Some(missing) = registry.sources().iter().find(|s| !by_id.contains_key(s.id())) {
            return Err(ConfigError::MissingAdapter(missing.id().to_string()));
        }

        Ok(Self { adapters: by_id })
    }

    pub fn get(&self, source_id: &str) -> Option<&Arc<dyn SourceAdapter>> {
        self.adapters.get(source_id)
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.adapters.keys().collect();
        ids.sort();
        f.debug_struct("AdapterSet").field("sources", &ids).finish()
    }
}

/// SQL and CRM identifiers are interpolated into requests, so only plain
/// identifiers are accepted.
pub(crate) fn validate_identifier(ident: &str) -> Result<&str, ConfigError> {
    let mut chars = ident.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(ident)
    } else {
        Err(ConfigError::InvalidIdentifier(ident.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_engine::{CanonicalField, SchemaConfig, SourceConfig};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_config(
            SchemaConfig::new()
                .with_field(CanonicalField::text("email"))
                .with_source(SourceConfig::new("a").map("email", "email"))
                .with_source(SourceConfig::new("b").map("email", "Email")),
        )
        .unwrap()
    }

    #[test]
    fn adapter_set_requires_every_source() {
        let err = AdapterSet::new(&registry(), vec![Arc::new(MemoryAdapter::new("a"))]).unwrap_err();
        assert_eq!(err, ConfigError::MissingAdapter("b".into()));
    }

    #[test]
    fn adapter_set_rejects_unknown_and_duplicate() {
        let err = AdapterSet::new(
            &registry(),
            vec![
                Arc::new(MemoryAdapter::new("a")),
                Arc::new(MemoryAdapter::new("b")),
                Arc::new(MemoryAdapter::new("c")),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::UnknownAdapter("c".into()));

        let err = AdapterSet::new(
            &registry(),
            vec![
                Arc::new(MemoryAdapter::new("a")),
                Arc::new(MemoryAdapter::new("a")),
            ],
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::DuplicateSource("a".into()));
    }

    #[test]
    fn adapter_set_binds_all() {
        let set = AdapterSet::new(
            &registry(),
            vec![
                Arc::new(MemoryAdapter::new("b")),
                Arc::new(MemoryAdapter::new("a")),
            ],
        )
        .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.get("a").unwrap().id(), "a");
        assert!(set.get("c").is_none());
    }

    #[test]
    fn identifiers() {
        assert!(validate_identifier("updated_at").is_ok());
        assert!(validate_identifier("_x1").is_ok());
        assert!(validate_identifier("Last_Name").is_ok());
        assert!(validate_identifier("1abc").is_err());
        assert!(validate_identifier("name; DROP TABLE users").is_err());
        assert!(validate_identifier("").is_err());
    }
}
