//! CRM REST adapter.
//!
//! Talks to a Zoho-style CRM module over its v2 REST API: records are found
//! with a `search` on the key field and written with `upsert` using the key
//! field as duplicate check. The CRM only exposes one modification time per
//! record, so snapshots carry record-level precision.

use super::{validate_identifier, FetchResult, SourceAdapter};
use async_trait::async_trait;
use fieldsync_engine::{
    AdapterError, CanonicalField, ConfigError, FieldSnapshot, FieldValue, NativeName, ObservedAt,
    RecordKey, SchemaRegistry, SourceId, Timestamp, TimestampPrecision,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Connection settings for the CRM module.
#[derive(Debug, Clone)]
pub struct CrmConfig {
    /// API root, e.g. `https://www.zohoapis.com`
    pub base_url: String,
    /// OAuth access token
    pub token: String,
    pub module: String,
    /// Field holding the record key
    pub key_field: String,
    /// Record-level modification time (RFC 3339)
    pub modified_field: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://www.zohoapis.com".to_string(),
            token: String::new(),
            module: "Contacts".to_string(),
            key_field: "Email".to_string(),
            modified_field: "Modified_Time".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct DataResponse {
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct UpsertResult {
    #[serde(default)]
    status: String,
    #[serde(default)]
    message: String,
}

/// Adapter for one CRM module.
#[derive(Debug, Clone)]
pub struct CrmAdapter {
    id: SourceId,
    client: reqwest::Client,
    config: CrmConfig,
    fields: HashMap<NativeName, CanonicalField>,
}

impl CrmAdapter {
    /// Create an adapter for source `id` over a shared HTTP client.
    pub fn new(
        id: impl Into<SourceId>,
        client: reqwest::Client,
        config: CrmConfig,
        registry: &SchemaRegistry,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        validate_identifier(&config.module)?;
        validate_identifier(&config.key_field)?;
        validate_identifier(&config.modified_field)?;

        let fields = registry
            .native_fields(&id)
            .into_iter()
            .map(|(field, native)| (native.to_string(), field.clone()))
            .collect();

        Ok(Self {
            id,
            client,
            config,
            fields,
        })
    }

    fn url(&self, action: &str) -> String {
        format!(
            "{}/crm/v2/{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.module,
            action
        )
    }

    fn auth_header(&self) -> String {
        format!("Zoho-oauthtoken {}", self.config.token)
    }

    /// Look the record up by key. `Ok(None)` when the CRM has no match.
    async fn find(&self, key: &RecordKey) -> Result<Option<Map<String, Value>>, AdapterError> {
        let criteria = format!("({}:equals:{})", self.config.key_field, key);
        let response = self
            .client
            .get(self.url("search"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .query(&[("criteria", criteria.as_str())])
            .send()
            .await
            .map_err(|e| AdapterError::Unavailable(format!("search failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::NO_CONTENT || status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, "search", &body));
        }

        let body: DataResponse = response
            .json()
            .await
            .map_err(|e| AdapterError::Unavailable(format!("failed to parse search response: {e}")))?;

        match body.data.into_iter().next() {
            Some(Value::Object(record)) => Ok(Some(record)),
            Some(_) => Err(AdapterError::Unavailable("search returned a non-object record".into())),
            None => Ok(None),
        }
    }

    /// Read one native field out of a CRM record.
    ///
    /// A value that does not convert to the field's type is `Malformed`,
    /// which fails this field only.
    fn snapshot(
        &self,
        record: &Map<String, Value>,
        native: &str,
    ) -> Result<FieldSnapshot, AdapterError> {
        let raw = record.get(native).unwrap_or(&Value::Null);
        let value = match self.fields.get(native) {
            Some(field) => field
                .value_from_json(raw)
                .map_err(|e| AdapterError::Malformed(format!("field '{native}': {e}")))?,
            None => None,
        };
        let modified = record
            .get(&self.config.modified_field)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(FieldSnapshot {
            value,
            observed_at: ObservedAt::Rfc3339(modified),
            precision: TimestampPrecision::Record,
        })
    }
}

/// Validation failures are the payload's fault; anything else is treated as
/// the source being unavailable.
fn status_error(status: StatusCode, action: &str, body: &str) -> AdapterError {
    let message = format!("{action} returned {status}: {body}");
    match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => AdapterError::Rejected(message),
        _ => AdapterError::Unavailable(message),
    }
}

#[async_trait]
impl SourceAdapter for CrmAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, key: &RecordKey, native: &str) -> FetchResult {
        let record = self.find(key).await?;
        record.map(|r| self.snapshot(&r, native)).transpose()
    }

    async fn fetch_batch(
        &self,
        key: &RecordKey,
        natives: &[&str],
    ) -> Vec<(NativeName, FetchResult)> {
        tracing::debug!(source = %self.id, %key, fields = natives.len(), "crm search");
        let found = self.find(key).await;
        natives
            .iter()
            .map(|native| {
                let result = match &found {
                    Ok(Some(record)) => self.snapshot(record, native).map(Some),
                    Ok(None) => Ok(None),
                    Err(e) => Err(e.clone()),
                };
                (native.to_string(), result)
            })
            .collect()
    }

    /// Upsert by key. The CRM stamps `Modified_Time` itself; the winning
    /// timestamp cannot be written back.
    async fn write(
        &self,
        key: &RecordKey,
        native: &str,
        value: &FieldValue,
        _timestamp: Timestamp,
    ) -> Result<(), AdapterError> {
        let mut record = Map::new();
        record.insert(self.config.key_field.clone(), Value::from(key.as_str()));
        record.insert(native.to_string(), value.to_json());
        let body = json!({
            "data": [record],
            "duplicate_check_fields": [self.config.key_field],
        });

        let response = self
            .client
            .post(self.url("upsert"))
            .header(reqwest::header::AUTHORIZATION, self.auth_header())
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::Unavailable(format!("upsert failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, "upsert", &body));
        }

        // Per-record failures come back with a 2xx status
        let results: Vec<UpsertResult> = response
            .json::<DataResponse>()
            .await
            .map(|r| r.data)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        if let Some(failed) = results.iter().find(|r| r.status == "error") {
            return Err(AdapterError::Rejected(failed.message.clone()));
        }

        tracing::debug!(source = %self.id, %key, field = native, "crm upsert");
        Ok(())
    }
}
