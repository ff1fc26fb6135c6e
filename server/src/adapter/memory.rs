//! In-memory source adapter.
//!
//! Backs tests and demos. Records live in a `DashMap`, and faults can be
//! injected per field or for the whole source.

use super::{FetchResult, SourceAdapter};
use async_trait::async_trait;
use dashmap::DashMap;
use fieldsync_engine::{
    AdapterError, FieldSnapshot, FieldValue, NativeName, ObservedAt, RecordKey, SourceId,
    Timestamp, TimestampPrecision,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct StoredRecord {
    fields: HashMap<NativeName, StoredField>,
    /// Latest modification of any field
    updated_at: Timestamp,
}

#[derive(Debug, Clone)]
struct StoredField {
    value: Option<FieldValue>,
    modified_at: Timestamp,
}

/// A source held entirely in memory.
#[derive(Debug)]
pub struct MemoryAdapter {
    id: SourceId,
    precision: TimestampPrecision,
    records: DashMap<RecordKey, StoredRecord>,
    fetch_faults: DashMap<NativeName, AdapterError>,
    write_faults: DashMap<NativeName, AdapterError>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    writes: AtomicUsize,
}

impl MemoryAdapter {
    /// A source with per-field timestamps.
    pub fn new(id: impl Into<SourceId>) -> Self {
        Self {
            id: id.into(),
            precision: TimestampPrecision::Field,
            records: DashMap::new(),
            fetch_faults: DashMap::new(),
            write_faults: DashMap::new(),
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// A source that only tracks one modification time per record.
    pub fn record_level(id: impl Into<SourceId>) -> Self {
        Self {
            precision: TimestampPrecision::Record,
            ..Self::new(id)
        }
    }

    /// Seed a field, bypassing the write counter.
    pub fn insert(
        &self,
        key: impl Into<RecordKey>,
        native: impl Into<NativeName>,
        value: Option<FieldValue>,
        modified_at: Timestamp,
    ) {
        self.store(key.into(), native.into(), value, modified_at);
    }

    /// Current value and modification time of a field, if the record has it.
    pub fn get(&self, key: &str, native: &str) -> Option<(Option<FieldValue>, Timestamp)> {
        let record = self.records.get(&RecordKey::new(key))?;
        let field = record.fields.get(native)?;
        let at = match self.precision {
            TimestampPrecision::Field => field.modified_at,
            TimestampPrecision::Record => record.updated_at,
        };
        Some((field.value.clone(), at))
    }

    /// Make every fetch of `native` fail.
    pub fn fail_fetch(&self, native: impl Into<NativeName>, err: AdapterError) {
        self.fetch_faults.insert(native.into(), err);
    }

    /// Make every write of `native` fail.
    pub fn fail_write(&self, native: impl Into<NativeName>, err: AdapterError) {
        self.write_faults.insert(native.into(), err);
    }

    /// Take the whole source offline or bring it back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn clear_faults(&self) {
        self.fetch_faults.clear();
        self.write_faults.clear();
        self.set_unavailable(false);
    }

    /// Number of acknowledged writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn store(&self, key: RecordKey, native: NativeName, value: Option<FieldValue>, at: Timestamp) {
        let mut record = self.records.entry(key).or_default();
        record.fields.insert(
            native,
            StoredField {
                value,
                modified_at: at,
            },
        );
        record.updated_at = match self.precision {
            // A record-level store stamps the whole row with the written time
            TimestampPrecision::Record => at,
            TimestampPrecision::Field => record.updated_at.max(at),
        };
    }

    async fn simulate_call(&self) -> Result<(), AdapterError> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable(format!(
                "source '{}' is offline",
                self.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for MemoryAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, key: &RecordKey, native: &str) -> FetchResult {
        self.simulate_call().await?;
        if let Some(err) = self.fetch_faults.get(native) {
            return Err(err.clone());
        }

        let Some(record) = self.records.get(key) else {
            return Ok(None);
        };

        let snapshot = match (self.precision, record.fields.get(native)) {
            (TimestampPrecision::Field, Some(field)) => FieldSnapshot {
                value: field.value.clone(),
                observed_at: ObservedAt::EpochMillis(field.modified_at),
                precision: TimestampPrecision::Field,
            },
            (TimestampPrecision::Record, Some(field)) => FieldSnapshot {
                value: field.value.clone(),
                observed_at: ObservedAt::EpochMillis(record.updated_at),
                precision: TimestampPrecision::Record,
            },
            (precision, None) => FieldSnapshot {
                value: None,
                observed_at: ObservedAt::EpochMillis(record.updated_at),
                precision,
            },
        };
        Ok(Some(snapshot))
    }

    async fn write(
        &self,
        key: &RecordKey,
        native: &str,
        value: &FieldValue,
        timestamp: Timestamp,
    ) -> Result<(), AdapterError> {
        self.simulate_call().await?;
        if let Some(err) = self.write_faults.get(native) {
            return Err(err.clone());
        }

        self.store(key.clone(), native.to_string(), Some(value.clone()), timestamp);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
