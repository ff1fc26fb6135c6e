//! Postgres source adapter.
//!
//! One row per key in a single table. The table tracks one `updated_at`
//! (timestamptz) per row, so snapshots from this source carry
//! record-level precision.

use super::{validate_identifier, FetchResult, SourceAdapter};
use async_trait::async_trait;
use fieldsync_engine::{
    AdapterError, CanonicalField, ConfigError, FieldSnapshot, FieldType, FieldValue, NativeName,
    ObservedAt, RecordKey, SchemaRegistry, SourceId, Timestamp, TimestampPrecision,
};
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::query::Query;
use sqlx::{PgPool, Postgres, Row};
use std::collections::HashMap;

/// Location of the synced records.
#[derive(Debug, Clone)]
pub struct PgTable {
    pub table: String,
    pub key_column: String,
    pub updated_at_column: String,
}

impl Default for PgTable {
    fn default() -> Self {
        Self {
            table: "users".to_string(),
            key_column: "email".to_string(),
            updated_at_column: "updated_at".to_string(),
        }
    }
}

/// Adapter for a Postgres table.
#[derive(Debug, Clone)]
pub struct PgAdapter {
    id: SourceId,
    pool: PgPool,
    table: PgTable,
    /// Mapped columns and their canonical field
    columns: HashMap<NativeName, CanonicalField>,
}

impl PgAdapter {
    /// Create an adapter for source `id` over an externally owned pool.
    ///
    /// Every identifier (table, key, timestamp and mapped columns) is
    /// validated here, since they end up interpolated into SQL.
    pub fn new(
        id: impl Into<SourceId>,
        pool: PgPool,
        table: PgTable,
        registry: &SchemaRegistry,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        validate_identifier(&table.table)?;
        validate_identifier(&table.key_column)?;
        validate_identifier(&table.updated_at_column)?;

        let mut columns = HashMap::new();
        for (field, native) in registry.native_fields(&id) {
            validate_identifier(native)?;
            columns.insert(native.to_string(), field.clone());
        }

        Ok(Self {
            id,
            pool,
            table,
            columns,
        })
    }

    fn column(&self, native: &str) -> Result<&CanonicalField, AdapterError> {
        self.columns
            .get(native)
            .ok_or_else(|| AdapterError::Rejected(format!("column '{}' is not mapped", native)))
    }

    fn select_sql(&self, natives: &[&str]) -> String {
        let mut exprs: Vec<String> = natives
            .iter()
            .enumerate()
            .filter_map(|(i, native)| {
                let field = self.columns.get(*native)?;
                Some(format!("{} AS c{}", select_expr(native, &field.field_type), i))
            })
            .collect();
        exprs.push(format!(
            "COALESCE(to_char(\"{}\" AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS.MS'), '') AS row_updated_at",
            self.table.updated_at_column
        ));

        format!(
            "SELECT {} FROM \"{}\" WHERE \"{}\" = $1 LIMIT 1",
            exprs.join(", "),
            self.table.table,
            self.table.key_column
        )
    }

    fn read_column(
        &self,
        row: &PgRow,
        index: usize,
        native: &str,
    ) -> Result<Option<FieldValue>, AdapterError> {
        let field = self.column(native)?;
        let column = format!("c{}", index);
        let decode = |e: sqlx::Error| {
            AdapterError::Unavailable(format!("cannot decode column '{}': {}", native, e))
        };

        let value = match &field.field_type {
            FieldType::Text => row
                .try_get::<Option<String>, _>(column.as_str())
                .map_err(decode)?
                .map(FieldValue::Text),
            FieldType::Enum(_) => row
                .try_get::<Option<String>, _>(column.as_str())
                .map_err(decode)?
                .map(FieldValue::Enum),
            FieldType::Integer => row
                .try_get::<Option<i64>, _>(column.as_str())
                .map_err(decode)?
                .map(FieldValue::Integer),
            FieldType::Bool => row
                .try_get::<Option<bool>, _>(column.as_str())
                .map_err(decode)?
                .map(FieldValue::Bool),
            FieldType::Date => row
                .try_get::<Option<chrono::NaiveDate>, _>(column.as_str())
                .map_err(decode)?
                .map(FieldValue::Date),
            FieldType::Binary => row
                .try_get::<Option<Vec<u8>>, _>(column.as_str())
                .map_err(decode)?
                .map(FieldValue::Binary),
            FieldType::List => row
                .try_get::<Option<Vec<String>>, _>(column.as_str())
                .map_err(decode)?
                .map(FieldValue::List),
        };
        Ok(value)
    }
}

/// Cast each column to the Postgres type its canonical field decodes from.
fn select_expr(native: &str, field_type: &FieldType) -> String {
    let cast = match field_type {
        FieldType::Text | FieldType::Enum(_) => "text",
        FieldType::Integer => "bigint",
        FieldType::Bool => "boolean",
        FieldType::Date => "date",
        FieldType::Binary => "bytea",
        FieldType::List => "text[]",
    };
    format!("\"{}\"::{}", native, cast)
}

fn bind_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &FieldValue,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        FieldValue::Text(s) | FieldValue::Enum(s) => query.bind(s.clone()),
        FieldValue::Integer(i) => query.bind(*i),
        FieldValue::Bool(b) => query.bind(*b),
        FieldValue::Date(d) => query.bind(*d),
        FieldValue::Binary(bytes) => query.bind(bytes.clone()),
        FieldValue::List(items) => query.bind(items.clone()),
    }
}

/// Constraint and data errors are the row's fault; everything else is the
/// connection's.
fn classify(err: sqlx::Error) -> AdapterError {
    match &err {
        sqlx::Error::Database(db) => {
            let class: Option<String> = db.code().map(|c| c.chars().take(2).collect());
            match class.as_deref() {
                Some("22") | Some("23") => AdapterError::Rejected(db.message().to_string()),
                _ => AdapterError::Unavailable(err.to_string()),
            }
        }
        _ => AdapterError::Unavailable(err.to_string()),
    }
}

#[async_trait]
impl SourceAdapter for PgAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, key: &RecordKey, native: &str) -> FetchResult {
        let mut batch = self.fetch_batch(key, &[native]).await;
        match batch.pop() {
            Some((_, result)) => result,
            None => Err(AdapterError::Unavailable("empty batch result".into())),
        }
    }

    async fn fetch_batch(
        &self,
        key: &RecordKey,
        natives: &[&str],
    ) -> Vec<(NativeName, FetchResult)> {
        let sql = self.select_sql(natives);
        tracing::debug!(source = %self.id, %key, columns = natives.len(), "postgres select");

        let row = match sqlx::query(&sql)
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
        {
            Ok(row) => row,
            Err(e) => {
                let err = classify(e);
                return natives
                    .iter()
                    .map(|native| (native.to_string(), Err(err.clone())))
                    .collect();
            }
        };

        let Some(row) = row else {
            return natives.iter().map(|native| (native.to_string(), Ok(None))).collect();
        };

        let updated_at: String = match row.try_get("row_updated_at") {
            Ok(raw) => raw,
            Err(e) => {
                let err = AdapterError::Unavailable(format!("cannot decode timestamp: {}", e));
                return natives
                    .iter()
                    .map(|native| (native.to_string(), Err(err.clone())))
                    .collect();
            }
        };

        natives
            .iter()
            .enumerate()
            .map(|(i, native)| {
                let result = self.read_column(&row, i, native).map(|value| {
                    Some(
                        FieldSnapshot {
                            value,
                            observed_at: ObservedAt::Naive(updated_at.clone()),
                            precision: TimestampPrecision::Field,
                        }
                        .record_level(),
                    )
                });
                (native.to_string(), result)
            })
            .collect()
    }

    async fn write(
        &self,
        key: &RecordKey,
        native: &str,
        value: &FieldValue,
        timestamp: Timestamp,
    ) -> Result<(), AdapterError> {
        let field = self.column(native)?;
        field
            .check(value)
            .map_err(|e| AdapterError::Rejected(e.to_string()))?;

        let t = &self.table;
        let sql = format!(
            "INSERT INTO \"{table}\" (\"{key}\", \"{col}\", \"{ts}\") \
             VALUES ($1, $2, to_timestamp($3::double precision / 1000.0)) \
             ON CONFLICT (\"{key}\") DO UPDATE SET \"{col}\" = EXCLUDED.\"{col}\", \"{ts}\" = EXCLUDED.\"{ts}\"",
            table = t.table,
            key = t.key_column,
            col = native,
            ts = t.updated_at_column,
        );

        let query = sqlx::query(&sql).bind(key.as_str());
        bind_value(query, value)
            .bind(timestamp as f64)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        tracing::debug!(source = %self.id, %key, column = native, "postgres upsert");
        Ok(())
    }
}
