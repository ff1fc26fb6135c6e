//! Per-source field snapshots and timestamp normalization.
//!
//! Sources disagree on how they report modification times: epoch numbers,
//! RFC 3339 strings, naive SQL datetimes. A snapshot keeps the raw form as
//! reported ([`ObservedAt`]) and normalizes it to a single comparable
//! [`Timestamp`] (epoch milliseconds, UTC) only when reconciling, so a
//! malformed timestamp fails that one field rather than the whole fetch.

use crate::{error::Result, Error, FieldValue, Timestamp};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Granularity of a snapshot's timestamp.
///
/// Sources that only track a whole-record modification time report the same
/// timestamp for every field. Adapters for such sources must mark their
/// snapshots `Record`. Winners are picked the same way for both, but a
/// record-level timestamp says nothing about one field, so a record-level
/// participant that already holds the winning value is not written again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TimestampPrecision {
    #[default]
    Field,
    Record,
}

/// A modification time as reported by a source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", content = "value", rename_all = "camelCase")]
pub enum ObservedAt {
    /// Milliseconds since the Unix epoch
    EpochMillis(i64),
    /// Seconds since the Unix epoch
    EpochSeconds(i64),
    /// RFC 3339 / ISO 8601 with offset, e.g. `2024-03-01T10:00:00+01:00`
    Rfc3339(String),
    /// Datetime without offset, interpreted as UTC, e.g. `2024-03-01 09:00:00`
    Naive(String),
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

impl ObservedAt {
    /// Normalize to epoch milliseconds, UTC.
    pub fn normalize(&self) -> Result<Timestamp> {
        match self {
            ObservedAt::EpochMillis(ms) => Ok(*ms),
            ObservedAt::EpochSeconds(secs) => {
                secs.checked_mul(1000).ok_or_else(|| Error::TimestampFormat {
                    raw: secs.to_string(),
                    reason: "out of range".into(),
                })
            }
            ObservedAt::Rfc3339(raw) => DateTime::parse_from_rfc3339(raw.trim())
                .map(|dt| dt.timestamp_millis())
                .map_err(|e| Error::TimestampFormat {
                    raw: raw.clone(),
                    reason: e.to_string(),
                }),
            ObservedAt::Naive(raw) => NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(raw.trim(), fmt).ok())
                .map(|dt| dt.and_utc().timestamp_millis())
                .ok_or_else(|| Error::TimestampFormat {
                    raw: raw.clone(),
                    reason: "expected YYYY-MM-DD HH:MM:SS".into(),
                }),
        }
    }
}

impl From<Timestamp> for ObservedAt {
    fn from(ms: Timestamp) -> Self {
        ObservedAt::EpochMillis(ms)
    }
}

/// A field's value in one source, with when it was last modified there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldSnapshot {
    /// `None` when the field is unset in the source
    pub value: Option<FieldValue>,
    pub observed_at: ObservedAt,
    #[serde(default)]
    pub precision: TimestampPrecision,
}

impl FieldSnapshot {
    /// Snapshot of a present value with a field-level timestamp.
    pub fn new(value: impl Into<FieldValue>, observed_at: ObservedAt) -> Self {
        Self {
            value: Some(value.into()),
            observed_at,
            precision: TimestampPrecision::Field,
        }
    }

    /// Shorthand for a snapshot stamped in epoch milliseconds.
    pub fn at(value: impl Into<FieldValue>, ms: Timestamp) -> Self {
        Self::new(value, ObservedAt::EpochMillis(ms))
    }

    /// Snapshot of a field that is unset in the source.
    pub fn unset(observed_at: ObservedAt) -> Self {
        Self {
            value: None,
            observed_at,
            precision: TimestampPrecision::Field,
        }
    }

    /// Mark this snapshot as carrying a whole-record timestamp.
    pub fn record_level(mut self) -> Self {
        self.precision = TimestampPrecision::Record;
        self
    }

    pub fn is_present(&self) -> bool {
        self.value.is_some()
    }
}
