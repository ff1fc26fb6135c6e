//! Per-key sync reports.
//!
//! The report is the only artifact a sync run hands back to its caller. It
//! lists, for every canonical field, what was chosen, where it was written,
//! and every failure at (field, source) granularity so the caller can decide
//! whether to retry the key, a subset of sources, or alert.

use crate::{
    AdapterError, Error, FieldName, FieldOutcome, FieldValue, RecordKey, SourceId, SyncPlan,
    Timestamp, TimestampPrecision, WriteOp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// Transport, auth or deadline failure of one adapter call
    SourceUnavailable,
    /// A source refused a write
    Rejected,
    /// A source reported a timestamp that cannot be normalized
    TimestampFormat,
    /// A source reported a value that does not match the field's type
    TypeMismatch,
    /// No source supplied a usable snapshot
    FieldUnresolved,
}

/// Stage of the run in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Fetch,
    Reconcile,
    Write,
}

/// One failure, attributed to a source where there is one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    pub kind: FailureKind,
    pub phase: Phase,
    pub message: String,
}

impl Failure {
    /// A fetch call to a source failed.
    pub fn fetch(source_id: &str, err: &AdapterError) -> Self {
        Self {
            source_id: Some(source_id.to_string()),
            kind: err.kind(),
            phase: Phase::Fetch,
            message: err.to_string(),
        }
    }

    /// A write call to a source failed.
    pub fn write(source_id: &str, err: &AdapterError) -> Self {
        Self {
            source_id: Some(source_id.to_string()),
            kind: err.kind(),
            phase: Phase::Write,
            message: err.to_string(),
        }
    }

    /// A source supplied data the engine could not interpret.
    pub fn data(source_id: &str, kind: FailureKind, err: &Error) -> Self {
        Self {
            source_id: Some(source_id.to_string()),
            kind,
            phase: Phase::Reconcile,
            message: err.to_string(),
        }
    }

    /// No participating source supplied a usable snapshot.
    pub fn unresolved(field: &str) -> Self {
        Self {
            source_id: None,
            kind: FailureKind::FieldUnresolved,
            phase: Phase::Reconcile,
            message: format!("no source supplied a usable snapshot for '{}'", field),
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind == FailureKind::SourceUnavailable
    }
}

impl AdapterError {
    pub fn kind(&self) -> FailureKind {
        match self {
            AdapterError::Unavailable(_) | AdapterError::Timeout(_) => {
                FailureKind::SourceUnavailable
            }
            AdapterError::Rejected(_) => FailureKind::Rejected,
            AdapterError::Malformed(_) => FailureKind::TypeMismatch,
        }
    }
}

/// Summary state of one field after a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldStatus {
    /// Every participating source already held the winner
    InSync,
    /// The winner was written to every target
    Updated,
    /// At least one write failed
    Partial,
    /// No source has a value and none failed; nothing to do
    Empty,
    /// No usable snapshot because sources failed
    Unresolved,
    /// A source supplied malformed data for this field
    Failed,
}

/// Report for one canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReport {
    pub field: FieldName,
    pub status: FieldStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<SourceId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<TimestampPrecision>,
    /// Sources that acknowledged the write
    pub written: Vec<SourceId>,
    pub failures: Vec<Failure>,
}

/// Report for one sync run of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub run_id: String,
    pub key: RecordKey,
    pub fields: Vec<FieldReport>,
}

impl SyncReport {
    /// Start a report from a plan, before any write has been applied.
    pub fn from_plan(run_id: impl Into<String>, plan: &SyncPlan) -> Self {
        let fields = plan
            .fields
            .iter()
            .map(|result| {
                let mut report = FieldReport {
                    field: result.field.clone(),
                    status: FieldStatus::Empty,
                    value: None,
                    timestamp: None,
                    winner: None,
                    precision: None,
                    written: Vec::new(),
                    failures: result.fetch_failures.clone(),
                };

                match &result.outcome {
                    FieldOutcome::Resolved { winner, targets } => {
                        report.status = if targets.is_empty() {
                            FieldStatus::InSync
                        } else {
                            FieldStatus::Updated
                        };
                        report.value = Some(winner.value.clone());
                        report.timestamp = Some(winner.timestamp);
                        report.winner = Some(winner.source_id.clone());
                        report.precision = Some(winner.precision);
                    }
                    FieldOutcome::Empty => {}
                    FieldOutcome::Unresolved => {
                        report.status = FieldStatus::Unresolved;
                        report.failures.push(Failure::unresolved(&result.field));
                    }
                    FieldOutcome::Failed { failure } => {
                        report.status = FieldStatus::Failed;
                        report.failures.push(failure.clone());
                    }
                }
                report
            })
            .collect();

        Self {
            run_id: run_id.into(),
            key: plan.key.clone(),
            fields,
        }
    }

    /// Record the outcome of one write.
    pub fn record_write(&mut self, op: &WriteOp, outcome: Result<(), AdapterError>) {
        let Some(report) = self.fields.iter_mut().find(|f| f.field == op.field) else {
            return;
        };
        match outcome {
            Ok(()) => report.written.push(op.source_id.clone()),
            Err(err) => {
                report.failures.push(Failure::write(&op.source_id, &err));
                report.status = FieldStatus::Partial;
            }
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldReport> {
        self.fields.iter().find(|f| f.field == name)
    }

    /// Every failure in the run, with the field it belongs to.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &Failure)> {
        self.fields
            .iter()
            .flat_map(|f| f.failures.iter().map(move |failure| (f.field.as_str(), failure)))
    }

    /// True when the run recorded no failure of any kind.
    pub fn is_clean(&self) -> bool {
        self.fields.iter().all(|f| f.failures.is_empty())
    }

    /// Number of acknowledged writes.
    pub fn written_count(&self) -> usize {
        self.fields.iter().map(|f| f.written.len()).sum()
    }

    /// Sources with at least one transient failure, worth retrying later.
    pub fn sources_to_retry(&self) -> BTreeSet<&str> {
        self.failures()
            .filter(|(_, failure)| failure.is_transient())
            .filter_map(|(_, failure)| failure.source_id.as_deref())
            .collect()
    }
}
