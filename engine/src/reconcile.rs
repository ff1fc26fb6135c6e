//! Field-level last-writer-wins reconciliation.
//!
//! This is the core of determinism. Given what every participating source
//! reported for one canonical field, it picks exactly one winner and the set
//! of sources that must be brought up to date.
//!
//! # Algorithm
//!
//! 1. Keep only sources that map the field, in priority order
//! 2. Drop `NotFound`, failed fetches and unset values as candidates
//! 3. Type-check values and normalize timestamps (a failure fails the field)
//! 4. Fold candidates with a strict `>` on the timestamp, so on ties the
//!    higher priority source stays the winner
//! 5. Every source whose current (value, timestamp) differs from the winner's
//!    becomes a write target; sources whose state is unknown do not. When
//!    either side only has a record-level timestamp, equal values are in
//!    sync: such a timestamp moves with every other field of the record

use crate::{
    AdapterError, CanonicalField, Failure, FailureKind, FieldName, FieldSnapshot, FieldValue,
    SchemaRegistry, SourceId, Timestamp, TimestampPrecision,
};
use serde::{Deserialize, Serialize};

/// What one source reported for one field in one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    Snapshot(FieldSnapshot),
    /// The source has no record for the key
    NotFound,
    /// The fetch call failed
    Failed(AdapterError),
}

/// An observation attributed to its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObservation {
    pub source_id: SourceId,
    pub observation: Observation,
}

impl SourceObservation {
    pub fn new(source_id: impl Into<SourceId>, observation: Observation) -> Self {
        Self {
            source_id: source_id.into(),
            observation,
        }
    }
}

/// The winning snapshot of a field, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub source_id: SourceId,
    pub value: FieldValue,
    /// Epoch milliseconds, UTC
    pub timestamp: Timestamp,
    pub precision: TimestampPrecision,
}

/// How reconciliation of one field ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum FieldOutcome {
    /// A winner was chosen; `targets` must receive it
    Resolved {
        winner: Winner,
        targets: Vec<SourceId>,
    },
    /// No source holds a value and none failed
    Empty,
    /// No usable snapshot, at least one source failed to fetch
    Unresolved,
    /// A source supplied malformed data; nothing is written for this field
    Failed { failure: Failure },
}

/// Result of reconciling one canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationResult {
    pub field: FieldName,
    pub outcome: FieldOutcome,
    /// Sources whose fetch failed for this field
    pub fetch_failures: Vec<Failure>,
}

impl ReconciliationResult {
    pub fn winner(&self) -> Option<&Winner> {
        match &self.outcome {
            FieldOutcome::Resolved { winner, .. } => Some(winner),
            _ => None,
        }
    }

    /// Sources that must receive the winner. Empty unless resolved.
    pub fn targets(&self) -> &[SourceId] {
        match &self.outcome {
            FieldOutcome::Resolved { targets, .. } => targets,
            _ => &[],
        }
    }
}

/// Current state of one participant, as far as this run knows.
enum Current<'o> {
    /// Fetch failed or data was malformed
    Unknown,
    /// No record, or the field is unset
    Missing,
    Present {
        value: &'o FieldValue,
        timestamp: Timestamp,
        precision: TimestampPrecision,
    },
}

/// Reconciles fields against a registry. Pure and synchronous.
pub struct Reconciler<'a> {
    registry: &'a SchemaRegistry,
}

impl<'a> Reconciler<'a> {
    pub fn new(registry: &'a SchemaRegistry) -> Self {
        Self { registry }
    }

    /// Reconcile one canonical field.
    ///
    /// Observations from sources that do not map the field, or that are not
    /// configured at all, are ignored. Input order does not matter: sources
    /// are visited in registry priority order.
    pub fn reconcile_field(
        &self,
        field: &CanonicalField,
        observations: &[SourceObservation],
    ) -> ReconciliationResult {
        let mut participants: Vec<(usize, &SourceObservation)> = observations
            .iter()
            .filter(|o| {
                self.registry
                    .native_name_for(&o.source_id, &field.name)
                    .is_some()
            })
            .filter_map(|o| self.registry.priority_of(&o.source_id).map(|rank| (rank, o)))
            .collect();
        participants.sort_by_key(|(rank, _)| *rank);

        let mut fetch_failures = Vec::new();
        let mut data_failure: Option<Failure> = None;
        let mut states: Vec<(&SourceId, Current<'_>)> = Vec::with_capacity(participants.len());

        for (_, obs) in participants {
            let state = match &obs.observation {
                // Unreadable data fails the field like a type mismatch
                Observation::Failed(err @ AdapterError::Malformed(_)) => {
                    data_failure.get_or_insert(Failure::fetch(&obs.source_id, err));
                    Current::Unknown
                }
                Observation::Failed(err) => {
                    fetch_failures.push(Failure::fetch(&obs.source_id, err));
                    Current::Unknown
                }
                Observation::NotFound => Current::Missing,
                Observation::Snapshot(snapshot) => match &snapshot.value {
                    None => Current::Missing,
                    Some(value) => match read_present(field, &obs.source_id, value, snapshot) {
                        Ok(timestamp) => Current::Present {
                            value,
                            timestamp,
                            precision: snapshot.precision,
                        },
                        Err(failure) => {
                            data_failure.get_or_insert(failure);
                            Current::Unknown
                        }
                    },
                },
            };
            states.push((&obs.source_id, state));
        }

        let result = |outcome, fetch_failures| ReconciliationResult {
            field: field.name.clone(),
            outcome,
            fetch_failures,
        };

        if let Some(failure) = data_failure {
            return result(FieldOutcome::Failed { failure }, fetch_failures);
        }

        let mut best: Option<(&SourceId, &FieldValue, Timestamp, TimestampPrecision)> = None;
        for (source_id, state) in &states {
            if let Current::Present {
                value,
                timestamp,
                precision,
            } = state
            {
                if best.map_or(true, |(_, _, ts, _)| *timestamp > ts) {
                    best = Some((*source_id, *value, *timestamp, *precision));
                }
            }
        }

        let Some((winner_id, winner_value, winner_ts, precision)) = best else {
            let outcome = if fetch_failures.is_empty() {
                FieldOutcome::Empty
            } else {
                FieldOutcome::Unresolved
            };
            return result(outcome, fetch_failures);
        };

        let targets = states
            .iter()
            .filter(|(_, state)| match state {
                Current::Unknown => false,
                Current::Missing => true,
                Current::Present {
                    value,
                    timestamp,
                    precision: current,
                } => {
                    *value != winner_value
                        || (*current == TimestampPrecision::Field
                            && precision == TimestampPrecision::Field
                            && *timestamp != winner_ts)
                }
            })
            .map(|(source_id, _)| source_id.to_string())
            .collect();

        let winner = Winner {
            source_id: winner_id.clone(),
            value: winner_value.clone(),
            timestamp: winner_ts,
            precision,
        };
        result(FieldOutcome::Resolved { winner, targets }, fetch_failures)
    }
}

fn read_present(
    field: &CanonicalField,
    source_id: &str,
    value: &FieldValue,
    snapshot: &FieldSnapshot,
) -> Result<Timestamp, Failure> {
    field
        .check(value)
        .map_err(|e| Failure::data(source_id, FailureKind::TypeMismatch, &e))?;
    snapshot
        .observed_at
        .normalize()
        .map_err(|e| Failure::data(source_id, FailureKind::TimestampFormat, &e))
}
