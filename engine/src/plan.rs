//! Sync plans.
//!
//! A plan is built in one synchronous step from everything fetched for a
//! key. Building never starts before every fetch has completed or failed,
//! which is what keeps decisions for a key from interleaving with I/O.

use crate::{
    AdapterError, FieldOutcome, NativeName, Observation, RecordKey, ReconciliationResult,
    Reconciler, SchemaRegistry, SourceId, SourceObservation, WriteOp,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Everything fetched for one key, by source and native field name.
#[derive(Debug, Clone, Default)]
pub struct FetchSet {
    by_source: HashMap<SourceId, HashMap<NativeName, Observation>>,
}

impl FetchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record what a source reported for one of its native fields.
    pub fn record(
        &mut self,
        source_id: impl Into<SourceId>,
        native: impl Into<NativeName>,
        observation: Observation,
    ) {
        self.by_source
            .entry(source_id.into())
            .or_default()
            .insert(native.into(), observation);
    }

    /// Record the same failure for every listed native field of a source.
    pub fn fail_all<'n>(
        &mut self,
        source_id: &str,
        natives: impl IntoIterator<Item = &'n str>,
        err: &AdapterError,
    ) {
        for native in natives {
            self.record(source_id, native, Observation::Failed(err.clone()));
        }
    }

    pub fn get(&self, source_id: &str, native: &str) -> Option<&Observation> {
        self.by_source.get(source_id)?.get(native)
    }
}

/// The reconciliation of every canonical field for one key, plus the writes
/// needed to converge all sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPlan {
    pub key: RecordKey,
    /// One result per canonical field, in catalog order
    pub fields: Vec<ReconciliationResult>,
    /// Writes in catalog order, then source priority order
    pub writes: Vec<WriteOp>,
}

impl SyncPlan {
    /// Reconcile every canonical field from a completed fetch.
    ///
    /// A participant with no recorded observation is treated as a failed
    /// fetch: its state is unknown, so it neither competes nor receives a
    /// write.
    pub fn build(registry: &SchemaRegistry, key: RecordKey, fetched: &FetchSet) -> Self {
        let reconciler = Reconciler::new(registry);
        let mut fields = Vec::with_capacity(registry.canonical_fields().len());
        let mut writes = Vec::new();

        for field in registry.canonical_fields() {
            let observations: Vec<SourceObservation> = registry
                .participants(&field.name)
                .filter_map(|source| {
                    let native = source.native_name(&field.name)?;
                    let observation = fetched.get(source.id(), native).cloned().unwrap_or_else(|| {
                        Observation::Failed(AdapterError::Unavailable(
                            "no observation recorded".into(),
                        ))
                    });
                    Some(SourceObservation::new(source.id(), observation))
                })
                .collect();

            let result = reconciler.reconcile_field(field, &observations);

            if let FieldOutcome::Resolved { winner, targets } = &result.outcome {
                for target in targets {
                    if let Some(native) = registry.native_name_for(target, &field.name) {
                        writes.push(WriteOp::new(
                            &field.name,
                            target,
                            native,
                            winner.value.clone(),
                            winner.timestamp,
                        ));
                    }
                }
            }
            fields.push(result);
        }

        Self {
            key,
            fields,
            writes,
        }
    }

    pub fn field(&self, name: &str) -> Option<&ReconciliationResult> {
        self.fields.iter().find(|f| f.field == name)
    }

    /// True when no source needs a write.
    pub fn is_converged(&self) -> bool {
        self.writes.is_empty()
    }

    /// Planned writes for one source.
    pub fn writes_for<'a>(&'a self, source_id: &'a str) -> impl Iterator<Item = &'a WriteOp> {
        self.writes.iter().filter(move |w| w.source_id == source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CanonicalField, FieldSnapshot, FieldValue, SchemaConfig, SourceConfig};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::from_config(
            SchemaConfig::new()
                .with_field(CanonicalField::text("email"))
                .with_field(CanonicalField::text("name"))
                .with_field(CanonicalField::text("comment"))
                .with_source(
                    SourceConfig::new("mysql")
                        .map("email", "email")
                        .map("name", "name"),
                )
                .with_source(
                    SourceConfig::new("zoho")
                        .map("email", "Email")
                        .map("name", "Last_Name")
                        .map("comment", "Description"),
                ),
        )
        .unwrap()
    }

    fn snapshot(value: &str, ts: i64) -> Observation {
        Observation::Snapshot(FieldSnapshot::at(value, ts))
    }

    #[test]
    fn build_translates_targets_to_native_names() {
        let registry = registry();
        let mut fetched = FetchSet::new();
        fetched.record("mysql", "email", snapshot("x@y.com", 100));
        fetched.record("mysql", "name", snapshot("Alice", 300));
        fetched.record("zoho", "Email", snapshot("x@y.com", 100));
        fetched.record("zoho", "Last_Name", snapshot("Alicia", 200));
        fetched.record("zoho", "Description", snapshot("vip", 200));

        let plan = SyncPlan::build(&registry, RecordKey::new("x@y.com"), &fetched);

        assert_eq!(plan.fields.len(), 3);
        assert_eq!(
            plan.writes,
            vec![WriteOp::new(
                "name",
                "zoho",
                "Last_Name",
                FieldValue::from("Alice"),
                300
            )]
        );
        // mysql does not map comment, so it is never a target
        assert!(plan.writes_for("mysql").next().is_none());
        assert!(plan.field("comment").unwrap().targets().is_empty());
    }

    #[test]
    fn missing_observation_counts_as_failed_fetch() {
        let registry = registry();
        let mut fetched = FetchSet::new();
        fetched.record("zoho", "Email", snapshot("x@y.com", 100));

        let plan = SyncPlan::build(&registry, RecordKey::new("x@y.com"), &fetched);

        let email = plan.field("email").unwrap();
        assert!(email.targets().is_empty());
        assert_eq!(email.fetch_failures.len(), 1);
        assert_eq!(plan.field("name").unwrap().outcome, FieldOutcome::Unresolved);
    }

    #[test]
    fn fail_all_isolates_one_source() {
        let registry = registry();
        let mut fetched = FetchSet::new();
        fetched.fail_all(
            "mysql",
            ["email", "name"],
            &AdapterError::Unavailable("connection refused".into()),
        );
        fetched.record("zoho", "Email", snapshot("x@y.com", 100));
        fetched.record("zoho", "Last_Name", snapshot("Alicia", 200));
        fetched.record("zoho", "Description", snapshot("vip", 200));

        let plan = SyncPlan::build(&registry, RecordKey::new("x@y.com"), &fetched);

        assert!(plan.is_converged());
        assert_eq!(
            plan.field("comment").unwrap().winner().unwrap().value,
            FieldValue::from("vip")
        );
        assert_eq!(
            plan.field("name").unwrap().winner().unwrap().source_id,
            "zoho"
        );
    }

    #[test]
    fn serialization_format() {
        let registry = registry();
        let mut fetched = FetchSet::new();
        fetched.record("mysql", "email", snapshot("x@y.com", 100));
        fetched.record("zoho", "Email", Observation::NotFound);
        let plan = SyncPlan::build(&registry, RecordKey::new("x@y.com"), &fetched);

        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["fields"][0]["outcome"]["status"], "resolved");
        assert_eq!(json["fields"][2]["outcome"]["status"], "unresolved");
        assert_eq!(json["writes"][0]["sourceId"], "zoho");
    }
}
