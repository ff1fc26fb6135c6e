//! Integration tests for sync runs against in-memory sources.

use fieldsync_engine::{
    AdapterError, CanonicalField, FailureKind, FieldOutcome, FieldStatus, FieldType, FieldValue,
    Phase, RecordKey, SchemaConfig, SchemaRegistry, SourceConfig, TimestampPrecision,
};
use fieldsync_server::adapter::{AdapterSet, MemoryAdapter, SourceAdapter};
use fieldsync_server::sync::{SyncOptions, Synchronizer};
use std::sync::Arc;
use std::time::Duration;

const KEY: &str = "alice@example.com";

fn registry() -> Arc<SchemaRegistry> {
    let language = FieldType::Enum(vec!["en".into(), "de".into()]);
    Arc::new(
        SchemaRegistry::from_config(
            SchemaConfig::new()
                .with_field(CanonicalField::text("email"))
                .with_field(CanonicalField::text("name"))
                .with_field(CanonicalField::new("language", language))
                .with_field(CanonicalField::text("comment"))
                .with_source(
                    SourceConfig::new("mysql")
                        .map("email", "email")
                        .map("name", "name")
                        .map("language", "language")
                        .map("comment", "comment"),
                )
                .with_source(
                    SourceConfig::new("zoho")
                        .map("email", "Email")
                        .map("name", "Last_Name")
                        .map("language", "Language")
                        .map("comment", "Description"),
                ),
        )
        .unwrap(),
    )
}

struct Harness {
    mysql: Arc<MemoryAdapter>,
    zoho: Arc<MemoryAdapter>,
    sync: Synchronizer,
}

fn harness_with(mysql: MemoryAdapter, zoho: MemoryAdapter, options: SyncOptions) -> Harness {
    let mysql = Arc::new(mysql);
    let zoho = Arc::new(zoho);
    let registry = registry();
    let adapters = AdapterSet::new(
        &registry,
        vec![
            mysql.clone() as Arc<dyn SourceAdapter>,
            zoho.clone() as Arc<dyn SourceAdapter>,
        ],
    )
    .unwrap();
    Harness {
        mysql,
        zoho,
        sync: Synchronizer::new(registry, adapters, options),
    }
}

fn harness() -> Harness {
    harness_with(
        MemoryAdapter::new("mysql"),
        MemoryAdapter::new("zoho"),
        SyncOptions::default(),
    )
}

/// The four reference scenarios on one record.
fn seed_scenarios(h: &Harness) {
    // name: equal timestamps, mysql is declared first
    h.mysql.insert(KEY, "name", Some("Alice".into()), 100);
    h.zoho.insert(KEY, "Last_Name", Some("Alicia".into()), 100);
    // language: only zoho has it
    h.zoho
        .insert(KEY, "Language", Some(FieldValue::Enum("en".into())), 120);
    // email: same value, mysql is newer
    h.mysql.insert(KEY, "email", Some(KEY.into()), 200);
    h.zoho.insert(KEY, "Email", Some(KEY.into()), 150);
    // comment: both sources fail
    let down = AdapterError::Unavailable("connection reset".into());
    h.mysql.fail_fetch("comment", down.clone());
    h.zoho.fail_fetch("Description", down);
}

#[tokio::test]
async fn test_reference_scenarios() {
    let h = harness();
    seed_scenarios(&h);

    let report = h.sync.sync(&RecordKey::new(KEY)).await;

    let name = report.field("name").unwrap();
    assert_eq!(name.value, Some(FieldValue::from("Alice")));
    assert_eq!(name.winner.as_deref(), Some("mysql"));
    assert_eq!(name.written, vec!["zoho".to_string()]);
    assert_eq!(
        h.zoho.get(KEY, "Last_Name"),
        Some((Some("Alice".into()), 100))
    );

    let language = report.field("language").unwrap();
    assert_eq!(language.value, Some(FieldValue::Enum("en".into())));
    assert_eq!(language.written, vec!["mysql".to_string()]);
    assert_eq!(
        h.mysql.get(KEY, "language"),
        Some((Some(FieldValue::Enum("en".into())), 120))
    );

    let email = report.field("email").unwrap();
    assert_eq!(email.timestamp, Some(200));
    assert_eq!(email.written, vec!["zoho".to_string()]);
    assert_eq!(h.zoho.get(KEY, "Email"), Some((Some(KEY.into()), 200)));

    let comment = report.field("comment").unwrap();
    assert_eq!(comment.status, FieldStatus::Unresolved);
    assert!(comment.written.is_empty());
    assert!(comment
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::FieldUnresolved));

    assert_eq!(h.mysql.write_count(), 1);
    assert_eq!(h.zoho.write_count(), 2);
}

#[tokio::test]
async fn test_second_run_writes_nothing() {
    let h = harness();
    seed_scenarios(&h);
    let key = RecordKey::new(KEY);

    let first = h.sync.sync(&key).await;
    assert_eq!(first.written_count(), 3);

    let second = h.sync.sync(&key).await;
    assert_eq!(second.written_count(), 0);
    for field in ["email", "name", "language"] {
        assert_eq!(second.field(field).unwrap().status, FieldStatus::InSync);
    }
    assert_eq!(h.mysql.write_count() + h.zoho.write_count(), 3);
}

#[tokio::test]
async fn test_plan_is_a_dry_run() {
    let h = harness();
    seed_scenarios(&h);

    let plan = h.sync.plan(&RecordKey::new(KEY)).await;

    assert_eq!(plan.writes.len(), 3);
    assert!(matches!(
        plan.field("comment").unwrap().outcome,
        FieldOutcome::Unresolved
    ));
    assert_eq!(h.mysql.write_count() + h.zoho.write_count(), 0);
}

#[tokio::test]
async fn test_unknown_key_everywhere_is_empty() {
    let h = harness();
    let report = h.sync.sync(&RecordKey::new("nobody@example.com")).await;

    assert!(report.is_clean());
    assert!(report
        .fields
        .iter()
        .all(|f| f.status == FieldStatus::Empty));
}

#[tokio::test]
async fn test_unavailable_source_only_affects_its_fields() {
    let h = harness();
    h.mysql.insert(KEY, "name", Some("Alice".into()), 300);
    h.mysql.insert(KEY, "comment", Some("vip".into()), 300);
    h.zoho.set_unavailable(true);

    let report = h.sync.sync(&RecordKey::new(KEY)).await;

    let name = report.field("name").unwrap();
    assert_eq!(name.status, FieldStatus::InSync);
    assert_eq!(name.value, Some(FieldValue::from("Alice")));
    assert_eq!(name.failures[0].phase, Phase::Fetch);
    assert_eq!(h.zoho.write_count(), 0);

    let retry: Vec<_> = report.sources_to_retry().into_iter().collect();
    assert_eq!(retry, vec!["zoho"]);
}

#[tokio::test]
async fn test_slow_source_times_out() {
    let zoho = MemoryAdapter::new("zoho");
    zoho.set_latency(Duration::from_millis(500));
    let h = harness_with(
        MemoryAdapter::new("mysql"),
        zoho,
        SyncOptions {
            call_timeout: Duration::from_millis(50),
            concurrency: 1,
        },
    );
    h.mysql.insert(KEY, "name", Some("Alice".into()), 100);

    let report = h.sync.sync(&RecordKey::new(KEY)).await;

    let name = report.field("name").unwrap();
    assert_eq!(name.winner.as_deref(), Some("mysql"));
    assert!(name.written.is_empty());
    assert_eq!(name.failures[0].kind, FailureKind::SourceUnavailable);
    assert!(name.failures[0].message.contains("timed out"));
}

#[tokio::test]
async fn test_failed_write_does_not_stop_others() {
    let h = harness();
    h.mysql.insert(KEY, "name", Some("Alice".into()), 300);
    h.mysql.insert(KEY, "comment", Some("vip".into()), 300);
    h.zoho
        .fail_write("Last_Name", AdapterError::Rejected("too long".into()));

    let report = h.sync.sync(&RecordKey::new(KEY)).await;

    let name = report.field("name").unwrap();
    assert_eq!(name.status, FieldStatus::Partial);
    assert_eq!(name.failures[0].kind, FailureKind::Rejected);
    assert_eq!(name.failures[0].phase, Phase::Write);

    let comment = report.field("comment").unwrap();
    assert_eq!(comment.status, FieldStatus::Updated);
    assert_eq!(h.zoho.get(KEY, "Description"), Some((Some("vip".into()), 300)));
}

#[tokio::test]
async fn test_type_mismatch_fails_only_that_field() {
    let h = harness();
    h.mysql
        .insert(KEY, "language", Some(FieldValue::Enum("xx".into())), 500);
    h.mysql.insert(KEY, "name", Some("Alice".into()), 100);

    let report = h.sync.sync(&RecordKey::new(KEY)).await;

    let language = report.field("language").unwrap();
    assert_eq!(language.status, FieldStatus::Failed);
    assert_eq!(language.failures[0].kind, FailureKind::TypeMismatch);
    assert_eq!(h.zoho.get(KEY, "Language"), None);

    assert_eq!(report.field("name").unwrap().status, FieldStatus::Updated);
}

#[tokio::test]
async fn test_record_level_precision_is_reported() {
    let h = harness_with(
        MemoryAdapter::record_level("mysql"),
        MemoryAdapter::new("zoho"),
        SyncOptions::default(),
    );
    h.mysql.insert(KEY, "email", Some(KEY.into()), 100);
    h.mysql.insert(KEY, "name", Some("Alice".into()), 400);
    h.zoho.insert(KEY, "Email", Some(KEY.into()), 300);

    let report = h.sync.sync(&RecordKey::new(KEY)).await;

    // The row timestamp applies to every mysql field, so mysql wins email too
    let email = report.field("email").unwrap();
    assert_eq!(email.winner.as_deref(), Some("mysql"));
    assert_eq!(email.timestamp, Some(400));
    assert_eq!(email.precision, Some(TimestampPrecision::Record));
}

#[tokio::test]
async fn test_record_level_target_settles_after_one_run() {
    let h = harness_with(
        MemoryAdapter::new("mysql"),
        MemoryAdapter::record_level("zoho"),
        SyncOptions::default(),
    );
    h.mysql.insert(KEY, "name", Some("Alice".into()), 300);
    h.mysql.insert(KEY, "email", Some(KEY.into()), 200);
    let key = RecordKey::new(KEY);

    let first = h.sync.sync(&key).await;
    assert_eq!(first.written_count(), 2);

    // zoho's row now carries whichever write landed last
    for run in 0..3 {
        let again = h.sync.sync(&key).await;
        assert_eq!(again.written_count(), 0, "run {} wrote", run + 2);
        assert_eq!(again.field("name").unwrap().status, FieldStatus::InSync);
        assert_eq!(again.field("email").unwrap().status, FieldStatus::InSync);
    }
    assert_eq!(h.zoho.write_count(), 2);
    assert_eq!(h.mysql.write_count(), 0);
}

#[tokio::test]
async fn test_record_level_store_with_stale_value_is_updated() {
    let h = harness_with(
        MemoryAdapter::record_level("mysql"),
        MemoryAdapter::new("zoho"),
        SyncOptions::default(),
    );
    h.mysql.insert(KEY, "name", Some("Alice".into()), 100);
    h.mysql.insert(KEY, "email", Some(KEY.into()), 100);
    h.zoho.insert(KEY, "Last_Name", Some("Alicia".into()), 300);
    h.zoho.insert(KEY, "Email", Some(KEY.into()), 200);
    let key = RecordKey::new(KEY);

    let first = h.sync.sync(&key).await;
    let name = first.field("name").unwrap();
    assert_eq!(name.winner.as_deref(), Some("zoho"));
    assert_eq!(name.written, vec!["mysql".to_string()]);
    // Same email everywhere; mysql's row time says nothing about the field
    assert!(first.field("email").unwrap().written.is_empty());

    // mysql's row is now stamped 300, newer than zoho's email
    let second = h.sync.sync(&key).await;
    assert_eq!(second.written_count(), 0);
    assert_eq!(second.field("email").unwrap().winner.as_deref(), Some("mysql"));
    assert_eq!(h.mysql.get(KEY, "name"), Some((Some("Alicia".into()), 300)));
}

#[tokio::test]
async fn test_sync_many_keeps_keys_independent() {
    let h = harness();
    h.mysql.insert("a@example.com", "name", Some("Ann".into()), 10);
    h.zoho.insert("b@example.com", "Last_Name", Some("Bob".into()), 10);
    h.zoho.insert("c@example.com", "Last_Name", Some("Cy".into()), 10);
    h.mysql
        .fail_write("name", AdapterError::Rejected("read-only".into()));

    let keys = ["a@example.com", "b@example.com", "c@example.com"]
        .into_iter()
        .map(RecordKey::new)
        .collect();
    let reports = h.sync.sync_many(keys).await;

    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].key.as_str(), "a@example.com");
    assert_eq!(reports[1].key.as_str(), "b@example.com");
    assert_eq!(reports[2].key.as_str(), "c@example.com");

    assert_eq!(reports[0].field("name").unwrap().status, FieldStatus::Updated);
    assert_eq!(reports[1].field("name").unwrap().status, FieldStatus::Partial);
    assert_eq!(reports[2].field("name").unwrap().status, FieldStatus::Partial);
    assert_eq!(h.zoho.get("a@example.com", "Last_Name"), Some((Some("Ann".into()), 10)));

    let run_ids: std::collections::HashSet<_> = reports.iter().map(|r| &r.run_id).collect();
    assert_eq!(run_ids.len(), 3);
}

#[test]
fn test_shipped_schema_loads() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/contacts.schema.json");
    let registry = fieldsync_server::load_registry(path).unwrap();

    assert_eq!(registry.canonical_fields().len(), 19);
    assert_eq!(registry.sources()[0].id(), "postgres");
    assert_eq!(registry.native_name_for("zoho", "name"), Some("Last_Name"));
    assert!(registry.native_name_for("zoho", "photo").is_none());
}
