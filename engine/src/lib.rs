//! # fieldsync engine
//!
//! Field-level, timestamp-ordered reconciliation for one logical record that
//! lives in several independently mutable stores with different schemas.
//!
//! This crate is the pure core of fieldsync. It maps source schemas onto a
//! canonical schema, resolves every field with a deterministic
//! last-writer-wins rule, and computes the minimal set of writes that brings
//! every store up to date.
//!
//! ## Design Principles
//!
//! - **No IO**: the engine never talks to a store; adapters do
//! - **Deterministic**: same observations, same plan; ties go to the
//!   source declared first
//! - **Per-field isolation**: a bad source or a bad value affects only the
//!   fields it touches
//!
//! ## Core Concepts
//!
//! ### Schema
//!
//! The [`SchemaRegistry`] holds the ordered catalog of [`CanonicalField`]s
//! and a bidirectional name mapping per source. A source that does not map a
//! field does not participate in syncing it.
//!
//! ### Snapshots
//!
//! A [`FieldSnapshot`] is a value as one source holds it, with the raw
//! [`ObservedAt`] modification time. Timestamps are normalized to epoch
//! milliseconds (UTC) before comparison.
//!
//! ### Reconciliation
//!
//! The [`Reconciler`] picks one winner per field. [`SyncPlan::build`] runs it
//! over every field and derives the [`WriteOp`]s; a [`SyncReport`] records
//! how those writes went.
//!
//! ## Quick Start
//!
//! ```rust
//! use fieldsync_engine::{
//!     CanonicalField, FetchSet, FieldSnapshot, FieldValue, Observation, RecordKey,
//!     SchemaConfig, SchemaRegistry, SourceConfig, SyncPlan,
//! };
//!
//! // 1. Define the catalog and how each source names it
//! let registry = SchemaRegistry::from_config(
//!     SchemaConfig::new()
//!         .with_field(CanonicalField::text("email"))
//!         .with_field(CanonicalField::text("name"))
//!         .with_source(SourceConfig::new("mysql").map("email", "email").map("name", "name"))
//!         .with_source(SourceConfig::new("zoho").map("email", "Email").map("name", "Last_Name")),
//! )
//! .unwrap();
//!
//! // 2. Record what every source reported
//! let mut fetched = FetchSet::new();
//! fetched.record("mysql", "email", Observation::Snapshot(FieldSnapshot::at("a@b.io", 100)));
//! fetched.record("mysql", "name", Observation::Snapshot(FieldSnapshot::at("Alice", 300)));
//! fetched.record("zoho", "Email", Observation::Snapshot(FieldSnapshot::at("a@b.io", 100)));
//! fetched.record("zoho", "Last_Name", Observation::Snapshot(FieldSnapshot::at("Alicia", 200)));
//!
//! // 3. Plan
//! let plan = SyncPlan::build(&registry, RecordKey::new("a@b.io"), &fetched);
//! assert_eq!(plan.writes.len(), 1);
//! assert_eq!(plan.writes[0].source_id, "zoho");
//! assert_eq!(plan.writes[0].native_field, "Last_Name");
//! assert_eq!(plan.writes[0].value, FieldValue::from("Alice"));
//! ```

pub mod error;
pub mod operation;
pub mod plan;
pub mod reconcile;
pub mod record;
pub mod report;
pub mod schema;
pub mod snapshot;
pub mod value;

// Re-export main types at crate root
pub use error::{AdapterError, ConfigError, Error};
pub use operation::WriteOp;
pub use plan::{FetchSet, SyncPlan};
pub use reconcile::{
    FieldOutcome, Observation, ReconciliationResult, Reconciler, SourceObservation, Winner,
};
pub use record::RecordKey;
pub use report::{Failure, FailureKind, FieldReport, FieldStatus, Phase, SyncReport};
pub use schema::{
    CanonicalField, FieldType, SchemaConfig, SchemaRegistry, SourceConfig, SourceMapping,
};
pub use snapshot::{FieldSnapshot, ObservedAt, TimestampPrecision};
pub use value::FieldValue;

/// Type aliases for clarity
pub type SourceId = String;
pub type FieldName = String;
pub type NativeName = String;
/// Milliseconds since the Unix epoch, UTC
pub type Timestamp = i64;
