//! Sync runs.
//!
//! A run for one key is: fetch everything, reconcile every field, write the
//! winners. Runs for different keys share nothing but the read-only
//! registry and the adapters, and may proceed in parallel.

mod executor;
mod planner;

pub use executor::SyncExecutor;
pub use planner::SyncPlanner;

use crate::adapter::AdapterSet;
use fieldsync_engine::{RecordKey, SchemaRegistry, SyncPlan, SyncReport};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Tuning for sync runs.
#[derive(Debug, Clone, Copy)]
pub struct SyncOptions {
    /// Deadline for every individual adapter call
    pub call_timeout: Duration,
    /// Maximum number of keys synced at once by [`Synchronizer::sync_many`]
    pub concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            concurrency: 8,
        }
    }
}

/// Entry point for syncing keys.
#[derive(Debug, Clone)]
pub struct Synchronizer {
    registry: Arc<SchemaRegistry>,
    planner: SyncPlanner,
    executor: SyncExecutor,
    concurrency: usize,
}

impl Synchronizer {
    pub fn new(registry: Arc<SchemaRegistry>, adapters: AdapterSet, options: SyncOptions) -> Self {
        let adapters = Arc::new(adapters);
        Self {
            planner: SyncPlanner::new(registry.clone(), adapters.clone(), options.call_timeout),
            executor: SyncExecutor::new(adapters, options.call_timeout),
            registry,
            concurrency: options.concurrency.max(1),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Compute what a sync of `key` would write, without writing.
    pub async fn plan(&self, key: &RecordKey) -> SyncPlan {
        let span = tracing::info_span!("plan", %key);
        self.planner.plan(key).instrument(span).await
    }

    /// Sync one key and report the outcome per field.
    pub async fn sync(&self, key: &RecordKey) -> SyncReport {
        let run_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("sync", run_id = %run_id, %key);

        async move {
            tracing::info!("sync started");
            let plan = self.planner.plan(key).await;
            let mut report = SyncReport::from_plan(run_id, &plan);
            self.executor.execute(&plan, &mut report).await;

            tracing::info!(
                writes = plan.writes.len(),
                written = report.written_count(),
                failures = report.failures().count(),
                "sync finished"
            );
            report
        }
        .instrument(span)
        .await
    }

    /// Sync several independent keys, at most `concurrency` at a time.
    ///
    /// Reports come back in the order of `keys`.
    pub async fn sync_many(&self, keys: Vec<RecordKey>) -> Vec<SyncReport> {
        stream::iter(keys)
            .map(|key| async move { self.sync(&key).await })
            .buffered(self.concurrency)
            .collect()
            .await
    }
}
