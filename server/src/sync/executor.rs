//! Write-set application.

use crate::adapter::AdapterSet;
use fieldsync_engine::{AdapterError, SyncPlan, SyncReport};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Applies a plan's writes.
///
/// Writes are independent upserts: all of them are issued concurrently and
/// a failed write never stops the others. Nothing is rolled back.
#[derive(Debug, Clone)]
pub struct SyncExecutor {
    adapters: Arc<AdapterSet>,
    call_timeout: Duration,
}

impl SyncExecutor {
    pub fn new(adapters: Arc<AdapterSet>, call_timeout: Duration) -> Self {
        Self {
            adapters,
            call_timeout,
        }
    }

    /// Issue every write in `plan` and record each outcome in `report`.
    pub async fn execute(&self, plan: &SyncPlan, report: &mut SyncReport) {
        let writes = plan.writes.iter().map(|op| async move {
            let outcome = match self.adapters.get(&op.source_id) {
                Some(adapter) => {
                    let call = adapter.write(&plan.key, &op.native_field, &op.value, op.timestamp);
                    match timeout(self.call_timeout, call).await {
                        Ok(result) => result,
                        Err(_) => Err(AdapterError::Timeout(self.call_timeout.as_millis() as u64)),
                    }
                }
                None => Err(AdapterError::Unavailable("no adapter bound".into())),
            };
            (op, outcome)
        });

        for (op, outcome) in join_all(writes).await {
            match &outcome {
                Ok(()) => tracing::debug!(
                    source = %op.source_id,
                    field = %op.field,
                    value = %op.value,
                    timestamp = op.timestamp,
                    "write applied"
                ),
                Err(err) => tracing::warn!(
                    source = %op.source_id,
                    field = %op.field,
                    error = %err,
                    "write failed"
                ),
            }
            report.record_write(op, outcome);
        }
    }
}
