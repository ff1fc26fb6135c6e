//! Fetch-all-then-decide planning.

use crate::adapter::{AdapterSet, FetchResult};
use fieldsync_engine::{
    AdapterError, FetchSet, NativeName, Observation, RecordKey, SchemaRegistry, SyncPlan,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

/// Builds a [`SyncPlan`] for one key.
///
/// Every source is fetched concurrently with one batch call, each under the
/// per-call deadline. The plan is built only after every fetch has finished
/// or failed, so a slow source delays the plan but never changes it.
#[derive(Debug, Clone)]
pub struct SyncPlanner {
    registry: Arc<SchemaRegistry>,
    adapters: Arc<AdapterSet>,
    call_timeout: Duration,
}

impl SyncPlanner {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        adapters: Arc<AdapterSet>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            adapters,
            call_timeout,
        }
    }

    pub async fn plan(&self, key: &RecordKey) -> SyncPlan {
        let fetches = self.registry.sources().iter().map(|source| async move {
            let natives: Vec<&str> = self
                .registry
                .native_fields(source.id())
                .into_iter()
                .map(|(_, native)| native)
                .collect();

            let outcome = match self.adapters.get(source.id()) {
                Some(adapter) => {
                    match timeout(self.call_timeout, adapter.fetch_batch(key, &natives)).await {
                        Ok(batch) => Ok(batch),
                        Err(_) => Err(AdapterError::Timeout(self.call_timeout.as_millis() as u64)),
                    }
                }
                None => Err(AdapterError::Unavailable("no adapter bound".into())),
            };
            (source.id(), natives, outcome)
        });

        let mut fetched = FetchSet::new();
        for (source_id, natives, outcome) in join_all(fetches).await {
            match outcome {
                Ok(batch) => record_batch(&mut fetched, source_id, batch),
                Err(err) => {
                    tracing::warn!(source = source_id, %key, error = %err, "fetch failed");
                    fetched.fail_all(source_id, natives, &err);
                }
            }
        }

        SyncPlan::build(&self.registry, key.clone(), &fetched)
    }
}

fn record_batch(fetched: &mut FetchSet, source_id: &str, batch: Vec<(NativeName, FetchResult)>) {
    for (native, result) in batch {
        let observation = match result {
            Ok(Some(snapshot)) => Observation::Snapshot(snapshot),
            Ok(None) => Observation::NotFound,
            Err(err) => {
                tracing::warn!(source = source_id, field = %native, error = %err, "fetch failed");
                Observation::Failed(err)
            }
        };
        tracing::debug!(source = source_id, field = %native, ?observation, "fetched");
        fetched.record(source_id, native, observation);
    }
}
