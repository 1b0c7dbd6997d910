//! Feeding cluster events into the synchronizer.
//!
//! Watch mode follows ReplicaSets through a `kube` watcher; one-shot mode
//! lists them once. Either way each object goes through `store` with
//! bounded retries for retryable failures.

use futures::StreamExt;
use k8s_openapi::api::apps::v1::ReplicaSet;
use kube::api::ListParams;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Api;

use crate::config::RetryPolicy;
use crate::error::Result;
use crate::resource::SyncResource;
use crate::synchronizer::{SyncOutcome, Synchronizer};

/// Store `resource`, retrying retryable failures with backoff.
pub async fn store_with_retry<R: SyncResource>(
    sync: &Synchronizer,
    resource: &R,
    policy: &RetryPolicy,
) -> Result<SyncOutcome> {
    let mut attempt = 1;
    loop {
        match sync.store_with_outcome(resource).await {
            Ok(outcome) => return Ok(outcome),
            Err(e) if e.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                tracing::warn!(
                    kind = %R::KIND,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Synchronization failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Apply one watcher event. Returns `None` for bookkeeping events.
///
/// Deletions are stored like any other update: the object carries its
/// deletion timestamp, which becomes the node's `endTime`.
pub async fn handle_event(
    sync: &Synchronizer,
    event: watcher::Event<ReplicaSet>,
    policy: &RetryPolicy,
) -> Result<Option<SyncOutcome>> {
    match event {
        watcher::Event::Apply(rs) | watcher::Event::InitApply(rs) | watcher::Event::Delete(rs) => {
            store_with_retry(sync, &rs, policy).await.map(Some)
        }
        watcher::Event::Init => {
            tracing::debug!("Watch (re)listing started");
            Ok(None)
        }
        watcher::Event::InitDone => {
            tracing::info!("Watch initial listing complete");
            Ok(None)
        }
    }
}

/// Follow ReplicaSet events until the stream ends.
///
/// Watch errors are retried by the watcher's backoff; failed objects are
/// logged and dropped.
pub async fn run_watch(sync: &Synchronizer, api: Api<ReplicaSet>, policy: RetryPolicy) {
    let stream = watcher(api, watcher::Config::default()).default_backoff();
    futures::pin_mut!(stream);

    tracing::info!("Watching ReplicaSets");
    while let Some(item) = stream.next().await {
        match item {
            Ok(event) => {
                if let Err(e) = handle_event(sync, event, &policy).await {
                    tracing::error!(error = %e, retryable = e.is_retryable(), "Dropping event");
                }
            }
            Err(e) => tracing::warn!(error = %e, "Watch stream error"),
        }
    }
}

/// Counts from a one-shot synchronization.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncTotals {
    pub created: u32,
    pub updated: u32,
    pub failed: u32,
    pub skipped_owners: u32,
}

impl SyncTotals {
    pub fn record(&mut self, result: &Result<SyncOutcome>) {
        match result {
            Ok(outcome) => {
                if outcome.created {
                    self.created += 1;
                } else {
                    self.updated += 1;
                }
                self.skipped_owners += outcome.skipped_owners.len() as u32;
            }
            Err(_) => self.failed += 1,
        }
    }
}

/// Store every resource in `items`, continuing past failures.
pub async fn sync_all<R: SyncResource>(
    sync: &Synchronizer,
    items: &[R],
    policy: &RetryPolicy,
) -> SyncTotals {
    let mut totals = SyncTotals::default();
    for item in items {
        let result = store_with_retry(sync, item, policy).await;
        if let Err(e) = &result {
            tracing::error!(kind = %R::KIND, error = %e, "Failed to synchronize");
        }
        totals.record(&result);
    }
    totals
}

/// List every ReplicaSet once and store it.
pub async fn run_once(
    sync: &Synchronizer,
    api: &Api<ReplicaSet>,
    policy: &RetryPolicy,
) -> Result<SyncTotals> {
    let list = api.list(&ListParams::default()).await?;
    let totals = sync_all(sync, &list.items, policy).await;

    tracing::info!(
        created = totals.created,
        updated = totals.updated,
        failed = totals.failed,
        skipped_owners = totals.skipped_owners,
        "One-shot synchronization complete"
    );
    Ok(totals)
}
