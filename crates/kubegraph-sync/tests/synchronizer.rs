//! End-to-end synchronization against the in-memory graph store.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference, Time};
use kube::runtime::watcher;

use kubegraph_core::time::parse_timestamp;
use kubegraph_core::{EntityKind, EntityNode, InternalId, Relation, Xid};
use kubegraph_graph::{Assigned, GraphError, GraphStore, MemoryGraph, MutationMode};
use kubegraph_sync::config::RetryPolicy;
use kubegraph_sync::owners::SkipReason;
use kubegraph_sync::watch::{handle_event, store_with_retry, sync_all};
use kubegraph_sync::{SyncError, Synchronizer};

fn setup() -> (Arc<MemoryGraph>, Synchronizer) {
    let store = Arc::new(MemoryGraph::new());
    let sync = Synchronizer::new(store.clone());
    (store, sync)
}

fn owner(kind: &str, name: &str) -> OwnerReference {
    OwnerReference {
        api_version: "apps/v1".to_string(),
        kind: kind.to_string(),
        name: name.to_string(),
        uid: format!("uid-{name}"),
        controller: Some(true),
        ..Default::default()
    }
}

fn replicaset(namespace: &str, name: &str, owners: Vec<OwnerReference>) -> ReplicaSet {
    let created = Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap();
    ReplicaSet {
        metadata: ObjectMeta {
            namespace: Some(namespace.to_string()),
            name: Some(name.to_string()),
            creation_timestamp: Some(Time(created)),
            owner_references: Some(owners),
            ..Default::default()
        },
        ..Default::default()
    }
}

/// A store whose first lookups miss, as if another process bound the xid
/// between our lookup and our create.
struct StaleLookups {
    inner: Arc<MemoryGraph>,
    misses: AtomicUsize,
}

impl StaleLookups {
    fn new(inner: Arc<MemoryGraph>, misses: usize) -> Self {
        Self {
            inner,
            misses: AtomicUsize::new(misses),
        }
    }
}

#[async_trait]
impl GraphStore for StaleLookups {
    async fn get_internal_id(
        &self,
        xid: &Xid,
        kind: EntityKind,
    ) -> Result<Option<InternalId>, GraphError> {
        let missed = self
            .misses
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if missed {
            return Ok(None);
        }
        self.inner.get_internal_id(xid, kind).await
    }

    async fn mutate_node(
        &self,
        node: &EntityNode,
        mode: MutationMode,
    ) -> Result<Assigned, GraphError> {
        self.inner.mutate_node(node, mode).await
    }
}

fn fast_retries(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn test_end_to_end_with_deployment_owner() {
    let (store, sync) = setup();
    let rs = replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]);

    let outcome = sync.store_with_outcome(&rs).await.unwrap();
    assert!(outcome.created);
    assert!(outcome.skipped_owners.is_empty());

    let dep = store
        .find(EntityKind::Deployment, &Xid::new("ns1:dep1"))
        .expect("deployment created");
    let node = store
        .find(EntityKind::ReplicaSet, &Xid::new("ns1:rs1"))
        .expect("replicaset created");

    assert_eq!(node.uid.as_ref(), Some(&outcome.uid));
    assert_eq!(node.name, "replicaset-rs1");
    let link = node.parent(Relation::Deployment).unwrap();
    assert_eq!(Some(&link.uid), dep.uid.as_ref());
    assert_eq!(link.xid.as_str(), "ns1:dep1");
    assert_eq!(dep.name, "ns1:dep1");

    let ns = store
        .find(EntityKind::Namespace, &Xid::new("ns1"))
        .expect("namespace created");
    let ns_link = node.parent(Relation::Namespace).unwrap();
    assert_eq!(Some(&ns_link.uid), ns.uid.as_ref());
}

#[tokio::test]
async fn test_replay_reuses_uid_without_new_creations() {
    let (store, sync) = setup();
    let rs = replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]);

    let first = sync.store(&rs).await.unwrap();
    let created_after_first = store.created();

    let second = sync.store_with_outcome(&rs).await.unwrap();

    assert_eq!(first, second.uid);
    assert!(!second.created);
    assert_eq!(store.created(), created_after_first);
    assert_eq!(store.creations(EntityKind::ReplicaSet), 1);
    assert_eq!(store.creations(EntityKind::Deployment), 1);
    assert_eq!(store.creations(EntityKind::Namespace), 1);
    assert_eq!(store.updates(), 1);
}

#[tokio::test]
async fn test_unrecognized_owner_is_skipped_once() {
    let (store, sync) = setup();
    let rs = replicaset("ns1", "rs1", vec![owner("StatefulSet", "db")]);

    let outcome = sync.store_with_outcome(&rs).await.unwrap();

    assert_eq!(outcome.skipped_owners.len(), 1);
    let reason = outcome.skipped_owners[0].reason;
    assert_eq!(reason, SkipReason::UnrecognizedKind);
    let node = store
        .find(EntityKind::ReplicaSet, &Xid::new("ns1:rs1"))
        .unwrap();
    assert!(node.parent(Relation::Deployment).is_none());
    assert_eq!(store.creations(EntityKind::Deployment), 0);
}

#[tokio::test]
async fn test_duplicate_deployment_owners_link_only_one() {
    let (store, sync) = setup();
    let mut second = owner("Deployment", "dep2");
    second.controller = None;
    let rs = replicaset("ns1", "rs1", vec![second, owner("Deployment", "dep1")]);

    let outcome = sync.store_with_outcome(&rs).await.unwrap();

    assert_eq!(outcome.skipped_owners.len(), 1);
    assert_eq!(outcome.skipped_owners[0].name, "dep2");
    assert_eq!(outcome.skipped_owners[0].reason, SkipReason::DuplicateOwner);
    assert!(store
        .find(EntityKind::Deployment, &Xid::new("ns1:dep2"))
        .is_none());

    let node = store
        .find(EntityKind::ReplicaSet, &Xid::new("ns1:rs1"))
        .unwrap();
    assert_eq!(node.related(Relation::Deployment).len(), 1);
    assert_eq!(
        node.parent(Relation::Deployment).unwrap().xid.as_str(),
        "ns1:dep1"
    );
}

#[tokio::test]
async fn test_existing_deployment_stub_is_reused() {
    let (store, sync) = setup();
    let dep_uid = sync
        .registry()
        .create_or_get(EntityKind::Deployment, &Xid::new("ns1:dep1"))
        .await
        .unwrap()
        .unwrap();

    let rs = replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]);
    sync.store(&rs).await.unwrap();

    let node = store
        .find(EntityKind::ReplicaSet, &Xid::new("ns1:rs1"))
        .unwrap();
    assert_eq!(node.parent(Relation::Deployment).unwrap().uid, dep_uid);
    assert_eq!(store.creations(EntityKind::Deployment), 1);
}

#[tokio::test]
async fn test_deletion_sets_end_time_and_keeps_node() {
    let (store, sync) = setup();
    let mut rs = replicaset("ns1", "rs1", vec![]);
    let uid = sync.store(&rs).await.unwrap();

    let node = store.node(&uid).unwrap();
    assert!(node.end_time.is_none());

    let deleted = Utc.with_ymd_and_hms(2024, 5, 7, 0, 0, 1).unwrap();
    rs.metadata.deletion_timestamp = Some(Time(deleted));
    let outcome = handle_event(&sync, watcher::Event::Delete(rs), &fast_retries(1))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(outcome.uid, uid);
    let node = store.node(&uid).unwrap();
    let end = node.end_time.as_deref().unwrap();
    assert_eq!(parse_timestamp(end).unwrap(), deleted);
    assert_eq!(
        node.start_time.as_deref().unwrap().len(),
        end.len(),
        "start and end share one format"
    );
}

#[tokio::test]
async fn test_bookkeeping_events_do_nothing() {
    let (store, sync) = setup();
    let policy = fast_retries(1);

    assert!(handle_event(&sync, watcher::Event::Init, &policy)
        .await
        .unwrap()
        .is_none());
    assert!(handle_event(&sync, watcher::Event::InitDone, &policy)
        .await
        .unwrap()
        .is_none());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_owner_bootstrap_failure_aborts_store() {
    let (store, sync) = setup();
    store.fail_mutations(EntityKind::Deployment, 1);
    let rs = replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]);

    let err = sync.store(&rs).await.unwrap_err();

    assert!(matches!(err, SyncError::RelationBootstrap { .. }));
    assert!(!err.is_retryable());
    assert!(store
        .find(EntityKind::ReplicaSet, &Xid::new("ns1:rs1"))
        .is_none());
}

#[tokio::test]
async fn test_owner_bootstrap_failure_is_not_retried() {
    let (store, sync) = setup();
    store.fail_mutations(EntityKind::Deployment, 1);
    let rs = replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]);

    // A second attempt would succeed, so an error here means none was made.
    let err = store_with_retry(&sync, &rs, &fast_retries(3))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::RelationBootstrap { .. }));
    assert_eq!(store.creations(EntityKind::Deployment), 0);
}

#[tokio::test]
async fn test_top_level_failure_is_retryable() {
    let (store, sync) = setup();
    store.fail_mutations(EntityKind::ReplicaSet, 2);
    let rs = replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]);

    let err = sync.store(&rs).await.unwrap_err();
    assert!(matches!(err, SyncError::Graph(_)));
    assert!(err.is_retryable());

    let outcome = store_with_retry(&sync, &rs, &fast_retries(3)).await.unwrap();
    assert!(outcome.created);
    assert_eq!(store.creations(EntityKind::ReplicaSet), 1);
    assert_eq!(store.creations(EntityKind::Deployment), 1);
}

#[tokio::test]
async fn test_retries_stop_at_max_attempts() {
    let (store, sync) = setup();
    store.fail_mutations(EntityKind::ReplicaSet, 5);
    let rs = replicaset("ns1", "rs1", vec![]);

    let err = store_with_retry(&sync, &rs, &fast_retries(3))
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    assert!(store
        .find(EntityKind::ReplicaSet, &Xid::new("ns1:rs1"))
        .is_none());
}

#[tokio::test]
async fn test_invalid_resource_is_rejected_before_store_access() {
    let (store, sync) = setup();
    let mut rs = replicaset("ns1", "rs1", vec![]);
    rs.metadata.name = None;

    let err = sync.store(&rs).await.unwrap_err();

    assert!(matches!(err, SyncError::InvalidResource(_)));
    assert_eq!(store.lookups(), 0);
}

#[tokio::test]
async fn test_sync_all_counts_outcomes() {
    let (store, sync) = setup();
    let mut nameless = replicaset("ns1", "x", vec![]);
    nameless.metadata.name = None;
    let items = vec![
        replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]),
        replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]),
        replicaset("ns2", "rs1", vec![owner("CronJob", "nightly")]),
        nameless,
    ];

    let totals = sync_all(&sync, &items, &fast_retries(1)).await;

    assert_eq!(totals.created, 2);
    assert_eq!(totals.updated, 1);
    assert_eq!(totals.failed, 1);
    assert_eq!(totals.skipped_owners, 1);
    assert_eq!(store.creations(EntityKind::Namespace), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_create_or_get_binds_one_uid() {
    let (store, sync) = setup();
    let sync = Arc::new(sync);
    let xid = Xid::new("ns1:dep1");

    let mut handles = Vec::new();
    for _ in 0..16 {
        let sync = sync.clone();
        let xid = xid.clone();
        handles.push(tokio::spawn(async move {
            sync.registry()
                .create_or_get(EntityKind::Deployment, &xid)
                .await
                .unwrap()
                .unwrap()
        }));
    }

    let mut uids = Vec::new();
    for handle in handles {
        uids.push(handle.await.unwrap());
    }
    uids.dedup();

    assert_eq!(uids.len(), 1);
    assert_eq!(store.creations(EntityKind::Deployment), 1);
    assert_eq!(store.count_by_xid(EntityKind::Deployment, &xid), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_replays_store_one_node() {
    let (store, sync) = setup();
    let sync = Arc::new(sync);
    let rs = replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let sync = sync.clone();
        let rs = rs.clone();
        handles.push(tokio::spawn(async move {
            sync.store(&rs).await.unwrap()
        }));
    }

    let mut uids = Vec::new();
    for handle in handles {
        uids.push(handle.await.unwrap());
    }
    uids.dedup();

    assert_eq!(uids.len(), 1);
    let rs_xid = Xid::new("ns1:rs1");
    assert_eq!(store.count_by_xid(EntityKind::ReplicaSet, &rs_xid), 1);
    assert_eq!(store.creations(EntityKind::Deployment), 1);
}

#[tokio::test]
async fn test_create_conflict_falls_back_to_existing_node() {
    let (store, sync) = setup();
    let rs = replicaset("ns1", "rs1", vec![owner("Deployment", "dep1")]);
    let first = sync.store(&rs).await.unwrap();
    let created_before = store.created();

    // Misses the ReplicaSet, Namespace and Deployment lookups.
    let other = Synchronizer::new(Arc::new(StaleLookups::new(store.clone(), 3)));
    let outcome = other.store_with_outcome(&rs).await.unwrap();

    assert_eq!(outcome.uid, first);
    assert!(!outcome.created);
    assert_eq!(store.created(), created_before);
    let rs_xid = Xid::new("ns1:rs1");
    assert_eq!(store.count_by_xid(EntityKind::ReplicaSet, &rs_xid), 1);

    let node = store.node(&first).unwrap();
    let dep = store
        .find(EntityKind::Deployment, &Xid::new("ns1:dep1"))
        .unwrap();
    let dep_link = node.parent(Relation::Deployment).unwrap();
    assert_eq!(Some(&dep_link.uid), dep.uid.as_ref());
}

#[tokio::test]
async fn test_create_or_get_conflict_returns_existing_uid() {
    let store = Arc::new(MemoryGraph::new());
    let xid = Xid::new("ns1:dep1");
    let existing = Synchronizer::new(store.clone())
        .registry()
        .create_or_get(EntityKind::Deployment, &xid)
        .await
        .unwrap();

    let other = Synchronizer::new(Arc::new(StaleLookups::new(store.clone(), 1)));
    let uid = other
        .registry()
        .create_or_get(EntityKind::Deployment, &xid)
        .await
        .unwrap();

    assert_eq!(uid, existing);
    assert_eq!(store.creations(EntityKind::Deployment), 1);
}
