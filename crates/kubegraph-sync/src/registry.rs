//! Entity registry: identity resolution and create-or-get over a graph store.

use std::sync::Arc;

use tokio::sync::OwnedMutexGuard;

use kubegraph_core::{EntityKind, EntityNode, InternalId, Xid};
use kubegraph_graph::{GraphError, GraphStore, MutationMode};

use crate::error::{Result, SyncError};
use crate::locks::XidLocks;

/// Resolves external identifiers to graph uids, creating stub nodes on demand.
///
/// Every create-or-get holds the (kind, xid) lock across its lookup and
/// creation, so concurrent callers in this process observe a single node.
/// Other processes are handled by the store's conflict report.
pub struct EntityRegistry {
    store: Arc<dyn GraphStore>,
    locks: XidLocks,
}

impl EntityRegistry {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            store,
            locks: XidLocks::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn GraphStore> {
        &self.store
    }

    /// Exclusive access to (kind, xid) for a caller-driven upsert.
    pub async fn lock(&self, kind: EntityKind, xid: &Xid) -> OwnedMutexGuard<()> {
        self.locks.lock(kind, xid).await
    }

    /// The uid bound to `xid`, if any. An empty xid is never looked up.
    pub async fn resolve(
        &self,
        kind: EntityKind,
        xid: &Xid,
    ) -> std::result::Result<Option<InternalId>, GraphError> {
        if xid.is_empty() {
            return Ok(None);
        }
        self.store.get_internal_id(xid, kind).await
    }

    /// Return the uid bound to `xid`, creating a stub node first if needed.
    ///
    /// An empty xid yields `Ok(None)` without touching the store. Any store
    /// failure is reported as [`SyncError::RelationBootstrap`].
    pub async fn create_or_get(&self, kind: EntityKind, xid: &Xid) -> Result<Option<InternalId>> {
        if xid.is_empty() {
            return Ok(None);
        }
        let _guard = self.locks.lock(kind, xid).await;

        match self.create_or_get_locked(kind, xid).await {
            Ok(uid) => Ok(Some(uid)),
            Err(source) => {
                tracing::error!(%kind, %xid, error = %source, "Failed to create related entity");
                Err(SyncError::RelationBootstrap {
                    kind,
                    xid: xid.clone(),
                    source,
                })
            }
        }
    }

    async fn create_or_get_locked(
        &self,
        kind: EntityKind,
        xid: &Xid,
    ) -> std::result::Result<InternalId, GraphError> {
        if let Some(uid) = self.store.get_internal_id(xid, kind).await? {
            return Ok(uid);
        }

        let stub = EntityNode::stub(kind, xid.clone());
        match self.store.mutate_node(&stub, MutationMode::Create).await {
            Ok(assigned) => {
                let uid = assigned.uid_for(xid).cloned().ok_or_else(|| {
                    GraphError::Serialization(format!("store assigned no uid to {xid}"))
                })?;
                tracing::info!(%kind, %xid, %uid, "Created stub entity");
                Ok(uid)
            }
            // Another writer bound the xid after our lookup.
            Err(GraphError::Conflict { .. }) => {
                tracing::debug!(%kind, %xid, "Create conflicted, resolving again");
                self.store
                    .get_internal_id(xid, kind)
                    .await?
                    .ok_or_else(|| GraphError::Conflict {
                        kind,
                        xid: xid.clone(),
                    })
            }
            Err(e) => Err(e),
        }
    }
}
