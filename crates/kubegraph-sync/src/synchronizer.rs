//! Upsert orchestration: one resource in, one persisted node out.

use std::sync::Arc;

use kubegraph_core::{EntityNode, InternalId};
use kubegraph_graph::{GraphError, GraphStore, MutationMode};

use crate::builder::{self, Built};
use crate::error::Result;
use crate::owners::SkippedOwner;
use crate::registry::EntityRegistry;
use crate::resource::SyncResource;

/// What a single `store` call did.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub uid: InternalId,
    /// True if this call created the node, false if it updated it.
    pub created: bool,
    pub skipped_owners: Vec<SkippedOwner>,
}

/// Entity synchronizer over an injected graph store.
pub struct Synchronizer {
    registry: EntityRegistry,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn GraphStore>) -> Self {
        Self {
            registry: EntityRegistry::new(store),
        }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Create or update the node for `resource` and return its uid.
    pub async fn store<R: SyncResource>(&self, resource: &R) -> Result<InternalId> {
        Ok(self.store_with_outcome(resource).await?.uid)
    }

    /// Like [`Synchronizer::store`], also reporting creation and skipped owners.
    ///
    /// The resource's (kind, xid) stays locked for the whole call. A failure
    /// while creating a related entity aborts before the node is written.
    pub async fn store_with_outcome<R: SyncResource>(&self, resource: &R) -> Result<SyncOutcome> {
        let xid = builder::resource_xid(resource)?;
        let _guard = self.registry.lock(R::KIND, &xid).await;

        let existing = self.registry.resolve(R::KIND, &xid).await?;
        let Built {
            mut node,
            skipped_owners,
        } = builder::build_node(&self.registry, resource).await?;
        node.uid = existing;

        let (uid, created) = self.upsert(&mut node).await?;
        if created {
            tracing::info!(kind = %R::KIND, %xid, %uid, "Created node");
        } else {
            tracing::info!(kind = %R::KIND, %xid, %uid, "Updated node");
        }

        Ok(SyncOutcome {
            uid,
            created,
            skipped_owners,
        })
    }

    async fn upsert(
        &self,
        node: &mut EntityNode,
    ) -> std::result::Result<(InternalId, bool), GraphError> {
        let store = self.registry.store();

        if let Some(uid) = node.uid.clone() {
            store.mutate_node(node, MutationMode::Update).await?;
            return Ok((uid, false));
        }

        match store.mutate_node(node, MutationMode::Create).await {
            Ok(assigned) => {
                let uid = assigned.uid_for(&node.xid).cloned().ok_or_else(|| {
                    GraphError::Serialization(format!("store assigned no uid to {}", node.xid))
                })?;
                Ok((uid, true))
            }
            // Bound by another writer since the lookup: update that node.
            Err(GraphError::Conflict { kind, xid }) => {
                let uid = store
                    .get_internal_id(&xid, kind)
                    .await?
                    .ok_or_else(|| GraphError::Conflict {
                        kind,
                        xid: xid.clone(),
                    })?;
                node.uid = Some(uid.clone());
                store.mutate_node(node, MutationMode::Update).await?;
                Ok((uid, false))
            }
            Err(e) => Err(e),
        }
    }
}
