//! The graph store capability consumed by the synchronizer.

use std::collections::BTreeMap;

use async_trait::async_trait;

use kubegraph_core::{EntityKind, EntityNode, InternalId, Xid};

use crate::client::GraphError;

/// How a node mutation should be applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationMode {
    /// Bind a new uid to the node's (kind, xid). Fails with
    /// [`GraphError::Conflict`] if the pair is already bound.
    Create,
    /// Overwrite the node identified by its uid.
    Update,
}

impl MutationMode {
    /// Update when the node already carries a uid, create otherwise.
    pub fn for_node(node: &EntityNode) -> Self {
        if node.uid.is_some() {
            Self::Update
        } else {
            Self::Create
        }
    }
}

/// Uids bound by a mutation, keyed by the XID of each newly created node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assigned {
    pub uids: BTreeMap<Xid, InternalId>,
}

impl Assigned {
    pub fn single(xid: Xid, uid: InternalId) -> Self {
        let mut uids = BTreeMap::new();
        uids.insert(xid, uid);
        Self { uids }
    }

    pub fn uid_for(&self, xid: &Xid) -> Option<&InternalId> {
        self.uids.get(xid)
    }
}

/// A graph database as seen by the synchronizer.
///
/// Implementations must keep (kind, xid) unique: a `Create` for a pair that is
/// already bound reports [`GraphError::Conflict`] rather than a second node.
/// Relationship stubs must reference existing nodes and never create them.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Look up the uid bound to `xid` for the given kind.
    async fn get_internal_id(
        &self,
        xid: &Xid,
        kind: EntityKind,
    ) -> Result<Option<InternalId>, GraphError>;

    /// Persist a node and its relationship stubs.
    async fn mutate_node(
        &self,
        node: &EntityNode,
        mode: MutationMode,
    ) -> Result<Assigned, GraphError>;
}
