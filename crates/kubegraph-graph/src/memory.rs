//! In-process graph store.
//!
//! Enforces the same contract as the Neo4j backend (unique (kind, xid),
//! stubs must point at existing nodes) and records every creation so callers
//! can assert on exactly what was written.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use kubegraph_core::{EntityKind, EntityNode, InternalId, Xid};

use crate::client::GraphError;
use crate::store::{Assigned, GraphStore, MutationMode};

#[derive(Default)]
struct Inner {
    nodes: HashMap<InternalId, EntityNode>,
    index: HashMap<(EntityKind, Xid), InternalId>,
    next_uid: u64,
    created: Vec<(EntityKind, Xid)>,
    updates: usize,
    lookups: usize,
    failures: HashMap<EntityKind, usize>,
}

/// Graph store held entirely in memory.
#[derive(Default)]
pub struct MemoryGraph {
    inner: Mutex<Inner>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Mutations validate before writing, so a poisoned lock still guards
        // consistent maps.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next `count` mutations of `kind` nodes fail.
    pub fn fail_mutations(&self, kind: EntityKind, count: usize) {
        self.lock().failures.insert(kind, count);
    }

    /// The node bound to (kind, xid), with its uid filled in.
    pub fn find(&self, kind: EntityKind, xid: &Xid) -> Option<EntityNode> {
        let inner = self.lock();
        let uid = inner.index.get(&(kind, xid.clone()))?;
        inner.nodes.get(uid).cloned()
    }

    pub fn node(&self, uid: &InternalId) -> Option<EntityNode> {
        self.lock().nodes.get(uid).cloned()
    }

    /// Every (kind, xid) created so far, in creation order.
    pub fn created(&self) -> Vec<(EntityKind, Xid)> {
        self.lock().created.clone()
    }

    /// Number of creations recorded for `kind`.
    pub fn creations(&self, kind: EntityKind) -> usize {
        self.lock()
            .created
            .iter()
            .filter(|(k, _)| *k == kind)
            .count()
    }

    /// Number of stored nodes of `kind` carrying `xid`.
    pub fn count_by_xid(&self, kind: EntityKind, xid: &Xid) -> usize {
        self.lock()
            .nodes
            .values()
            .filter(|n| n.kind == kind && &n.xid == xid)
            .count()
    }

    pub fn updates(&self) -> usize {
        self.lock().updates
    }

    pub fn lookups(&self) -> usize {
        self.lock().lookups
    }

    pub fn len(&self) -> usize {
        self.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Inner {
    fn take_failure(&mut self, kind: EntityKind) -> bool {
        match self.failures.get_mut(&kind) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }

    fn check_refs(&self, node: &EntityNode) -> Result<(), GraphError> {
        for (relation, targets) in &node.relations {
            for target in targets {
                let exists = self
                    .nodes
                    .get(&target.uid)
                    .is_some_and(|n| n.kind == relation.target_kind());
                if !exists {
                    return Err(GraphError::DanglingReference {
                        relation: *relation,
                        uid: target.uid.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn create(&mut self, node: &EntityNode) -> Result<Assigned, GraphError> {
        let key = (node.kind, node.xid.clone());
        if self.index.contains_key(&key) {
            return Err(GraphError::Conflict {
                kind: node.kind,
                xid: node.xid.clone(),
            });
        }

        self.next_uid += 1;
        let uid = InternalId(format!("0x{:x}", self.next_uid));
        let mut stored = node.clone();
        stored.uid = Some(uid.clone());

        self.index.insert(key, uid.clone());
        self.nodes.insert(uid.clone(), stored);
        self.created.push((node.kind, node.xid.clone()));
        Ok(Assigned::single(node.xid.clone(), uid))
    }

    fn update(&mut self, node: &EntityNode) -> Result<Assigned, GraphError> {
        let uid = node.uid.clone().ok_or_else(|| {
            GraphError::Serialization(format!("update of {} without a uid", node.xid))
        })?;
        let stored = match self.nodes.get_mut(&uid) {
            Some(stored) if stored.kind == node.kind => stored,
            _ => {
                return Err(GraphError::NotFound {
                    kind: node.kind,
                    uid,
                })
            }
        };

        stored.name = node.name.clone();
        if node.type_name.is_some() {
            stored.type_name = node.type_name.clone();
        }
        if node.start_time.is_some() {
            stored.start_time = node.start_time.clone();
        }
        if node.end_time.is_some() {
            stored.end_time = node.end_time.clone();
        }
        for (relation, targets) in &node.relations {
            for target in targets {
                stored.link(*relation, target.clone());
            }
        }

        self.updates += 1;
        Ok(Assigned::default())
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn get_internal_id(
        &self,
        xid: &Xid,
        kind: EntityKind,
    ) -> Result<Option<InternalId>, GraphError> {
        let mut inner = self.lock();
        inner.lookups += 1;
        Ok(inner.index.get(&(kind, xid.clone())).cloned())
    }

    async fn mutate_node(
        &self,
        node: &EntityNode,
        mode: MutationMode,
    ) -> Result<Assigned, GraphError> {
        let mut inner = self.lock();
        if inner.take_failure(node.kind) {
            return Err(GraphError::Unavailable(format!(
                "injected failure for {} {}",
                node.kind, node.xid
            )));
        }
        inner.check_refs(node)?;
        match mode {
            MutationMode::Create => inner.create(node),
            MutationMode::Update => inner.update(node),
        }
    }
}
