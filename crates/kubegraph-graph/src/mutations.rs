//! Write operations for the knowledge graph.
//!
//! Nodes are keyed by (label, xid). Creation goes through MERGE so two
//! writers racing on the same xid converge on one node; the loser sees a
//! uid other than the one it proposed and reports a conflict. A node and
//! its edges are written in a single transaction.

use async_trait::async_trait;
use neo4rs::{query, Query, Txn};
use uuid::Uuid;

use kubegraph_core::{EntityKind, EntityNode, EntityRef, InternalId, Relation, Xid};

use crate::client::{GraphClient, GraphError};
use crate::store::{Assigned, GraphStore, MutationMode};

impl GraphClient {
    // ── Node Upserts ─────────────────────────────────────────────

    /// Persist an entity node and link its relationship stubs in one
    /// transaction.
    ///
    /// Any failure rolls the whole mutation back, so a node is never left
    /// without the edges it was written with. Updates leave unset optional
    /// fields as they are, so a replayed event without a deletion timestamp
    /// never clears a recorded `endTime`.
    pub async fn upsert_entity(
        &self,
        node: &EntityNode,
        mode: MutationMode,
    ) -> Result<Assigned, GraphError> {
        let mut txn = self.start_txn().await?;

        match write_entity(&mut txn, node, mode).await {
            Ok(assigned) => {
                txn.commit().await?;
                Ok(assigned)
            }
            Err(e) => {
                if let Err(rollback) = txn.rollback().await {
                    tracing::warn!(xid = %node.xid, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }
}

async fn write_entity(
    txn: &mut Txn,
    node: &EntityNode,
    mode: MutationMode,
) -> Result<Assigned, GraphError> {
    let (uid, assigned) = match mode {
        MutationMode::Create => {
            let uid = create_entity(txn, node).await?;
            let assigned = Assigned::single(node.xid.clone(), uid.clone());
            (uid, assigned)
        }
        MutationMode::Update => {
            let uid = node.uid.clone().ok_or_else(|| {
                GraphError::Serialization(format!("update of {} without a uid", node.xid))
            })?;
            update_entity(txn, node, &uid).await?;
            (uid, Assigned::default())
        }
    };

    for (relation, targets) in &node.relations {
        for target in targets {
            link(txn, node.kind, &uid, *relation, target).await?;
        }
    }

    Ok(assigned)
}

async fn create_entity(txn: &mut Txn, node: &EntityNode) -> Result<InternalId, GraphError> {
    let label = node.kind.label();
    let tag = node.kind.type_tag();
    let cypher = format!(
        "MERGE (n:{label} {{xid: $xid}})
         ON CREATE SET
           n.uid = $uid, n.{tag} = true, n.name = $name,
           n.type = CASE WHEN $type = '' THEN null ELSE $type END,
           n.startTime = CASE WHEN $start_time = '' THEN null ELSE $start_time END,
           n.endTime = CASE WHEN $end_time = '' THEN null ELSE $end_time END
         RETURN n.uid AS uid"
    );

    let proposed = Uuid::new_v4().to_string();
    let q = with_scalars(query(&cypher), node).param("uid", proposed.clone());

    let row = fetch_one(txn, q)
        .await?
        .ok_or_else(|| GraphError::Serialization("MERGE returned no row".to_string()))?;
    let bound: String = row
        .get("uid")
        .map_err(|e| GraphError::Serialization(format!("Failed to read uid: {e}")))?;

    if bound != proposed {
        return Err(GraphError::Conflict {
            kind: node.kind,
            xid: node.xid.clone(),
        });
    }
    tracing::debug!(kind = %node.kind, xid = %node.xid, uid = %bound, "Created node");
    Ok(InternalId(bound))
}

async fn update_entity(
    txn: &mut Txn,
    node: &EntityNode,
    uid: &InternalId,
) -> Result<(), GraphError> {
    let label = node.kind.label();
    let tag = node.kind.type_tag();
    let cypher = format!(
        "MATCH (n:{label} {{uid: $uid}})
         SET n.{tag} = true, n.xid = $xid, n.name = $name,
           n.type = CASE WHEN $type = '' THEN n.type ELSE $type END,
           n.startTime = CASE WHEN $start_time = '' THEN n.startTime ELSE $start_time END,
           n.endTime = CASE WHEN $end_time = '' THEN n.endTime ELSE $end_time END
         RETURN n.uid AS uid"
    );

    let q = with_scalars(query(&cypher), node).param("uid", uid.0.clone());

    match fetch_one(txn, q).await? {
        Some(_) => Ok(()),
        None => Err(GraphError::NotFound {
            kind: node.kind,
            uid: uid.clone(),
        }),
    }
}

// ── Edge Upserts ─────────────────────────────────────────────────

/// Point `relation` of the node `uid` at an existing target node.
///
/// Single-valued relations drop any edge to a different target first.
async fn link(
    txn: &mut Txn,
    kind: EntityKind,
    uid: &InternalId,
    relation: Relation,
    target: &EntityRef,
) -> Result<(), GraphError> {
    let label = kind.label();
    let target_label = relation.target_kind().label();
    let rel_type = relation.edge_type();
    let replace = if relation.is_many() {
        String::new()
    } else {
        format!(
            "OPTIONAL MATCH (n)-[old:{rel_type}]->(other)
             WHERE other.uid <> $target_uid
             DELETE old
             WITH DISTINCT n, t"
        )
    };
    let cypher = format!(
        "MATCH (n:{label} {{uid: $uid}})
         MATCH (t:{target_label} {{uid: $target_uid}})
         {replace}
         MERGE (n)-[:{rel_type}]->(t)
         RETURN t.uid AS uid"
    );

    let q = query(&cypher)
        .param("uid", uid.0.clone())
        .param("target_uid", target.uid.0.clone());

    match fetch_one(txn, q).await? {
        Some(_) => Ok(()),
        None => Err(GraphError::DanglingReference {
            relation,
            uid: target.uid.clone(),
        }),
    }
}

#[async_trait]
impl GraphStore for GraphClient {
    async fn get_internal_id(
        &self,
        xid: &Xid,
        kind: EntityKind,
    ) -> Result<Option<InternalId>, GraphError> {
        self.find_uid(xid, kind).await
    }

    async fn mutate_node(
        &self,
        node: &EntityNode,
        mode: MutationMode,
    ) -> Result<Assigned, GraphError> {
        self.upsert_entity(node, mode).await
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Run a query inside `txn` and return its first row, if any.
async fn fetch_one(txn: &mut Txn, q: Query) -> Result<Option<neo4rs::Row>, GraphError> {
    let mut stream = txn.execute(q).await?;
    Ok(stream.next(txn.handle()).await?)
}

fn with_scalars(q: Query, node: &EntityNode) -> Query {
    q.param("xid", node.xid.0.clone())
        .param("name", node.name.clone())
        .param("type", opt_string(&node.type_name))
        .param("start_time", opt_string(&node.start_time))
        .param("end_time", opt_string(&node.end_time))
}

fn opt_string(opt: &Option<String>) -> String {
    opt.clone().unwrap_or_default()
}
