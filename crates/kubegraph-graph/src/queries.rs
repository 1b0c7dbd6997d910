//! Read operations for the knowledge graph.

use neo4rs::query;

use kubegraph_core::{EntityKind, EntityRef, InternalId, Relation, Xid};

use crate::client::{GraphClient, GraphError};

/// A lightweight record returned from node queries.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NodeRecord {
    pub uid: String,
    pub xid: String,
    pub label: String,
    pub properties: serde_json::Value,
}

impl GraphClient {
    // ── Single Node Lookups ──────────────────────────────────────

    /// Uid bound to `xid` for `kind`, if any.
    pub async fn find_uid(
        &self,
        xid: &Xid,
        kind: EntityKind,
    ) -> Result<Option<InternalId>, GraphError> {
        let label = kind.label();
        let cypher = format!(
            "MATCH (n:{label} {{xid: $xid}})
             RETURN n.uid AS uid LIMIT 1"
        );

        let q = query(&cypher).param("xid", xid.0.clone());

        match self.query_one(q).await? {
            Some(row) => {
                let uid: String = row
                    .get("uid")
                    .map_err(|e| GraphError::Serialization(format!("Failed to read uid: {e}")))?;
                Ok(Some(InternalId(uid)))
            }
            None => Ok(None),
        }
    }

    /// Get a node by kind and uid.
    pub async fn get_node(
        &self,
        kind: EntityKind,
        uid: &InternalId,
    ) -> Result<NodeRecord, GraphError> {
        let label = kind.label();
        let cypher = format!(
            "MATCH (n:{label} {{uid: $uid}})
             RETURN n"
        );

        let q = query(&cypher).param("uid", uid.0.clone());

        match self.query_one(q).await? {
            Some(row) => {
                let node: neo4rs::Node = row.get("n").map_err(|e| {
                    GraphError::Serialization(format!("Failed to deserialize node: {e}"))
                })?;
                Ok(neo4j_node_to_record(&node, kind))
            }
            None => Err(GraphError::NotFound {
                kind,
                uid: uid.clone(),
            }),
        }
    }

    /// Count nodes of a given kind bound to `xid`.
    pub async fn count_by_xid(&self, kind: EntityKind, xid: &Xid) -> Result<i64, GraphError> {
        let label = kind.label();
        let cypher = format!(
            "MATCH (n:{label} {{xid: $xid}})
             RETURN count(n) AS cnt"
        );

        let q = query(&cypher).param("xid", xid.0.clone());

        match self.query_one(q).await? {
            Some(row) => Ok(row.get::<i64>("cnt").unwrap_or(0)),
            None => Ok(0),
        }
    }

    // ── Relationship Queries ─────────────────────────────────────

    /// Stubs for every target of `relation` on the node `uid`.
    pub async fn related(
        &self,
        kind: EntityKind,
        uid: &InternalId,
        relation: Relation,
    ) -> Result<Vec<EntityRef>, GraphError> {
        let label = kind.label();
        let target_label = relation.target_kind().label();
        let rel_type = relation.edge_type();
        let cypher = format!(
            "MATCH (n:{label} {{uid: $uid}})-[:{rel_type}]->(t:{target_label})
             RETURN t.uid AS uid, t.xid AS xid
             ORDER BY xid"
        );

        let q = query(&cypher).param("uid", uid.0.clone());

        let rows = self.query_rows(q).await?;
        let mut results = Vec::with_capacity(rows.len());
        for row in rows {
            let uid: String = row
                .get("uid")
                .map_err(|e| GraphError::Serialization(format!("Failed to read uid: {e}")))?;
            let xid: String = row.get("xid").unwrap_or_default();
            results.push(EntityRef::new(InternalId(uid), Xid(xid)));
        }
        Ok(results)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

fn neo4j_node_to_record(node: &neo4rs::Node, kind: EntityKind) -> NodeRecord {
    let uid: String = node.get("uid").unwrap_or_default();
    let xid: String = node.get("xid").unwrap_or_default();

    let mut props = serde_json::Map::new();
    for key in &["name", "type", "startTime", "endTime"] {
        if let Ok(v) = node.get::<String>(key) {
            props.insert((*key).to_string(), serde_json::Value::String(v));
        }
    }
    if let Ok(flag) = node.get::<bool>(kind.type_tag()) {
        props.insert(kind.type_tag().to_string(), serde_json::Value::Bool(flag));
    }

    NodeRecord {
        uid,
        xid,
        label: kind.label().to_string(),
        properties: serde_json::Value::Object(props),
    }
}
