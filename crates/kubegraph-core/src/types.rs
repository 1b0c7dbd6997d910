//! Core domain types for the kubegraph inventory.
//!
//! These types describe cluster objects as graph nodes: what kind of entity a
//! node is, how it is identified, and which other nodes it points at.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::KubegraphError;

// ── Identifiers ───────────────────────────────────────────────────

/// External identifier: the natural key derived from cluster metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Xid(pub String);

impl Xid {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// XID for a namespaced object: `namespace:name`.
    pub fn scoped(namespace: &str, name: &str) -> Self {
        Self(format!("{namespace}:{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by the graph store when a node is first created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InternalId(pub String);

impl InternalId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InternalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Entity Kinds ──────────────────────────────────────────────────

/// Which kind of cluster object a node represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityKind {
    Namespace,
    Deployment,
    ReplicaSet,
    Pod,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Namespace,
        EntityKind::Deployment,
        EntityKind::ReplicaSet,
        EntityKind::Pod,
    ];

    /// Name of the boolean flag marking nodes of this kind.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Namespace => "isNamespace",
            Self::Deployment => "isDeployment",
            Self::ReplicaSet => "isReplicaset",
            Self::Pod => "isPod",
        }
    }

    /// Graph label, identical to the Kubernetes `kind`.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Namespace => "Namespace",
            Self::Deployment => "Deployment",
            Self::ReplicaSet => "ReplicaSet",
            Self::Pod => "Pod",
        }
    }

    /// Lowercase kind stored in a node's `type` field.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Namespace => "namespace",
            Self::Deployment => "deployment",
            Self::ReplicaSet => "replicaset",
            Self::Pod => "pod",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = KubegraphError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.label() == s)
            .ok_or_else(|| KubegraphError::UnknownKind(s.to_string()))
    }
}

// ── Relationships ─────────────────────────────────────────────────

/// A named edge from one entity to another.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Relation {
    Namespace,
    Deployment,
    ReplicaSet,
    Pod,
}

impl Relation {
    /// Kind of the node at the far end of the edge.
    pub fn target_kind(&self) -> EntityKind {
        match self {
            Self::Namespace => EntityKind::Namespace,
            Self::Deployment => EntityKind::Deployment,
            Self::ReplicaSet => EntityKind::ReplicaSet,
            Self::Pod => EntityKind::Pod,
        }
    }

    /// Whether a node may hold several edges of this relation.
    ///
    /// Parent relations are single-valued; `Pod` is the child list.
    pub fn is_many(&self) -> bool {
        matches!(self, Self::Pod)
    }

    /// Cypher relationship type.
    pub fn edge_type(&self) -> &'static str {
        match self {
            Self::Namespace => "NAMESPACE",
            Self::Deployment => "DEPLOYMENT",
            Self::ReplicaSet => "REPLICASET",
            Self::Pod => "POD",
        }
    }
}

/// Identity-only reference to another node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EntityRef {
    pub uid: InternalId,
    pub xid: Xid,
}

impl EntityRef {
    pub fn new(uid: InternalId, xid: Xid) -> Self {
        Self { uid, xid }
    }
}

// ── Nodes ─────────────────────────────────────────────────────────

/// The persisted unit: one graph node plus its outgoing relationship stubs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EntityNode {
    /// `None` until the store assigns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uid: Option<InternalId>,
    pub xid: Xid,
    pub kind: EntityKind,
    pub name: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relations: BTreeMap<Relation, Vec<EntityRef>>,
}

impl EntityNode {
    pub fn new(kind: EntityKind, xid: Xid, name: impl Into<String>) -> Self {
        Self {
            uid: None,
            xid,
            kind,
            name: name.into(),
            type_name: None,
            start_time: None,
            end_time: None,
            relations: BTreeMap::new(),
        }
    }

    /// Minimal placeholder node whose display name is its XID.
    pub fn stub(kind: EntityKind, xid: Xid) -> Self {
        let name = xid.0.clone();
        Self::new(kind, xid, name)
    }

    /// Point a relation at `target`.
    ///
    /// Single-valued relations are replaced; multi-valued ones gain an entry
    /// unless the same uid is already present.
    pub fn link(&mut self, relation: Relation, target: EntityRef) {
        let targets = self.relations.entry(relation).or_default();
        if relation.is_many() {
            if !targets.iter().any(|t| t.uid == target.uid) {
                targets.push(target);
            }
        } else {
            *targets = vec![target];
        }
    }

    /// The single target of a parent relation, if linked.
    pub fn parent(&self, relation: Relation) -> Option<&EntityRef> {
        self.relations.get(&relation).and_then(|t| t.first())
    }

    /// All targets of a relation.
    pub fn related(&self, relation: Relation) -> &[EntityRef] {
        self.relations
            .get(&relation)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Scalar properties as persisted, including the kind's type-tag flag.
    pub fn properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        props.insert(self.kind.type_tag().to_string(), Value::Bool(true));
        props.insert("xid".to_string(), Value::String(self.xid.0.clone()));
        props.insert("name".to_string(), Value::String(self.name.clone()));
        if let Some(t) = &self.type_name {
            props.insert("type".to_string(), Value::String(t.clone()));
        }
        if let Some(t) = &self.start_time {
            props.insert("startTime".to_string(), Value::String(t.clone()));
        }
        if let Some(t) = &self.end_time {
            props.insert("endTime".to_string(), Value::String(t.clone()));
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_ref(uid: &str, xid: &str) -> EntityRef {
        EntityRef::new(InternalId::new(uid), Xid::new(xid))
    }

    #[test]
    fn scoped_xid_joins_namespace_and_name() {
        assert_eq!(Xid::scoped("ns1", "rs1").as_str(), "ns1:rs1");
        assert_ne!(Xid::scoped("a", "b:c"), Xid::scoped("a:b", "d"));
    }

    #[test]
    fn kind_parses_from_kubernetes_kind() {
        assert_eq!(
            "Deployment".parse::<EntityKind>().unwrap(),
            EntityKind::Deployment
        );
        assert!("StatefulSet".parse::<EntityKind>().is_err());
        assert!("deployment".parse::<EntityKind>().is_err());
    }

    #[test]
    fn type_tags_are_distinct() {
        let mut tags: Vec<_> = EntityKind::ALL.iter().map(|k| k.type_tag()).collect();
        tags.sort();
        tags.dedup();
        assert_eq!(tags.len(), EntityKind::ALL.len());
        assert_eq!(EntityKind::ReplicaSet.type_tag(), "isReplicaset");
    }

    #[test]
    fn stub_is_named_after_xid() {
        let node = EntityNode::stub(EntityKind::Deployment, Xid::new("ns1:dep1"));
        assert_eq!(node.name, "ns1:dep1");
        assert!(node.uid.is_none());
        assert!(node.type_name.is_none());
        assert!(node.relations.is_empty());
    }

    #[test]
    fn parent_link_replaces_previous_target() {
        let mut node = EntityNode::stub(EntityKind::ReplicaSet, Xid::new("ns1:rs1"));
        node.link(Relation::Deployment, stub_ref("0x1", "ns1:a"));
        node.link(Relation::Deployment, stub_ref("0x2", "ns1:b"));
        assert_eq!(node.related(Relation::Deployment).len(), 1);
        let parent = node.parent(Relation::Deployment).unwrap();
        assert_eq!(parent.xid.as_str(), "ns1:b");
    }

    #[test]
    fn child_links_accumulate_without_duplicates() {
        let mut node = EntityNode::stub(EntityKind::ReplicaSet, Xid::new("ns1:rs1"));
        node.link(Relation::Pod, stub_ref("0x1", "ns1:p1"));
        node.link(Relation::Pod, stub_ref("0x2", "ns1:p2"));
        node.link(Relation::Pod, stub_ref("0x1", "ns1:p1"));
        assert_eq!(node.related(Relation::Pod).len(), 2);
        assert!(node.related(Relation::Namespace).is_empty());
    }

    #[test]
    fn properties_carry_type_tag_and_omit_unset_times() {
        let mut node = EntityNode::new(
            EntityKind::ReplicaSet,
            Xid::new("ns1:rs1"),
            "replicaset-rs1",
        );
        node.start_time = Some("2024-01-02T03:04:05Z".to_string());
        let props = node.properties();
        assert_eq!(props.get("isReplicaset"), Some(&Value::Bool(true)));
        assert_eq!(
            props.get("startTime").and_then(Value::as_str),
            Some("2024-01-02T03:04:05Z")
        );
        assert!(!props.contains_key("endTime"));
    }

    #[test]
    fn node_json_uses_predicate_names() {
        let mut node = EntityNode::new(
            EntityKind::ReplicaSet,
            Xid::new("ns1:rs1"),
            "replicaset-rs1",
        );
        node.type_name = Some("replicaset".to_string());
        node.link(Relation::Deployment, stub_ref("0x1", "ns1:dep1"));
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("\"type\":\"replicaset\""));
        assert!(json.contains("\"deployment\":["));
        assert!(!json.contains("endTime"));
    }
}
