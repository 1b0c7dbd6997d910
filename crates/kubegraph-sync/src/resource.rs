//! Cluster resources that can be synchronized into the graph.

use k8s_openapi::api::apps::v1::ReplicaSet;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use kubegraph_core::{EntityKind, Relation};

/// A namespaced Kubernetes object with a graph counterpart.
///
/// Implementations only describe the mapping; building and persisting the
/// node is shared (see [`crate::builder`] and [`crate::Synchronizer`]).
pub trait SyncResource {
    /// Kind of the node this resource becomes.
    const KIND: EntityKind;

    /// Relations an owner reference may fill, matched on the owner's `kind`.
    const OWNER_RELATIONS: &'static [Relation];

    fn meta(&self) -> &ObjectMeta;

    /// Display name stored on the node.
    fn display_name(name: &str) -> String {
        format!("{}-{name}", Self::KIND.type_name())
    }
}

impl SyncResource for ReplicaSet {
    const KIND: EntityKind = EntityKind::ReplicaSet;
    const OWNER_RELATIONS: &'static [Relation] = &[Relation::Deployment];

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }
}
