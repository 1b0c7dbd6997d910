//! Node construction from cluster resources.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;

use kubegraph_core::time::format_timestamp;
use kubegraph_core::{EntityKind, EntityNode, EntityRef, Relation, Xid};

use crate::error::{Result, SyncError};
use crate::owners::{self, SkippedOwner};
use crate::registry::EntityRegistry;
use crate::resource::SyncResource;

/// A node ready to persist, plus the owners left off it.
#[derive(Debug)]
pub struct Built {
    pub node: EntityNode,
    pub skipped_owners: Vec<SkippedOwner>,
}

/// The resource's XID, `namespace:name`.
pub fn resource_xid<R: SyncResource>(resource: &R) -> Result<Xid> {
    let (namespace, name) = namespace_and_name(resource)?;
    Ok(Xid::scoped(namespace, name))
}

fn namespace_and_name<R: SyncResource>(resource: &R) -> Result<(&str, &str)> {
    let meta = resource.meta();
    let name = meta
        .name
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| SyncError::InvalidResource(format!("{} without a name", R::KIND)))?;
    let namespace = meta
        .namespace
        .as_deref()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            SyncError::InvalidResource(format!("{} {name} without a namespace", R::KIND))
        })?;
    Ok((namespace, name))
}

/// Scalar fields only: identity, display name, lifecycle times.
pub fn base_node<R: SyncResource>(resource: &R) -> Result<EntityNode> {
    let (namespace, name) = namespace_and_name(resource)?;
    let meta = resource.meta();

    let mut node = EntityNode::new(
        R::KIND,
        Xid::scoped(namespace, name),
        R::display_name(name),
    );
    node.type_name = Some(R::KIND.type_name().to_string());
    node.start_time = meta.creation_timestamp.as_ref().map(rfc3339);
    node.end_time = meta.deletion_timestamp.as_ref().map(rfc3339);
    Ok(node)
}

fn rfc3339(time: &Time) -> String {
    format_timestamp(&time.0)
}

/// Build the full node, creating its namespace and owners as needed.
pub async fn build_node<R: SyncResource>(registry: &EntityRegistry, resource: &R) -> Result<Built> {
    let mut node = base_node(resource)?;
    let (namespace, _) = namespace_and_name(resource)?;

    let ns_xid = Xid::new(namespace);
    if let Some(uid) = registry
        .create_or_get(EntityKind::Namespace, &ns_xid)
        .await?
    {
        node.link(Relation::Namespace, EntityRef::new(uid, ns_xid));
    }

    let owner_refs = resource
        .meta()
        .owner_references
        .as_deref()
        .unwrap_or_default();
    let relations = R::OWNER_RELATIONS;
    let resolved = owners::resolve_owners(registry, &mut node, namespace, owner_refs, relations);
    let skipped_owners = resolved.await?;

    Ok(Built {
        node,
        skipped_owners,
    })
}
