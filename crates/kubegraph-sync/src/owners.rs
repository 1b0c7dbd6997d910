//! Owner reference resolution.
//!
//! Owner references are sorted into relationship classes. Each class holds
//! at most one owner: the controller if there is exactly one, otherwise the
//! first listed. Everything else is reported as skipped, never resolved.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

use kubegraph_core::{EntityKind, EntityNode, EntityRef, Relation, Xid};

use crate::error::Result;
use crate::registry::EntityRegistry;

/// Why an owner reference did not become an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The owner's kind has no relation on this resource.
    UnrecognizedKind,
    /// Another owner of the same class was chosen.
    DuplicateOwner,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOwner {
    pub kind: String,
    pub name: String,
    pub reason: SkipReason,
}

impl SkippedOwner {
    fn new(owner: &OwnerReference, reason: SkipReason) -> Self {
        Self {
            kind: owner.kind.clone(),
            name: owner.name.clone(),
            reason,
        }
    }
}

/// Owners chosen per relation, in the order the relations were first seen.
#[derive(Debug, Default)]
pub struct OwnerSelection<'a> {
    pub selected: Vec<(Relation, &'a OwnerReference)>,
    pub skipped: Vec<SkippedOwner>,
}

/// The relation among `relations` whose target has Kubernetes kind `kind`.
fn relation_for(kind: &str, relations: &[Relation]) -> Option<Relation> {
    let kind = kind.parse::<EntityKind>().ok()?;
    relations.iter().copied().find(|r| r.target_kind() == kind)
}

/// Pick at most one owner per relation from `owners`.
pub fn select_owners<'a>(
    owners: &'a [OwnerReference],
    relations: &[Relation],
) -> OwnerSelection<'a> {
    let mut classes: Vec<(Relation, Vec<&'a OwnerReference>)> = Vec::new();
    let mut selection = OwnerSelection::default();

    for owner in owners {
        match relation_for(&owner.kind, relations) {
            Some(relation) => match classes.iter_mut().find(|(r, _)| *r == relation) {
                Some((_, members)) => members.push(owner),
                None => classes.push((relation, vec![owner])),
            },
            None => selection
                .skipped
                .push(SkippedOwner::new(owner, SkipReason::UnrecognizedKind)),
        }
    }

    for (relation, members) in classes {
        let controllers: Vec<usize> = members
            .iter()
            .enumerate()
            .filter(|(_, o)| o.controller == Some(true))
            .map(|(i, _)| i)
            .collect();
        let chosen = if controllers.len() == 1 { controllers[0] } else { 0 };

        for (i, owner) in members.into_iter().enumerate() {
            if i == chosen {
                selection.selected.push((relation, owner));
            } else {
                selection
                    .skipped
                    .push(SkippedOwner::new(owner, SkipReason::DuplicateOwner));
            }
        }
    }

    selection
}

/// Create-or-get every selected owner and link it onto `node`.
///
/// Returns the owners that were skipped; each one is also logged.
pub async fn resolve_owners(
    registry: &EntityRegistry,
    node: &mut EntityNode,
    namespace: &str,
    owners: &[OwnerReference],
    relations: &[Relation],
) -> Result<Vec<SkippedOwner>> {
    let selection = select_owners(owners, relations);

    for skipped in &selection.skipped {
        match skipped.reason {
            SkipReason::UnrecognizedKind => tracing::warn!(
                xid = %node.xid,
                owner_kind = %skipped.kind,
                owner_name = %skipped.name,
                "Unknown owner type for {}", node.kind
            ),
            SkipReason::DuplicateOwner => tracing::warn!(
                xid = %node.xid,
                owner_kind = %skipped.kind,
                owner_name = %skipped.name,
                "Ignoring additional owner of the same kind"
            ),
        }
    }

    for (relation, owner) in selection.selected {
        let xid = Xid::scoped(namespace, &owner.name);
        if let Some(uid) = registry.create_or_get(relation.target_kind(), &xid).await? {
            node.link(relation, EntityRef::new(uid, xid));
        }
    }

    Ok(selection.skipped)
}
