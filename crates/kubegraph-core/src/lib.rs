//! kubegraph-core: Shared identity and node types for the kubegraph inventory.
//!
//! This crate provides the foundational types used across all kubegraph components:
//! - Entity kinds and their type tags (ReplicaSet, Deployment, Namespace, Pod)
//! - External and internal identifiers
//! - Entity nodes and relationship stubs
//! - Timestamp formatting for lifecycle fields
//! - Common error types

pub mod error;
pub mod time;
pub mod types;

pub use error::KubegraphError;
pub use types::{EntityKind, EntityNode, EntityRef, InternalId, Relation, Xid};
