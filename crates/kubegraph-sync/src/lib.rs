//! kubegraph-sync: mirrors Kubernetes ReplicaSets into the kubegraph inventory.
//!
//! Each observed ReplicaSet becomes a graph node keyed by `namespace:name`.
//! Its namespace and owning Deployment are created on demand and linked by
//! identity-only stubs. Replaying the same events never duplicates a node.

pub mod builder;
pub mod config;
pub mod error;
pub mod locks;
pub mod owners;
pub mod registry;
pub mod resource;
pub mod synchronizer;
pub mod watch;

pub use error::{Result, SyncError};
pub use registry::EntityRegistry;
pub use resource::SyncResource;
pub use synchronizer::{SyncOutcome, Synchronizer};
