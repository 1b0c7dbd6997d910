//! kubegraph-graph: graph store backends for the kubegraph inventory.
//!
//! The synchronizer only talks to the [`GraphStore`] trait. Two backends
//! implement it: [`GraphClient`] over Neo4j, and [`MemoryGraph`], an
//! in-process store used for dry runs and tests.

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig, GraphError};
pub use memory::MemoryGraph;
pub use store::{Assigned, GraphStore, MutationMode};
