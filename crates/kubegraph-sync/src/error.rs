//! Error types for the kubegraph-sync crate.

use kubegraph_core::{EntityKind, Xid};
use kubegraph_graph::GraphError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid resource: {0}")]
    InvalidResource(String),

    /// A related entity could not be resolved or created. The resource that
    /// needed it is abandoned rather than persisted with a broken edge.
    #[error("Failed to bootstrap {kind} {xid}: {source}")]
    RelationBootstrap {
        kind: EntityKind,
        xid: Xid,
        #[source]
        source: GraphError,
    },

    #[error("Graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),
}

impl SyncError {
    /// Whether repeating the same synchronization may succeed.
    ///
    /// Top-level store and API failures are retryable. Bad input and failed
    /// relationship bootstraps are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Graph(_) | Self::Kube(_))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
