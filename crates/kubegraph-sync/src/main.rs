//! CLI entry point for the kubegraph-sync daemon.

use std::sync::Arc;

use clap::Parser;
use k8s_openapi::api::apps::v1::ReplicaSet;
use kube::{Api, Client};
use tracing_subscriber::{fmt, EnvFilter};

use kubegraph_graph::{GraphClient, GraphStore, MemoryGraph};

use kubegraph_sync::config::{AppConfig, StoreBackend};
use kubegraph_sync::watch::{run_once, run_watch};
use kubegraph_sync::Synchronizer;

#[derive(Parser)]
#[command(name = "kubegraph-sync")]
#[command(about = "Mirror Kubernetes ReplicaSets into the kubegraph inventory")]
struct Cli {
    /// Config file prefix (default: kubegraph).
    #[arg(short, long, default_value = "kubegraph")]
    config: String,

    /// Only synchronize this namespace (overrides sync.namespace).
    #[arg(short, long)]
    namespace: Option<String>,

    /// Use the in-memory store instead of Neo4j.
    #[arg(long)]
    memory: bool,

    /// List and synchronize once, then exit.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).json().init();

    let cli = Cli::parse();
    let app_config = AppConfig::load(&cli.config)?;

    let backend = if cli.memory {
        StoreBackend::Memory
    } else {
        app_config.sync.backend
    };
    let store: Arc<dyn GraphStore> = match backend {
        StoreBackend::Neo4j => {
            let graph = GraphClient::connect(&app_config.neo4j).await?;
            graph.ensure_schema().await?;
            Arc::new(graph)
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; nothing will be persisted");
            Arc::new(MemoryGraph::new())
        }
    };
    let sync = Synchronizer::new(store);

    let client = Client::try_default().await?;
    let namespace = cli.namespace.or(app_config.sync.namespace.clone());
    let api: Api<ReplicaSet> = match namespace.as_deref() {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    tracing::info!(
        namespace = namespace.as_deref().unwrap_or("*"),
        ?backend,
        "Starting"
    );

    let policy = app_config.sync.retry_policy();
    if cli.once {
        let totals = run_once(&sync, &api, &policy).await?;
        if totals.failed > 0 {
            anyhow::bail!("{} ReplicaSets failed to synchronize", totals.failed);
        }
    } else {
        run_watch(&sync, api, policy).await;
    }

    Ok(())
}
