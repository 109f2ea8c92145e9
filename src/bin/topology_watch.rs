//! Topology watcher
//!
//! Bootstraps a bucket from the cluster, then logs every topology change
//! pushed on the streaming endpoint until Ctrl+C or disconnect.
//!
//! ## Usage
//!
//! ```bash
//! COUCHBASE_POOL_URI=http://10.0.0.1:8091/pools/default \
//! COUCHBASE_BUCKET=default \
//! COUCHBASE_USERNAME=Administrator COUCHBASE_PASSWORD=password \
//! RUST_LOG=info \
//! topology-watch
//! ```
//!
//! Configuration variables are documented in `couchbase_topology::config`.

use couchbase_topology::topology::NodeSelector;
use couchbase_topology::{Bucket, ClientConfig, ConfigEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env();
    info!(
        "Watching bucket '{}' via {} (auth: {})",
        config.bucket,
        config.pool_uri,
        config.credentials.is_some()
    );

    let mut bucket = Bucket::bootstrap(&config).await?;
    let mut events = bucket
        .subscribe()
        .ok_or("listener already stopped")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(ConfigEvent::Applied { revision, snapshot }) => {
                    let servers = snapshot.server_list().map_or(0, |s| s.len());
                    let vbuckets = snapshot.vbucket_map().map_or(0, |v| v.len());
                    info!(
                        "revision {}: {} nodes, {} servers, {} vbuckets",
                        revision,
                        snapshot.nodes().len(),
                        servers,
                        vbuckets
                    );
                    for node in snapshot.nodes() {
                        info!("  {} {:?} ports={:?}", node.host, node.status, node.ports);
                    }
                    if let Ok(node) = NodeSelector::pick_any(&snapshot) {
                        info!("  query node: {}", node.host);
                    }
                }
                Ok(ConfigEvent::Rejected(e)) => warn!("Ignored update: {}", e),
                Ok(ConfigEvent::Disconnected(e)) => {
                    error!("{}", e);
                    break;
                }
                Err(RecvError::Lagged(missed)) => warn!("Missed {} events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    let stats = bucket.stats();
    let result = bucket.close().await;
    info!(
        "Received {} bytes, applied {} updates, rejected {}, decode errors {}",
        stats.bytes_received(),
        stats.documents_applied(),
        stats.documents_rejected(),
        stats.decode_errors()
    );
    result?;
    Ok(())
}
