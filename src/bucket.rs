//! Bucket
//!
//! The client-side owner of a bucket's topology: builds the bootstrap
//! snapshot, keeps a config listener running in the background, and tears
//! it down on close. Request paths only ever touch `TopologyStore::current`.

use crate::config::ClientConfig;
use crate::streaming::{spawn_listener, ConfigEvent, ConfigSource, HttpConfigSource, ListenerHandle, StreamStats};
use crate::topology::{ConfigSnapshot, Node, NodeSelector, Result, TopologyStore};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub struct Bucket {
    store: Arc<TopologyStore>,
    listener: Option<ListenerHandle>,
    stats: Arc<StreamStats>,
}

impl Bucket {
    /// Fetch the bucket's config over HTTP and start listening for updates.
    pub async fn bootstrap(config: &ClientConfig) -> Result<Self> {
        let source = HttpConfigSource::new(config)?;
        let uri = config.bucket_url()?;
        info!("Fetching bootstrap config from {}", uri);
        let document = source.fetch_document(&uri, config.credentials.as_ref()).await?;
        Self::connect(config, &document, Arc::new(source))
    }

    /// Start from an already-decoded bootstrap document.
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `MalformedConfig` if the pool URI or the bootstrap document
    /// is invalid; no listener is started in that case.
    pub fn connect<S: ConfigSource>(
        config: &ClientConfig,
        bootstrap: &Value,
        source: Arc<S>,
    ) -> Result<Self> {
        let pool_uri = config.pool_url()?;
        let snapshot = ConfigSnapshot::from_document(bootstrap, &pool_uri)?;
        info!(
            "Bootstrapped bucket '{}' ({}, {} nodes)",
            snapshot.name(),
            snapshot.bucket_type(),
            snapshot.nodes().len()
        );

        let store = Arc::new(TopologyStore::new(pool_uri, snapshot, config.credentials.clone()));
        // Nobody is subscribed yet; events are only kept for subscribers.
        let (listener, _) = spawn_listener(source, store.clone(), config.max_document_bytes);
        let stats = listener.stats();

        Ok(Bucket {
            store,
            listener: Some(listener),
            stats,
        })
    }

    pub fn store(&self) -> &Arc<TopologyStore> {
        &self.store
    }

    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.store.current()
    }

    /// Random live node, e.g. for view queries
    pub fn next_node(&self) -> Result<Node> {
        let snapshot = self.store.current();
        NodeSelector::pick_any(&snapshot).cloned()
    }

    /// Active server address for a key
    pub fn server_for_key(&self, key: &[u8]) -> Result<String> {
        let snapshot = self.store.current();
        NodeSelector::pick_for_key(&snapshot, key).map(str::to_string)
    }

    /// Listener notifications published from now on. `None` after close.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ConfigEvent>> {
        self.listener.as_ref().map(ListenerHandle::subscribe)
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        self.stats.clone()
    }

    /// False once the listener has exited (disconnect or close)
    pub fn is_listening(&self) -> bool {
        self.listener.as_ref().is_some_and(|l| !l.is_finished())
    }

    /// Stop the listener and release the connection. Returns the listener's
    /// exit status; `StreamDisconnected` means the topology was already
    /// stale before close. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        match self.listener.take() {
            Some(listener) => {
                let result = listener.shutdown().await;
                info!("Closed bucket '{}'", self.store.current().name());
                result
            }
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streaming::{ChunkedSource, StreamEnd};
    use crate::topology::TopologyError;
    use serde_json::json;
    use std::time::Duration;

    fn bootstrap_document() -> Value {
        json!({
            "name": "default",
            "bucketType": "membase",
            "uri": "/pools/default/buckets/default",
            "streamingUri": "/pools/default/bucketsStreaming/default",
            "nodes": [{ "status": "healthy", "hostname": "node1:8091", "ports": { "direct": 11210 } }],
            "vBucketServerMap": {
                "hashAlgorithm": "CRC",
                "numReplicas": 0,
                "serverList": ["node1:11210"],
                "vBucketMap": [[0]]
            }
        })
    }

    fn config() -> ClientConfig {
        ClientConfig {
            pool_uri: "http://127.0.0.1:8091/pools/default".to_string(),
            ..ClientConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_and_route() {
        let source = Arc::new(ChunkedSource::new(Vec::new(), StreamEnd::Hold));
        let mut bucket = Bucket::connect(&config(), &bootstrap_document(), source).unwrap();

        assert_eq!(bucket.server_for_key(b"any-key").unwrap(), "node1:11210");
        assert_eq!(bucket.next_node().unwrap().host, "node1");
        assert!(bucket.is_listening());

        assert!(bucket.close().await.is_ok());
        assert!(!bucket.is_listening());
        assert!(bucket.close().await.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_bootstrap_rejected() {
        let source = Arc::new(ChunkedSource::new(Vec::new(), StreamEnd::Hold));
        let mut document = bootstrap_document();
        document["nodes"] = json!([]);
        assert!(matches!(
            Bucket::connect(&config(), &document, source.clone()),
            Err(TopologyError::MalformedConfig(_))
        ));
        assert!(source.opened().is_empty());
    }

    #[tokio::test]
    async fn test_close_reports_earlier_disconnect() {
        let source = Arc::new(ChunkedSource::new(Vec::new(), StreamEnd::Close));
        let mut bucket = Bucket::connect(&config(), &bootstrap_document(), source).unwrap();
        let mut events = bucket.subscribe().unwrap();

        assert!(matches!(events.recv().await, Ok(ConfigEvent::Disconnected(_))));
        assert!(matches!(bucket.close().await, Err(TopologyError::StreamDisconnected(_))));
        assert!(bucket.subscribe().is_none());
        // Topology stays usable, just stale.
        assert_eq!(bucket.server_for_key(b"k").unwrap(), "node1:11210");
    }

    #[tokio::test]
    async fn test_replaced_snapshots_are_released() {
        let updates: Vec<u8> = (0..500)
            .flat_map(|i| {
                let mut document = bootstrap_document();
                document["name"] = json!(format!("gen-{}", i));
                serde_json::to_vec(&document).unwrap()
            })
            .collect();
        let source = Arc::new(ChunkedSource::split_at(&updates, &[updates.len() / 2], StreamEnd::Hold));
        let mut bucket = Bucket::connect(&config(), &bootstrap_document(), source).unwrap();
        let bootstrap = bucket.current();

        let mut events = bucket.subscribe().unwrap();
        let early = loop {
            match events.recv().await {
                Ok(ConfigEvent::Applied { snapshot, .. }) => break snapshot,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                other => panic!("unexpected event {:?}", other),
            }
        };
        assert_ne!(early.name(), "gen-499");
        drop(events);

        while bucket.store().revision() < 500 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        assert_eq!(bucket.current().name(), "gen-499");
        assert_eq!(Arc::strong_count(&early), 1);
        assert_eq!(Arc::strong_count(&bootstrap), 1);

        assert!(bucket.close().await.is_ok());
    }
}
