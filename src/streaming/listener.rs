//! Config Stream Listener
//!
//! An actor that owns the streaming connection for the lifetime of a
//! bucket. It is the only writer of the `TopologyStore`.
//!
//! ## Architecture
//!
//! ```text
//! ConfigSource ──chunks──► JsonFramer ──document──► ConfigSnapshot
//!                                                        │
//!              ConfigEvent ◄── TopologyStore::replace() ◄┘
//! ```
//!
//! A rejected document never stops the listener; the store keeps the last
//! good snapshot. Losing the connection ends the actor with
//! `StreamDisconnected`; reconnecting is left to the owner.
//!
//! Events go out on a bounded broadcast channel. With no subscriber they
//! are dropped, and a subscriber that falls more than `EVENT_CAPACITY`
//! behind sees `Lagged`, so the store stays the only long-term holder of
//! a snapshot.

use super::framer::{Frame, JsonFramer};
use super::source::ConfigSource;
use crate::topology::{ConfigSnapshot, Result, TopologyError, TopologyStore};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Events buffered per subscriber before it starts lagging
pub const EVENT_CAPACITY: usize = 64;

/// Notifications emitted by the listener, in stream order
#[derive(Debug, Clone)]
pub enum ConfigEvent {
    /// A snapshot was published to the store
    Applied {
        revision: u64,
        snapshot: Arc<ConfigSnapshot>,
    },
    /// A document or byte run was discarded; the listener keeps going
    Rejected(TopologyError),
    /// The connection is gone; no further events follow
    Disconnected(TopologyError),
}

/// Counters readable while the listener runs
#[derive(Debug, Default)]
pub struct StreamStats {
    bytes_received: AtomicU64,
    documents_applied: AtomicU64,
    documents_rejected: AtomicU64,
    decode_errors: AtomicU64,
}

impl StreamStats {
    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn documents_applied(&self) -> u64 {
        self.documents_applied.load(Ordering::Relaxed)
    }

    pub fn documents_rejected(&self) -> u64 {
        self.documents_rejected.load(Ordering::Relaxed)
    }

    pub fn decode_errors(&self) -> u64 {
        self.decode_errors.load(Ordering::Relaxed)
    }
}

pub struct ConfigStreamListener<S: ConfigSource> {
    source: Arc<S>,
    store: Arc<TopologyStore>,
    framer: JsonFramer,
    max_document_bytes: usize,
    events: broadcast::Sender<ConfigEvent>,
    stats: Arc<StreamStats>,
}

impl<S: ConfigSource> ConfigStreamListener<S> {
    fn new(
        source: Arc<S>,
        store: Arc<TopologyStore>,
        max_document_bytes: usize,
        events: broadcast::Sender<ConfigEvent>,
    ) -> Self {
        ConfigStreamListener {
            source,
            store,
            framer: JsonFramer::new(),
            max_document_bytes,
            events,
            stats: Arc::new(StreamStats::default()),
        }
    }

    /// Run until shutdown (`Ok`) or connection loss (`StreamDisconnected`).
    /// Dropping the shutdown sender counts as shutdown.
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) -> Result<()> {
        // The endpoint comes from the bootstrap snapshot; later documents
        // only change the topology, not the connection.
        let endpoint = self.store.current().streaming_endpoint().clone();
        let source = self.source.clone();
        info!("Config listener connecting to {}", endpoint);

        let opened = tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                info!("Config listener stopped before connecting");
                return Ok(());
            }
            opened = source.open_stream(&endpoint, self.store.credentials()) => opened,
        };
        let mut chunks = match opened {
            Ok(chunks) => chunks,
            Err(e) => return self.disconnect(disconnect_reason(e)),
        };

        loop {
            let next = tokio::select! {
                biased;
                _ = &mut shutdown_rx => {
                    info!(
                        "Config listener shutting down ({} bytes pending)",
                        self.framer.buffered()
                    );
                    return Ok(());
                }
                next = chunks.next() => next,
            };

            match next {
                Some(Ok(bytes)) => self.on_chunk(&bytes)?,
                Some(Err(e)) => return self.disconnect(disconnect_reason(e)),
                None => return self.disconnect("server closed the stream".to_string()),
            }
        }
    }

    fn on_chunk(&mut self, bytes: &[u8]) -> Result<()> {
        self.stats
            .bytes_received
            .fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.framer.extend(bytes);

        loop {
            match self.framer.next_frame() {
                Frame::Document(document) => self.apply(&document),
                Frame::Incomplete => break,
                Frame::Invalid(msg) => {
                    warn!("Discarding undecodable config stream data: {}", msg);
                    self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                    let _ = self
                        .events
                        .send(ConfigEvent::Rejected(TopologyError::Decode(msg)));
                }
            }
        }

        if self.framer.buffered() > self.max_document_bytes {
            return self.disconnect(format!(
                "pending config document exceeds {} bytes",
                self.max_document_bytes
            ));
        }
        if self.framer.buffered() > 0 {
            debug!("Config listener waiting, {} bytes buffered", self.framer.buffered());
        }
        Ok(())
    }

    fn apply(&mut self, document: &serde_json::Value) {
        // Always resolve against the pool URI, never a previous snapshot.
        match ConfigSnapshot::from_document(document, self.store.pool_uri()) {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                let revision = self.store.replace_arc(snapshot.clone());
                self.stats.documents_applied.fetch_add(1, Ordering::Relaxed);
                info!(
                    "Applied config revision {} for bucket '{}' ({} nodes)",
                    revision,
                    snapshot.name(),
                    snapshot.nodes().len()
                );
                let _ = self.events.send(ConfigEvent::Applied { revision, snapshot });
            }
            Err(e) => {
                warn!("Rejected config update, keeping last good snapshot: {}", e);
                self.stats.documents_rejected.fetch_add(1, Ordering::Relaxed);
                let _ = self.events.send(ConfigEvent::Rejected(e));
            }
        }
    }

    fn disconnect(&self, reason: String) -> Result<()> {
        warn!("Config stream disconnected: {}", reason);
        let error = TopologyError::StreamDisconnected(reason);
        let _ = self.events.send(ConfigEvent::Disconnected(error.clone()));
        Err(error)
    }
}

fn disconnect_reason(error: TopologyError) -> String {
    match error {
        TopologyError::StreamDisconnected(reason) => reason,
        other => other.to_string(),
    }
}

/// Owner's handle to a running listener
pub struct ListenerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
    stats: Arc<StreamStats>,
    events: broadcast::Sender<ConfigEvent>,
}

impl ListenerHandle {
    /// Stop reading and release the connection. Returns the listener's exit
    /// status: `Ok` if it was still running, `StreamDisconnected` if the
    /// connection had already been lost.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.join().await
    }

    /// Wait for the listener to exit on its own
    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(TopologyError::StreamDisconnected(format!(
                "listener task failed: {}",
                e
            ))),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn stats(&self) -> Arc<StreamStats> {
        self.stats.clone()
    }

    /// Receive events published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.events.subscribe()
    }
}

/// Spawn a listener on the current tokio runtime. The returned receiver
/// is subscribed before the task starts, so it sees every event; drop it
/// if events are not wanted.
pub fn spawn_listener<S: ConfigSource>(
    source: Arc<S>,
    store: Arc<TopologyStore>,
    max_document_bytes: usize,
) -> (ListenerHandle, broadcast::Receiver<ConfigEvent>) {
    let (events_tx, events_rx) = broadcast::channel(EVENT_CAPACITY);
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let listener = ConfigStreamListener::new(source, store, max_document_bytes, events_tx.clone());
    let stats = listener.stats.clone();
    let task = tokio::spawn(listener.run(shutdown_rx));

    let handle = ListenerHandle {
        shutdown_tx: Some(shutdown_tx),
        task,
        stats,
        events: events_tx,
    };
    (handle, events_rx)
}
