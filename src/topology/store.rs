//! Topology Store
//!
//! Single-slot holder for the current `ConfigSnapshot`. Reads are lock-free
//! (`ArcSwap::load_full`); `replace` is a pointer swap serialised against
//! other writers, so a second listener could be added without breaking the
//! ordering guarantee.

use super::snapshot::ConfigSnapshot;
use crate::config::Credentials;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use reqwest::Url;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct TopologyStore {
    current: ArcSwap<ConfigSnapshot>,
    /// Number of successful `replace` calls (bootstrap = 0)
    revision: AtomicU64,
    writer: Mutex<()>,
    /// Resolution base for every document received on the stream
    pool_uri: Url,
    credentials: Option<Credentials>,
}

impl TopologyStore {
    pub fn new(pool_uri: Url, bootstrap: ConfigSnapshot, credentials: Option<Credentials>) -> Self {
        TopologyStore {
            current: ArcSwap::from_pointee(bootstrap),
            revision: AtomicU64::new(0),
            writer: Mutex::new(()),
            pool_uri,
            credentials,
        }
    }

    /// Latest published snapshot. Never blocks; the returned `Arc` stays
    /// valid for the caller even if a newer snapshot is published meanwhile.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Publish a new snapshot. Visible to every `current()` call that starts
    /// after this returns.
    pub fn replace(&self, snapshot: ConfigSnapshot) -> u64 {
        self.replace_arc(Arc::new(snapshot))
    }

    pub(crate) fn replace_arc(&self, snapshot: Arc<ConfigSnapshot>) -> u64 {
        let _writer = self.writer.lock();
        self.current.store(snapshot);
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    pub fn pool_uri(&self) -> &Url {
        &self.pool_uri
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}
