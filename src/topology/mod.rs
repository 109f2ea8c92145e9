//! Cluster Topology
//!
//! Parsed bucket configuration, the lock-free store holding the current
//! snapshot, and node selection over a snapshot.
//!
//! ```text
//! config document → ConfigSnapshot → TopologyStore::replace()
//!                                          ↓
//!                        current() → NodeSelector::pick_for_key()
//! ```

pub mod error;
pub mod selector;
pub mod snapshot;
pub mod store;

pub use error::{Result, TopologyError};
pub use selector::{HashAlgorithm, NodeSelector};
pub use snapshot::{BucketType, ConfigSnapshot, Node, NodeStatus, VBucket, VBucketServerMap};
pub use store::TopologyStore;
