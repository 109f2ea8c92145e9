//! Streaming Config Updates
//!
//! The cluster pushes a new bucket config over one long-lived HTTP body
//! whenever topology changes. This module frames that body into documents
//! and publishes each valid one to the `TopologyStore`.

pub mod framer;
pub mod listener;
pub mod source;

pub use framer::{Frame, JsonFramer};
pub use listener::{spawn_listener, ConfigEvent, EVENT_CAPACITY, ConfigStreamListener, ListenerHandle, StreamStats};
pub use source::{ChunkStream, ChunkedSource, ConfigSource, HttpConfigSource, StreamEnd};
