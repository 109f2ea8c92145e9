pub mod config;
pub mod topology;
pub mod streaming;
pub mod bucket;
pub mod views;

pub use bucket::Bucket;
pub use config::{ClientConfig, Credentials};
pub use topology::{ConfigSnapshot, NodeSelector, TopologyError, TopologyStore};
pub use streaming::{ConfigEvent, ConfigSource, HttpConfigSource};
