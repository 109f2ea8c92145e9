//! Topology errors
//!
//! Parse failures are contained inside the listener; connection failures
//! surface to the owning `Bucket`; selection failures go to the caller.

use super::snapshot::BucketType;

/// Error type for topology parsing, streaming and node selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// A configuration document failed structural validation
    MalformedConfig(String),
    /// The streaming connection could not be opened, failed, or ended
    StreamDisconnected(String),
    /// Node selection requested against an empty node list
    NoNodesAvailable,
    /// Key-addressed selection requested on a bucket without a vbucket map
    UnsupportedBucketType(BucketType),
    /// The snapshot names a vbucket hash the selector does not implement
    UnsupportedHashAlgorithm(String),
    /// The selected node exposes no view query API
    NoQueryEndpoint(String),
    /// A view query response lacks the expected shape
    MalformedViewResponse(String),
    /// Bytes on the stream that can never become valid JSON
    Decode(String),
    /// One-shot HTTP request failed
    Http(String),
}

impl std::fmt::Display for TopologyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TopologyError::MalformedConfig(msg) => write!(f, "Malformed config: {}", msg),
            TopologyError::StreamDisconnected(reason) => {
                write!(f, "Config stream disconnected: {}", reason)
            }
            TopologyError::NoNodesAvailable => write!(f, "No nodes available"),
            TopologyError::UnsupportedBucketType(bucket_type) => {
                write!(f, "Key routing not supported for {} buckets", bucket_type)
            }
            TopologyError::UnsupportedHashAlgorithm(name) => {
                write!(f, "Unsupported vbucket hash algorithm: {}", name)
            }
            TopologyError::NoQueryEndpoint(host) => {
                write!(f, "Node {} has no couchApiBase", host)
            }
            TopologyError::MalformedViewResponse(msg) => {
                write!(f, "Malformed view response: {}", msg)
            }
            TopologyError::Decode(msg) => write!(f, "Undecodable config stream data: {}", msg),
            TopologyError::Http(msg) => write!(f, "HTTP error: {}", msg),
        }
    }
}

impl std::error::Error for TopologyError {}

impl From<reqwest::Error> for TopologyError {
    fn from(e: reqwest::Error) -> Self {
        TopologyError::Http(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TopologyError>;
