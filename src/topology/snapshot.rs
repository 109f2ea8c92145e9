//! Configuration Snapshot
//!
//! One immutable, validated view of a bucket's topology, built from a single
//! decoded configuration document. Construction is pure: it either yields a
//! snapshot that satisfies every invariant or fails with `MalformedConfig`.
//!
//! ## Document shape
//!
//! ```text
//! {
//!   "name": "default",
//!   "bucketType": "membase",
//!   "uri": "/pools/default/buckets/default",
//!   "streamingUri": "/pools/default/bucketsStreaming/default",
//!   "nodes": [{ "status": "healthy", "hostname": "10.0.0.1:8091",
//!               "ports": { "direct": 11210, "proxy": 11211 },
//!               "couchApiBase": "http://10.0.0.1:8092/default" }],
//!   "vBucketServerMap": { "hashAlgorithm": "CRC", "numReplicas": 1,
//!                         "serverList": ["10.0.0.1:11210"],
//!                         "vBucketMap": [[0, -1]] }
//! }
//! ```

use super::error::{Result, TopologyError};
use reqwest::Url;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Wire name of the persistent bucket type
const PERSISTENT_BUCKET_TYPE: &str = "membase";

/// Bucket storage model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketType {
    /// Cache-style bucket with no vbucket map
    MemoryOnly,
    /// Disk-backed bucket with vbucket-based replication
    Persistent,
}

impl BucketType {
    fn from_wire(value: Option<&str>) -> Self {
        match value {
            Some(PERSISTENT_BUCKET_TYPE) => BucketType::Persistent,
            _ => BucketType::MemoryOnly,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BucketType::MemoryOnly => "memcached",
            BucketType::Persistent => PERSISTENT_BUCKET_TYPE,
        }
    }
}

impl std::fmt::Display for BucketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cluster-reported health of a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeStatus {
    Healthy,
    Warmup,
    Unhealthy,
    Other(String),
}

impl NodeStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "healthy" => NodeStatus::Healthy,
            "warmup" => NodeStatus::Warmup,
            "unhealthy" => NodeStatus::Unhealthy,
            other => NodeStatus::Other(other.to_string()),
        }
    }

    /// Whether the node should receive traffic
    pub fn is_live(&self) -> bool {
        matches!(self, NodeStatus::Healthy)
    }
}

/// A cluster node as advertised in the config document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub status: NodeStatus,
    /// Hostname without the admin port suffix
    pub host: String,
    /// Service name -> port
    pub ports: BTreeMap<String, u16>,
    /// Base URI of the node's view query API
    pub couch_api_base: Option<Url>,
}

impl Node {
    pub fn port(&self, service: &str) -> Option<u16> {
        self.ports.get(service).copied()
    }
}

/// One vbucket: the active server index followed by replica slots.
/// A replica slot is `None` when the cluster reports `-1` (unassigned).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VBucket {
    pub active: usize,
    pub replicas: Vec<Option<usize>>,
}

/// Persistent-bucket routing data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VBucketServerMap {
    hash_algorithm: String,
    num_replicas: usize,
    server_list: Vec<String>,
    vbuckets: Vec<VBucket>,
}

impl VBucketServerMap {
    pub fn hash_algorithm(&self) -> &str {
        &self.hash_algorithm
    }

    pub fn num_replicas(&self) -> usize {
        self.num_replicas
    }

    pub fn server_list(&self) -> &[String] {
        &self.server_list
    }

    pub fn vbuckets(&self) -> &[VBucket] {
        &self.vbuckets
    }

    /// Address of a server by index. Indices are validated at construction.
    pub fn server(&self, index: usize) -> Option<&str> {
        self.server_list.get(index).map(String::as_str)
    }

    fn from_value(value: Option<&Value>) -> Result<Self> {
        let map = value
            .and_then(Value::as_object)
            .ok_or_else(|| malformed("persistent bucket without vBucketServerMap"))?;

        let hash_algorithm = map
            .get("hashAlgorithm")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("vBucketServerMap.hashAlgorithm missing"))?
            .to_string();

        let num_replicas = map
            .get("numReplicas")
            .and_then(Value::as_u64)
            .ok_or_else(|| malformed("vBucketServerMap.numReplicas missing"))?
            as usize;

        let server_list = map
            .get("serverList")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("vBucketServerMap.serverList missing"))?
            .iter()
            .map(|server| {
                server
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| malformed("serverList entry is not a string"))
            })
            .collect::<Result<Vec<_>>>()?;

        let raw_vbuckets = map
            .get("vBucketMap")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("vBucketServerMap.vBucketMap missing"))?;
        if raw_vbuckets.is_empty() {
            return Err(malformed("vBucketMap is empty"));
        }

        let vbuckets = raw_vbuckets
            .iter()
            .enumerate()
            .map(|(vbid, entry)| parse_vbucket(vbid, entry, server_list.len()))
            .collect::<Result<Vec<_>>>()?;

        Ok(VBucketServerMap {
            hash_algorithm,
            num_replicas,
            server_list,
            vbuckets,
        })
    }
}

fn parse_vbucket(vbid: usize, entry: &Value, server_count: usize) -> Result<VBucket> {
    let indices = entry
        .as_array()
        .ok_or_else(|| malformed(format!("vbucket {} is not an array", vbid)))?;

    let mut slots = indices.iter().map(|index| {
        index
            .as_i64()
            .ok_or_else(|| malformed(format!("vbucket {} has a non-integer index", vbid)))
    });

    let active = match slots.next() {
        Some(index) => {
            let index = index?;
            usize::try_from(index)
                .ok()
                .filter(|i| *i < server_count)
                .ok_or_else(|| {
                    malformed(format!("vbucket {} active index {} out of range", vbid, index))
                })?
        }
        None => return Err(malformed(format!("vbucket {} is empty", vbid))),
    };

    let replicas = slots
        .map(|index| {
            let index = index?;
            if index == -1 {
                return Ok(None);
            }
            usize::try_from(index)
                .ok()
                .filter(|i| *i < server_count)
                .map(Some)
                .ok_or_else(|| {
                    malformed(format!("vbucket {} replica index {} out of range", vbid, index))
                })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(VBucket { active, replicas })
}

/// Immutable topology for one bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    bucket_type: BucketType,
    name: String,
    streaming_endpoint: Url,
    query_endpoint: Url,
    nodes: Vec<Node>,
    server_map: Option<VBucketServerMap>,
}

impl ConfigSnapshot {
    /// Build a snapshot from a decoded config document.
    ///
    /// Relative `streamingUri`, `uri` and `couchApiBase` references are
    /// resolved against `base`; absolute references replace it.
    ///
    /// # Errors
    ///
    /// Returns `MalformedConfig` if:
    /// - The document is not an object
    /// - `nodes` is missing, empty, or contains an entry without `hostname`
    /// - `streamingUri` or `uri` is missing or cannot be resolved
    /// - A persistent bucket lacks any part of its vbucket server map
    /// - A vbucket references a server index outside `serverList`
    pub fn from_document(document: &Value, base: &Url) -> Result<Self> {
        let doc = document
            .as_object()
            .ok_or_else(|| malformed("config document is not an object"))?;

        let streaming_endpoint = resolve(base, doc, "streamingUri")?;
        let query_endpoint = resolve(base, doc, "uri")?;

        let bucket_type = BucketType::from_wire(doc.get("bucketType").and_then(Value::as_str));
        let name = doc
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let raw_nodes = doc
            .get("nodes")
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("nodes missing"))?;
        if raw_nodes.is_empty() {
            return Err(malformed("nodes is empty"));
        }
        let nodes = raw_nodes
            .iter()
            .map(|node| parse_node(node, base))
            .collect::<Result<Vec<_>>>()?;

        let server_map = match bucket_type {
            BucketType::Persistent => {
                Some(VBucketServerMap::from_value(doc.get("vBucketServerMap"))?)
            }
            BucketType::MemoryOnly => None,
        };

        Ok(ConfigSnapshot {
            bucket_type,
            name,
            streaming_endpoint,
            query_endpoint,
            nodes,
            server_map,
        })
    }

    pub fn bucket_type(&self) -> BucketType {
        self.bucket_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn streaming_endpoint(&self) -> &Url {
        &self.streaming_endpoint
    }

    pub fn query_endpoint(&self) -> &Url {
        &self.query_endpoint
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Present only for persistent buckets
    pub fn server_map(&self) -> Option<&VBucketServerMap> {
        self.server_map.as_ref()
    }

    pub fn hash_algorithm(&self) -> Option<&str> {
        self.server_map.as_ref().map(VBucketServerMap::hash_algorithm)
    }

    pub fn replica_count(&self) -> Option<usize> {
        self.server_map.as_ref().map(VBucketServerMap::num_replicas)
    }

    pub fn server_list(&self) -> Option<&[String]> {
        self.server_map.as_ref().map(VBucketServerMap::server_list)
    }

    pub fn vbucket_map(&self) -> Option<&[VBucket]> {
        self.server_map.as_ref().map(VBucketServerMap::vbuckets)
    }
}

fn parse_node(node: &Value, base: &Url) -> Result<Node> {
    let node = node
        .as_object()
        .ok_or_else(|| malformed("node entry is not an object"))?;

    let hostname = node
        .get("hostname")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("node without hostname"))?;
    // Ports come from the explicit map; the hostname suffix is the admin port.
    let host = hostname
        .rsplit_once(':')
        .map_or(hostname, |(host, _port)| host)
        .to_string();

    let status = NodeStatus::parse(node.get("status").and_then(Value::as_str).unwrap_or("unknown"));

    let mut ports = BTreeMap::new();
    if let Some(raw_ports) = node.get("ports").and_then(Value::as_object) {
        for (service, port) in raw_ports {
            let port = port
                .as_u64()
                .and_then(|p| u16::try_from(p).ok())
                .ok_or_else(|| malformed(format!("node {} has invalid {} port", host, service)))?;
            ports.insert(service.clone(), port);
        }
    }

    let couch_api_base = match node.get("couchApiBase").and_then(Value::as_str) {
        Some(reference) => Some(base.join(reference).map_err(|e| {
            malformed(format!("node {} couchApiBase {:?}: {}", host, reference, e))
        })?),
        None => None,
    };

    Ok(Node {
        status,
        host,
        ports,
        couch_api_base,
    })
}

fn resolve(base: &Url, doc: &Map<String, Value>, field: &str) -> Result<Url> {
    let reference = doc
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| malformed(format!("{} missing", field)))?;
    base.join(reference)
        .map_err(|e| malformed(format!("{} {:?}: {}", field, reference, e)))
}

fn malformed(msg: impl Into<String>) -> TopologyError {
    TopologyError::MalformedConfig(msg.into())
}
