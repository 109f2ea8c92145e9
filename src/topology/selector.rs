//! Node Selection
//!
//! Pure functions over a `ConfigSnapshot`:
//! - `pick_any`: uniform random live node (view queries, admin requests)
//! - `pick_for_key`: vbucket-hash routing to the active server for a key

use super::error::{Result, TopologyError};
use super::snapshot::{ConfigSnapshot, Node, VBucketServerMap};
use rand::seq::SliceRandom;
use rand::Rng;

/// vbucket hash functions understood by the selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Crc,
}

impl HashAlgorithm {
    pub fn from_name(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case("CRC") {
            Ok(HashAlgorithm::Crc)
        } else {
            Err(TopologyError::UnsupportedHashAlgorithm(name.to_string()))
        }
    }

    /// 15-bit key digest: bits 16..31 of the CRC32, masked to 0x7fff.
    pub fn hash(&self, key: &[u8]) -> u32 {
        match self {
            HashAlgorithm::Crc => (crc32fast::hash(key) >> 16) & 0x7fff,
        }
    }
}

pub struct NodeSelector;

impl NodeSelector {
    /// Uniformly random node, preferring live ones. Falls back to any node
    /// when none report healthy.
    pub fn pick_any(snapshot: &ConfigSnapshot) -> Result<&Node> {
        Self::pick_any_with(snapshot, &mut rand::thread_rng())
    }

    pub fn pick_any_with<'a, R: Rng + ?Sized>(
        snapshot: &'a ConfigSnapshot,
        rng: &mut R,
    ) -> Result<&'a Node> {
        let nodes = snapshot.nodes();
        let live: Vec<&Node> = nodes.iter().filter(|n| n.status.is_live()).collect();
        if let Some(node) = live.choose(rng) {
            return Ok(*node);
        }
        nodes.choose(rng).ok_or(TopologyError::NoNodesAvailable)
    }

    /// vbucket index for `key`: `hash(key) mod len(vBucketMap)`
    pub fn vbucket_for_key(snapshot: &ConfigSnapshot, key: &[u8]) -> Result<usize> {
        let map = Self::server_map(snapshot)?;
        let algorithm = HashAlgorithm::from_name(map.hash_algorithm())?;
        Ok(algorithm.hash(key) as usize % map.vbuckets().len())
    }

    /// Address of the active server owning `key`'s vbucket
    pub fn pick_for_key<'a>(snapshot: &'a ConfigSnapshot, key: &[u8]) -> Result<&'a str> {
        let map = Self::server_map(snapshot)?;
        let vbid = Self::vbucket_for_key(snapshot, key)?;
        let active = map.vbuckets()[vbid].active;
        map.server(active).ok_or(TopologyError::NoNodesAvailable)
    }

    /// Addresses of the assigned replicas for `key`'s vbucket, in order
    pub fn replicas_for_key<'a>(snapshot: &'a ConfigSnapshot, key: &[u8]) -> Result<Vec<&'a str>> {
        let map = Self::server_map(snapshot)?;
        let vbid = Self::vbucket_for_key(snapshot, key)?;
        Ok(map.vbuckets()[vbid]
            .replicas
            .iter()
            .flatten()
            .filter_map(|index| map.server(*index))
            .collect())
    }

    fn server_map(snapshot: &ConfigSnapshot) -> Result<&VBucketServerMap> {
        snapshot
            .server_map()
            .ok_or(TopologyError::UnsupportedBucketType(snapshot.bucket_type()))
    }
}
