//! Client Configuration
//!
//! Settings are loaded from environment variables:
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | COUCHBASE_POOL_URI | http://localhost:8091/pools/default | Pool base URI |
//! | COUCHBASE_BUCKET | default | Bucket name |
//! | COUCHBASE_USERNAME | - | Basic auth user (needs password too) |
//! | COUCHBASE_PASSWORD | - | Basic auth password |
//! | COUCHBASE_MAX_DOCUMENT_BYTES | 16777216 | Largest pending config document |
//! | COUCHBASE_CONNECT_TIMEOUT_MS | 5000 | Connect timeout for HTTP requests |

use crate::topology::{Result, TopologyError};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_POOL_URI: &str = "http://localhost:8091/pools/default";
const DEFAULT_BUCKET: &str = "default";
const DEFAULT_MAX_DOCUMENT_BYTES: usize = 16 * 1024 * 1024;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// HTTP basic auth credentials for the config endpoints
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Credentials {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base pool URI; every config document is resolved against it
    pub pool_uri: String,
    pub bucket: String,
    pub credentials: Option<Credentials>,
    /// Sent on every config request
    pub user_agent: String,
    /// A pending document larger than this drops the stream
    pub max_document_bytes: usize,
    pub connect_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            pool_uri: DEFAULT_POOL_URI.to_string(),
            bucket: DEFAULT_BUCKET.to_string(),
            credentials: None,
            user_agent: default_user_agent(),
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let credentials = match (
            std::env::var("COUCHBASE_USERNAME"),
            std::env::var("COUCHBASE_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some(Credentials::new(username, password)),
            _ => None,
        };

        ClientConfig {
            pool_uri: std::env::var("COUCHBASE_POOL_URI")
                .unwrap_or_else(|_| DEFAULT_POOL_URI.to_string()),
            bucket: std::env::var("COUCHBASE_BUCKET")
                .unwrap_or_else(|_| DEFAULT_BUCKET.to_string()),
            credentials,
            user_agent: default_user_agent(),
            max_document_bytes: std::env::var("COUCHBASE_MAX_DOCUMENT_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_MAX_DOCUMENT_BYTES),
            connect_timeout_ms: std::env::var("COUCHBASE_CONNECT_TIMEOUT_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn pool_url(&self) -> Result<Url> {
        Url::parse(&self.pool_uri).map_err(|e| {
            TopologyError::MalformedConfig(format!("pool uri {:?}: {}", self.pool_uri, e))
        })
    }

    /// Location of the bucket's bootstrap config document
    pub fn bucket_url(&self) -> Result<Url> {
        let mut pool = self.pool_url()?;
        // Join relative to the pool path, not its parent.
        if !pool.path().ends_with('/') {
            let path = format!("{}/", pool.path());
            pool.set_path(&path);
        }
        pool.join(&format!("buckets/{}", self.bucket)).map_err(|e| {
            TopologyError::MalformedConfig(format!("bucket name {:?}: {}", self.bucket, e))
        })
    }
}

fn default_user_agent() -> String {
    format!("couchbase-topology/{}", env!("CARGO_PKG_VERSION"))
}
