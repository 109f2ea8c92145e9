//! Config Stream Sources
//!
//! Trait-based abstraction over "open a long-lived body and yield its
//! chunks", so the listener can run against a real cluster or a scripted
//! byte sequence.
//!
//! Implementations:
//! - `HttpConfigSource`: reqwest GET with user agent and optional basic auth
//! - `ChunkedSource`: in-memory chunks, for tests and simulation

use crate::config::{ClientConfig, Credentials};
use crate::topology::{Result, TopologyError};
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use parking_lot::Mutex;
use reqwest::Url;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;

/// Lazy, non-restartable sequence of body chunks
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

pub trait ConfigSource: Send + Sync + 'static {
    /// Open the streaming endpoint. Called once per listener lifetime.
    fn open_stream<'a>(
        &'a self,
        uri: &'a Url,
        credentials: Option<&'a Credentials>,
    ) -> Pin<Box<dyn Future<Output = Result<ChunkStream>> + Send + 'a>>;
}

pub struct HttpConfigSource {
    client: reqwest::Client,
}

impl HttpConfigSource {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(HttpConfigSource { client })
    }

    async fn get(&self, uri: &Url, credentials: Option<&Credentials>) -> Result<reqwest::Response> {
        let mut request = self.client.get(uri.clone());
        if let Some(credentials) = credentials {
            request = request.basic_auth(&credentials.username, Some(&credentials.password));
        }
        Ok(request.send().await?.error_for_status()?)
    }

    /// One-shot fetch of a config document (bootstrap)
    pub async fn fetch_document(
        &self,
        uri: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<Value> {
        let body = self.get(uri, credentials).await?.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| TopologyError::MalformedConfig(format!("{} returned invalid JSON: {}", uri, e)))
    }
}

impl ConfigSource for HttpConfigSource {
    fn open_stream<'a>(
        &'a self,
        uri: &'a Url,
        credentials: Option<&'a Credentials>,
    ) -> Pin<Box<dyn Future<Output = Result<ChunkStream>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .get(uri, credentials)
                .await
                .map_err(|e| TopologyError::StreamDisconnected(e.to_string()))?;

            let chunks = stream::unfold(Some(response), |response| async move {
                let mut response = response?;
                match response.chunk().await {
                    Ok(Some(bytes)) => Some((Ok(bytes), Some(response))),
                    Ok(None) => None,
                    Err(e) => Some((Err(TopologyError::StreamDisconnected(e.to_string())), None)),
                }
            });
            Ok(chunks.boxed())
        })
    }
}

/// What a `ChunkedSource` does after its last chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// End of body, as if the server closed the connection
    Close,
    /// Stay open without sending anything
    Hold,
}

/// Scripted chunk sequence
pub struct ChunkedSource {
    chunks: Vec<Bytes>,
    end: StreamEnd,
    fail_open: Option<String>,
    opened: Mutex<Vec<(Url, Option<Credentials>)>>,
}

impl ChunkedSource {
    pub fn new(chunks: Vec<Bytes>, end: StreamEnd) -> Self {
        ChunkedSource {
            chunks,
            end,
            fail_open: None,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// Split `body` into chunks ending at the given byte offsets
    pub fn split_at(body: &[u8], boundaries: &[usize], end: StreamEnd) -> Self {
        let mut chunks = Vec::with_capacity(boundaries.len() + 1);
        let mut start = 0;
        for &boundary in boundaries {
            let boundary = boundary.clamp(start, body.len());
            if boundary > start {
                chunks.push(Bytes::copy_from_slice(&body[start..boundary]));
                start = boundary;
            }
        }
        if start < body.len() {
            chunks.push(Bytes::copy_from_slice(&body[start..]));
        }
        Self::new(chunks, end)
    }

    /// A source whose connection attempt fails
    pub fn unreachable(reason: impl Into<String>) -> Self {
        ChunkedSource {
            fail_open: Some(reason.into()),
            ..Self::new(Vec::new(), StreamEnd::Close)
        }
    }

    /// Every `(uri, credentials)` pair `open_stream` was called with
    pub fn opened(&self) -> Vec<(Url, Option<Credentials>)> {
        self.opened.lock().clone()
    }
}

impl ConfigSource for ChunkedSource {
    fn open_stream<'a>(
        &'a self,
        uri: &'a Url,
        credentials: Option<&'a Credentials>,
    ) -> Pin<Box<dyn Future<Output = Result<ChunkStream>> + Send + 'a>> {
        Box::pin(async move {
            self.opened.lock().push((uri.clone(), credentials.cloned()));
            if let Some(reason) = &self.fail_open {
                return Err(TopologyError::StreamDisconnected(reason.clone()));
            }

            let chunks = stream::iter(self.chunks.clone().into_iter().map(Ok));
            let stream: ChunkStream = match self.end {
                StreamEnd::Close => chunks.boxed(),
                StreamEnd::Hold => chunks.chain(stream::pending()).boxed(),
            };
            Ok(stream)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_at_boundaries() {
        let source = ChunkedSource::split_at(b"abcdefgh", &[2, 2, 5, 100], StreamEnd::Close);
        let chunks: Vec<&[u8]> = source.chunks.iter().map(|c| c.as_ref()).collect();
        assert_eq!(chunks, vec![&b"ab"[..], &b"cde"[..], &b"fgh"[..]]);
    }

    #[tokio::test]
    async fn test_chunked_source_records_open() {
        let source = ChunkedSource::new(vec![Bytes::from_static(b"{}")], StreamEnd::Close);
        let uri = Url::parse("http://node1:8091/pools/default/bucketsStreaming/default").unwrap();
        let credentials = Credentials::new("admin", "pw");

        let mut stream = source.open_stream(&uri, Some(&credentials)).await.unwrap();
        assert_eq!(stream.next().await.unwrap().unwrap(), Bytes::from_static(b"{}"));
        assert!(stream.next().await.is_none());

        assert_eq!(source.opened(), vec![(uri, Some(credentials))]);
    }

    #[tokio::test]
    async fn test_unreachable_source() {
        let source = ChunkedSource::unreachable("connection refused");
        let uri = Url::parse("http://node1:8091/").unwrap();
        let result = source.open_stream(&uri, None).await;
        assert!(matches!(result, Err(TopologyError::StreamDisconnected(_))));
    }
}
