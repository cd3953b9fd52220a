//! Plain HTTP fetching of arbitrary external links.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use crate::error::MediaError;

/// Default cap on a downloaded body.
pub const DEFAULT_MAX_DOWNLOAD_BYTES: usize = 25 * 1024 * 1024;

/// Fetches the body of a public URL.
#[async_trait]
pub trait LinkFetcher: Send + Sync {
    async fn get(&self, url: &str) -> Result<Bytes, MediaError>;
}

/// Unauthenticated GET with a size cap.
pub struct HttpLinkFetcher {
    client: reqwest::Client,
    max_bytes: usize,
}

impl HttpLinkFetcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }

    /// Set the maximum accepted body size.
    pub fn with_max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = max;
        self
    }
}

impl Default for HttpLinkFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkFetcher for HttpLinkFetcher {
    async fn get(&self, url: &str) -> Result<Bytes, MediaError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| MediaError::DownloadFailed {
                reason: format!("GET {}: {}", url, e),
            })?;

        if !response.status().is_success() {
            return Err(MediaError::DownloadFailed {
                reason: format!("GET {} returned {}", url, response.status()),
            });
        }

        read_capped(response, self.max_bytes, url).await
    }
}

/// Read a response body, giving up as soon as it grows past `max_bytes`.
///
/// A declared `Content-Length` over the cap fails before any body is read;
/// chunked bodies are counted as they stream in.
pub(crate) async fn read_capped(
    response: reqwest::Response,
    max_bytes: usize,
    what: &str,
) -> Result<Bytes, MediaError> {
    if let Some(length) = response.content_length()
        && length > max_bytes as u64
    {
        return Err(MediaError::TooLarge {
            size: usize::try_from(length).unwrap_or(usize::MAX),
            max: max_bytes,
        });
    }

    let mut body = BytesMut::new();
    let mut chunks = response.bytes_stream();
    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| MediaError::DownloadFailed {
            reason: format!("reading {}: {}", what, e),
        })?;
        if body.len() + chunk.len() > max_bytes {
            return Err(MediaError::TooLarge {
                size: body.len() + chunk.len(),
                max: max_bytes,
            });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body.freeze())
}
