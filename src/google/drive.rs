//! Drive v3 object store.

use std::sync::LazyLock;

use async_trait::async_trait;
use bytes::Bytes;
use regex::Regex;
use serde::Deserialize;

use super::GoogleClient;
use crate::error::MediaError;
use crate::media::{DEFAULT_MAX_DOWNLOAD_BYTES, ObjectStore, read_capped};

pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// File ids in `/d/<id>` paths or `id=<id>` query parameters.
static FILE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:/d/|[?&]id=)([A-Za-z0-9_-]{10,})").expect("valid drive file id regex")
});

/// Images stored as Drive files.
#[derive(Debug, Clone)]
pub struct DriveStore {
    client: GoogleClient,
    base_url: String,
    max_bytes: usize,
}

impl DriveStore {
    pub fn new(client: GoogleClient) -> Self {
        Self {
            client,
            base_url: DRIVE_API_BASE.to_string(),
            max_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Largest file accepted; bigger downloads stop early with `TooLarge`.
    pub fn with_max_bytes(mut self, max: usize) -> Self {
        self.max_bytes = max;
        self
    }

    async fn download(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Bytes, MediaError> {
        let response = self
            .client
            .send(request)
            .await
            .map_err(|e| MediaError::DownloadFailed {
                reason: format!("{}: {}", what, e),
            })?;
        read_capped(response, self.max_bytes, what).await
    }
}

#[async_trait]
impl ObjectStore for DriveStore {
    async fn fetch(&self, object_id: &str) -> Result<Bytes, MediaError> {
        let url = format!("{}/files/{}", self.base_url, urlencoding::encode(object_id));
        let request = self
            .client
            .http()
            .get(&url)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        self.download(request, &format!("drive file {}", object_id))
            .await
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<String>, MediaError> {
        let query = format!("name = '{}' and trashed = false", escape_query_literal(name));
        let request = self.client.http().get(format!("{}/files", self.base_url)).query(&[
            ("q", query.as_str()),
            ("fields", "files(id,name)"),
            ("pageSize", "10"),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);

        let response = self
            .client
            .send(request)
            .await
            .map_err(|e| MediaError::ResolutionFailed {
                reference: name.to_string(),
                reason: format!("drive search: {}", e),
            })?;
        let listing: FileList = response
            .json()
            .await
            .map_err(|e| MediaError::ResolutionFailed {
                reference: name.to_string(),
                reason: format!("drive search response: {}", e),
            })?;

        Ok(listing.files.into_iter().map(|f| f.id).collect())
    }

    async fn fetch_uri(&self, uri: &str) -> Result<Bytes, MediaError> {
        self.download(self.client.http().get(uri), "content uri")
            .await
    }

    fn object_id_from_uri(&self, uri: &str) -> Option<String> {
        let parsed = url::Url::parse(uri).ok()?;
        let host = parsed.host_str()?;
        if !(host == "google.com" || host.ends_with(".google.com")) {
            return None;
        }
        FILE_ID_PATTERN
            .captures(uri)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    fn name(&self) -> &str {
        "google-drive"
    }
}

/// Escape a value for a single-quoted Drive query literal.
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    id: String,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::google::test_support;

    fn store(server: &MockServer) -> DriveStore {
        DriveStore::new(test_support::client()).with_base_url(server.uri())
    }

    #[test]
    fn test_object_id_from_drive_uris() {
        let store = DriveStore::new(test_support::client());
        assert_eq!(
            store.object_id_from_uri("https://drive.google.com/file/d/1AbC_def-GHIjk/view?usp=sharing"),
            Some("1AbC_def-GHIjk".to_string())
        );
        assert_eq!(
            store.object_id_from_uri("https://drive.google.com/uc?export=view&id=1AbC_def-GHIjk"),
            Some("1AbC_def-GHIjk".to_string())
        );
        assert_eq!(
            store.object_id_from_uri("https://lh7-rt.googleusercontent.com/docsz/AD_4nXabcdef"),
            None
        );
        assert_eq!(store.object_id_from_uri("https://evil.example/file/d/1AbC_def-GHIjk"), None);
        assert_eq!(store.object_id_from_uri("https://drive.google.com/file/d/short"), None);
    }

    #[test]
    fn test_escape_query_literal() {
        assert_eq!(escape_query_literal("it's"), "it\\'s");
        assert_eq!(escape_query_literal("a\\b"), "a\\\\b");
    }

    #[tokio::test]
    async fn test_fetch_downloads_media() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/file123"))
            .and(query_param("alt", "media"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"GIF89a".to_vec()))
            .mount(&server)
            .await;

        let data = store(&server).fetch("file123").await.unwrap();
        assert_eq!(data.to_vec(), b"GIF89a".to_vec());
    }

    #[tokio::test]
    async fn test_find_by_name_keeps_listing_order() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files"))
            .and(query_param("q", "name = 'banner' and trashed = false"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "files": [{"id": "b2", "name": "banner"}, {"id": "b1", "name": "banner"}]
            })))
            .mount(&server)
            .await;

        let ids = store(&server).find_by_name("banner").await.unwrap();
        assert_eq!(ids, vec!["b2".to_string(), "b1".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_file_is_download_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"message": "File not found: nope."}
            })))
            .mount(&server)
            .await;

        match store(&server).fetch("nope").await.unwrap_err() {
            MediaError::DownloadFailed { reason } => assert!(reason.contains("File not found")),
            other => panic!("expected DownloadFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_download_over_cap_is_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/poster"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 64]))
            .mount(&server)
            .await;

        let err = store(&server)
            .with_max_bytes(32)
            .fetch("poster")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::TooLarge { size: 64, max: 32 }));
    }
}
