//! Google Workspace REST bindings.
//!
//! - [`GoogleDocsSource`]: Docs v1 documents as the announcement source
//! - [`DriveStore`]: Drive v3 files as the image object store
//! - [`SheetsLedger`]: a Sheets v4 worksheet as the delivery ledger
//!
//! All three share one [`GoogleClient`], which attaches a bearer token from
//! a [`TokenProvider`] to every request.

mod auth;
mod docs;
mod drive;
mod sheets;

use std::sync::Arc;
use std::time::Duration;

use reqwest::{RequestBuilder, Response, StatusCode};
use secrecy::ExposeSecret;

pub use auth::{
    DEFAULT_SCOPES, GOOGLE_TOKEN_URI, SCOPE_DOCS_READONLY, SCOPE_DRIVE_READONLY,
    SCOPE_SPREADSHEETS, ServiceAccountAuth, ServiceAccountKey, StaticToken, TokenProvider,
};
pub use docs::{DOCS_API_BASE, GoogleDocsSource};
pub use drive::{DRIVE_API_BASE, DriveStore};
pub use sheets::{SHEETS_API_BASE, SheetsLedger, column_letter};

use crate::error::AuthError;

/// Why an API call failed, before it is mapped to a caller-facing error.
#[derive(Debug, thiserror::Error)]
pub(crate) enum ApiFailure {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("request failed: {0}")]
    Transport(String),

    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },
}

/// Authenticated HTTP client shared by the Google bindings.
#[derive(Clone)]
pub struct GoogleClient {
    http: reqwest::Client,
    auth: Arc<dyn TokenProvider>,
}

impl std::fmt::Debug for GoogleClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleClient").finish_non_exhaustive()
    }
}

impl GoogleClient {
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { http, auth }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Attach a bearer token, send, and turn non-2xx responses into
    /// [`ApiFailure::Status`] with Google's error message when present.
    pub(crate) async fn send(&self, request: RequestBuilder) -> Result<Response, ApiFailure> {
        let token = self.auth.access_token().await?;
        let response = request
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| ApiFailure::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or_else(|| body.chars().take(200).collect());
        Err(ApiFailure::Status { status, message })
    }
}
