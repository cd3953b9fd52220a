//! Service-account authentication.
//!
//! Exchanges an RS256-signed JWT assertion for an OAuth access token
//! (RFC 7523 JWT bearer grant) and caches it until shortly before expiry.
//!
//! # Security
//!
//! - The private key and access tokens are held as `SecretString`.
//! - `Debug` output redacts both.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::AuthError;

pub const SCOPE_DOCS_READONLY: &str = "https://www.googleapis.com/auth/documents.readonly";
pub const SCOPE_DRIVE_READONLY: &str = "https://www.googleapis.com/auth/drive.readonly";
pub const SCOPE_SPREADSHEETS: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Scopes the relay needs: read the document, read images, read/write the
/// ledger.
pub const DEFAULT_SCOPES: &[&str] = &[
    SCOPE_DOCS_READONLY,
    SCOPE_DRIVE_READONLY,
    SCOPE_SPREADSHEETS,
];

pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertion lifetime; Google caps it at one hour.
const ASSERTION_LIFETIME: Duration = Duration::from_secs(3600);

/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of bearer tokens for Google API calls.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<SecretString, AuthError>;
}

/// A pre-issued token, used as-is.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        Ok(self.0.clone())
    }
}

/// The fields of a service-account key file the relay uses.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    #[serde(deserialize_with = "deserialize_secret_string")]
    pub private_key: SecretString,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("private_key", &"[REDACTED]")
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl ServiceAccountKey {
    /// Parse the JSON key file content.
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        serde_json::from_str(json).map_err(|e| AuthError::InvalidCredentials {
            reason: format!("service account JSON: {}", e),
        })
    }
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

fn deserialize_secret_string<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(SecretString::from(s))
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    token: SecretString,
    expires_at: Instant,
}

/// Token provider backed by a service-account key.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scopes: String,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountAuth")
            .field("key", &self.key)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, scopes: &[&str]) -> Result<Self, AuthError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.expose_secret().as_bytes())
            .map_err(|e| AuthError::InvalidCredentials {
                reason: format!("private key: {}", e),
            })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        tracing::debug!(client_email = %key.client_email, "Service account loaded");

        Ok(Self {
            key,
            encoding_key,
            scopes: scopes.join(" "),
            http,
            cached: Mutex::new(None),
        })
    }

    /// Parse a key file and build a provider for [`DEFAULT_SCOPES`].
    pub fn from_json(json: &str) -> Result<Self, AuthError> {
        Self::new(ServiceAccountKey::from_json(json)?, DEFAULT_SCOPES)
    }

    fn sign_assertion(&self) -> Result<String, AuthError> {
        let iat = chrono::Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: &self.scopes,
            aud: &self.key.token_uri,
            iat,
            exp: iat + ASSERTION_LIFETIME.as_secs() as i64,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key).map_err(
            |e| AuthError::SigningFailed {
                reason: e.to_string(),
            },
        )
    }

    async fn exchange(&self) -> Result<CachedToken, AuthError> {
        let assertion = self.sign_assertion()?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::ExchangeFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::ExchangeFailed {
                reason: format!("{}: {}", status, body.chars().take(200).collect::<String>()),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| AuthError::ExchangeFailed {
            reason: format!("invalid token response: {}", e),
        })?;
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(3600));

        tracing::debug!(expires_in_secs = lifetime.as_secs(), "Obtained Google access token");
        Ok(CachedToken {
            token: SecretString::from(token.access_token),
            expires_at: Instant::now() + lifetime.saturating_sub(EXPIRY_MARGIN),
        })
    }
}

#[async_trait]
impl TokenProvider for ServiceAccountAuth {
    async fn access_token(&self) -> Result<SecretString, AuthError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.expires_at
        {
            return Ok(token.token.clone());
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}
