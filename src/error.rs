//! Error types for herald.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Document source error: {0}")]
    Source(#[from] SourceError),

    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Compose error: {0}")]
    Compose(#[from] ComposeError),

    #[error("Access error: {0}")]
    Access(#[from] AccessError),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Timed out after {0:?}")]
    TimedOut(Duration),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Service-account authentication errors.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid service account credentials: {reason}")]
    InvalidCredentials { reason: String },

    #[error("Failed to sign token assertion: {reason}")]
    SigningFailed { reason: String },

    #[error("Token exchange failed: {reason}")]
    ExchangeFailed { reason: String },
}

/// Errors from the document source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("{source_name} unavailable: {reason}")]
    Unavailable { source_name: String, reason: String },

    #[error("Malformed document: {reason}")]
    Malformed { reason: String },
}

/// Media resolution and download errors.
#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("Could not resolve image {reference}: {reason}")]
    ResolutionFailed { reference: String, reason: String },

    #[error("Media download failed: {reason}")]
    DownloadFailed { reason: String },

    #[error("Unsupported media type: {mime_type}")]
    UnsupportedType { mime_type: String },

    #[error("Media file too large: {size} bytes exceeds {max} byte limit")]
    TooLarge { size: usize, max: usize },
}

/// Ledger store and record errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Malformed ledger row {row}: {reason}")]
    MalformedRow { row: usize, reason: String },

    #[error("Ledger is missing required column '{name}'")]
    MissingColumn { name: String },

    #[error("Failed to mark ledger row {row} fulfilled: {reason}")]
    CommitFailed { row: usize, reason: String },
}

/// Chat platform errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Recipient {recipient} unreachable: {reason}")]
    RecipientUnreachable { recipient: String, reason: String },

    #[error("Failed to send message on {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Rate limited on {name}, retry after {retry_after:?}")]
    RateLimited {
        name: String,
        retry_after: Option<Duration>,
    },

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("HTTP error: {0}")]
    Http(String),
}

impl ChannelError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Http(_))
    }
}

/// Message composition errors.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Nothing to send: no text and no attachments")]
    EmptyContent,

    #[error("Attachment {filename} is {size} bytes, over the {max} byte per-message limit")]
    AttachmentTooLarge {
        filename: String,
        size: usize,
        max: usize,
    },
}

/// Caller-facing access denials.
#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("User {user_id} is not allowed to run this command")]
    Unauthorized { user_id: u64 },

    #[error("User {user_id} is rate limited, retry in {retry_after:?}")]
    RateLimited { user_id: u64, retry_after: Duration },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
