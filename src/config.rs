//! Configuration for herald.
//!
//! Everything comes from environment variables, loaded after `.env` via
//! `dotenvy`. [`Config::from_lookup`] takes any key lookup so tests never
//! touch the process environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::ledger::{LedgerLayout, ScanConfig};
use crate::safety::RateLimit;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" | "" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::InvalidValue {
                key: "HERALD_LOG_FORMAT".to_string(),
                message: format!("'{}' is not one of pretty, json", other),
            }),
        }
    }
}

/// Google-side identifiers and credentials.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// Announcement document id.
    pub document_id: String,
    /// Ledger spreadsheet id.
    pub spreadsheet_id: String,
    /// Worksheet (tab) holding the ledger.
    pub sheet_name: String,
    /// Service-account key JSON.
    pub credentials_json: SecretString,
}

/// Announce command settings.
#[derive(Debug, Clone)]
pub struct AnnounceSettings {
    pub command_prefix: String,
    pub allowed_roles: Vec<String>,
    pub rate_limit: Option<RateLimit>,
    /// Bearer token for `POST /commands`; the route is off without one.
    pub command_token: Option<SecretString>,
    pub render_timeout: Duration,
    pub image_fetch_concurrency: usize,
}

/// Full relay configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: SecretString,
    pub google: GoogleConfig,
    pub scan: ScanConfig,
    pub announce: AnnounceSettings,
    pub health_addr: SocketAddr,
    pub log_format: LogFormat,
}

impl Config {
    /// Load `.env` (if present) and read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let credentials = env.required("GOOGLE_CREDS_JSON")?;
        let credentials_json = if credentials.trim_start().starts_with('{') {
            credentials
        } else {
            std::fs::read_to_string(credentials.trim()).map_err(|e| ConfigError::InvalidValue {
                key: "GOOGLE_CREDS_JSON".to_string(),
                message: format!("not JSON and not a readable key file: {}", e),
            })?
        };

        let google = GoogleConfig {
            document_id: env.required("GOOGLE_DOC_ID")?,
            spreadsheet_id: env.required("GOOGLE_SHEET_ID")?,
            sheet_name: env.string_or("LEDGER_SHEET_NAME", "Sheet1"),
            credentials_json: SecretString::from(credentials_json),
        };

        let defaults = LedgerLayout::default();
        let layout = LedgerLayout {
            recipient_column: env.string_or("LEDGER_RECIPIENT_COLUMN", &defaults.recipient_column),
            payload_column: env.string_or("LEDGER_PAYLOAD_COLUMN", &defaults.payload_column),
            timestamp_column: env.string_or("LEDGER_TIMESTAMP_COLUMN", &defaults.timestamp_column),
            status_column: env.positive("LEDGER_STATUS_COLUMN", defaults.status_column)?,
            fulfilled_marker: env.string_or("LEDGER_FULFILLED_MARKER", &defaults.fulfilled_marker),
        };

        let scan = ScanConfig {
            interval: Duration::from_secs(env.positive("SCAN_INTERVAL_SECS", 60)? as u64),
            workers: env.positive("SCAN_WORKERS", 4)?,
            layout,
        };

        let announce = AnnounceSettings {
            command_prefix: env.string_or("COMMAND_PREFIX", "!"),
            allowed_roles: env
                .get("ANNOUNCE_ALLOWED_ROLES")
                .map(|v| {
                    v.split(',')
                        .map(|r| r.trim().to_string())
                        .filter(|r| !r.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            rate_limit: env
                .get("ANNOUNCE_RATE_LIMIT")
                .map(|v| {
                    v.parse::<RateLimit>()
                        .map_err(|e| ConfigError::InvalidValue {
                            key: "ANNOUNCE_RATE_LIMIT".to_string(),
                            message: e.to_string(),
                        })
                })
                .transpose()?,
            command_token: env.get("COMMAND_TOKEN").map(SecretString::from),
            render_timeout: Duration::from_secs(env.positive("RENDER_TIMEOUT_SECS", 60)? as u64),
            image_fetch_concurrency: env.positive("IMAGE_FETCH_CONCURRENCY", 4)?,
        };

        let port: u16 = env.parse_or("HEALTH_PORT", 8080)?;

        Ok(Self {
            discord_token: SecretString::from(env.required("DISCORD_TOKEN")?),
            google,
            scan,
            announce,
            health_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port),
            log_format: env.get("HERALD_LOG_FORMAT").unwrap_or_default().parse()?,
        })
    }
}

/// Key lookup with trimming and typed accessors. Blank values count as
/// unset.
struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("'{}': {}", v, e),
            }),
        }
    }

    fn positive(&self, key: &str, default: usize) -> Result<usize, ConfigError> {
        let value: usize = self.parse_or(key, default)?;
        if value == 0 {
            return Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        Ok(value)
    }
}
