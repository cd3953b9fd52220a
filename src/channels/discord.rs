//! Discord REST binding.
//!
//! Implements [`ChatPlatform`] over the Discord HTTP API: message send with
//! multipart attachments, DM channel creation, and guild roster enumeration.
//! Transient failures are retried through [`DeliveryRetryManager`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::delivery_retry::{DeliveryRetryManager, DeliverySnapshot, RetryConfig};
use super::platform::{
    ChatPlatform, Destination, OutboundMessage, PlatformLimits, Roster, RosterEntry,
};
use crate::error::ChannelError;

/// Default Discord API base URL.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Discord error code for "Cannot send messages to this user".
const CANNOT_MESSAGE_USER: u64 = 50007;

/// Largest page the guild member listing returns.
const MEMBER_PAGE_SIZE: usize = 1000;

/// Discord HTTP client.
pub struct DiscordClient {
    client: reqwest::Client,
    token: SecretString,
    base_url: String,
    limits: PlatformLimits,
    retry: DeliveryRetryManager,
}

impl std::fmt::Debug for DiscordClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscordClient")
            .field("token", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl DiscordClient {
    pub fn new(token: SecretString) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            token,
            base_url: DISCORD_API_BASE.to_string(),
            limits: PlatformLimits::discord(),
            retry: DeliveryRetryManager::default(),
        }
    }

    /// Use a custom API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override per-message limits (e.g. for boosted communities).
    pub fn with_limits(mut self, limits: PlatformLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = DeliveryRetryManager::new(config);
        self
    }

    /// Send metrics snapshot.
    pub fn delivery_metrics(&self) -> DeliverySnapshot {
        self.retry.metrics()
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token.expose_secret())
    }

    async fn send_once(
        &self,
        destination: &Destination,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError> {
        let url = format!(
            "{}/channels/{}/messages",
            self.base_url,
            destination.channel_id()
        );
        let payload = MessagePayload {
            content: &message.text,
            attachments: message
                .attachments
                .iter()
                .enumerate()
                .map(|(id, a)| AttachmentMeta {
                    id,
                    filename: &a.filename,
                })
                .collect(),
            allowed_mentions: AllowedMentions {
                parse: &["roles", "users", "everyone"],
            },
        };

        let request = if message.attachments.is_empty() {
            self.client.post(&url).json(&payload)
        } else {
            let payload_json = serde_json::to_string(&payload)
                .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
            let mut form = reqwest::multipart::Form::new().text("payload_json", payload_json);
            for (i, attachment) in message.attachments.iter().enumerate() {
                let part = reqwest::multipart::Part::bytes(attachment.data.to_vec())
                    .file_name(attachment.filename.clone())
                    .mime_str(attachment.mime_type())
                    .map_err(|e| ChannelError::InvalidMessage(e.to_string()))?;
                form = form.part(format!("files[{}]", i), part);
            }
            self.client.post(&url).multipart(form)
        };

        let response = request
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body, destination))
    }

    async fn open_dm_once(&self, user_id: u64) -> Result<Destination, ChannelError> {
        let response = self
            .client
            .post(format!("{}/users/@me/channels", self.base_url))
            .header(AUTHORIZATION, self.authorization())
            .json(&serde_json::json!({ "recipient_id": user_id.to_string() }))
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status_error(status, &body, &Destination::channel(0)) {
                ChannelError::SendFailed { reason, .. } => ChannelError::RecipientUnreachable {
                    recipient: user_id.to_string(),
                    reason,
                },
                other => other,
            });
        }

        let channel: ChannelInfo = response
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("invalid DM channel response: {}", e)))?;
        let channel_id = parse_snowflake(&channel.id).ok_or_else(|| {
            ChannelError::Http(format!("invalid DM channel id '{}'", channel.id))
        })?;

        Ok(Destination::Direct {
            user_id,
            channel_id,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ChannelError> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, self.authorization())
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_error(status, &body, &Destination::channel(0)));
        }
        response
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("invalid response for {}: {}", path, e)))
    }

    /// Every member of a guild, following `after` cursors page by page.
    async fn list_members(&self, guild_id: &str) -> Result<Vec<MemberInfo>, ChannelError> {
        let mut members = Vec::new();
        let mut after = 0u64;
        loop {
            let page: Vec<MemberInfo> = self
                .get_json(&format!(
                    "/guilds/{}/members?limit={}&after={}",
                    guild_id, MEMBER_PAGE_SIZE, after
                ))
                .await?;
            let full = page.len() >= MEMBER_PAGE_SIZE;
            let last = page
                .iter()
                .filter_map(|m| m.user.as_ref())
                .filter_map(|u| parse_snowflake(&u.id))
                .max();
            members.extend(page);

            match last {
                Some(last) if full && last > after => after = last,
                _ => break,
            }
        }
        Ok(members)
    }
}

#[async_trait]
impl ChatPlatform for DiscordClient {
    fn name(&self) -> &str {
        "discord"
    }

    fn limits(&self) -> PlatformLimits {
        self.limits
    }

    async fn send(
        &self,
        destination: &Destination,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError> {
        self.retry
            .deliver_with_retry(|| self.send_once(destination, message))
            .await
    }

    async fn resolve_recipient(&self, user_id: u64) -> Result<Destination, ChannelError> {
        self.retry
            .deliver_with_retry(|| self.open_dm_once(user_id))
            .await
    }

    async fn roster(&self, destination: &Destination) -> Result<Roster, ChannelError> {
        let Destination::Channel { channel_id } = destination else {
            return Ok(Roster::default());
        };

        let channel: ChannelInfo = self.get_json(&format!("/channels/{}", channel_id)).await?;
        let Some(guild_id) = channel.guild_id else {
            return Ok(Roster::default());
        };

        let roles: Vec<RoleInfo> = self.get_json(&format!("/guilds/{}/roles", guild_id)).await?;
        let mut entries: Vec<RosterEntry> = roles
            .into_iter()
            .filter_map(|role| parse_snowflake(&role.id).map(|id| RosterEntry::role(id, role.name)))
            .collect();

        // Member listing needs the members intent; roles alone still resolve.
        match self.list_members(&guild_id).await {
            Ok(members) => {
                for member in members {
                    let Some(user) = member.user else { continue };
                    let Some(id) = parse_snowflake(&user.id) else {
                        continue;
                    };
                    let display = member
                        .nick
                        .or(user.global_name)
                        .unwrap_or_else(|| user.username.clone());
                    if display != user.username {
                        entries.push(RosterEntry::user(id, display));
                    }
                    entries.push(RosterEntry::user(id, user.username));
                }
            }
            Err(e) => {
                tracing::warn!(guild_id = %guild_id, error = %e, "Could not list guild members");
            }
        }

        Ok(Roster::new(entries))
    }
}

/// Map a non-success response to a channel error.
fn status_error(status: StatusCode, body: &str, destination: &Destination) -> ChannelError {
    let api_error: Option<ApiError> = serde_json::from_str(body).ok();

    if status == StatusCode::TOO_MANY_REQUESTS {
        return ChannelError::RateLimited {
            name: "discord".to_string(),
            retry_after: api_error
                .and_then(|e| e.retry_after)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok()),
        };
    }
    if status.is_server_error() {
        return ChannelError::Http(format!("discord returned {}", status));
    }

    let reason = api_error
        .as_ref()
        .and_then(|e| e.message.clone())
        .unwrap_or_else(|| status.to_string());
    let code = api_error.and_then(|e| e.code);

    if let Destination::Direct { user_id, .. } = destination
        && (code == Some(CANNOT_MESSAGE_USER)
            || status == StatusCode::FORBIDDEN
            || status == StatusCode::NOT_FOUND)
    {
        return ChannelError::RecipientUnreachable {
            recipient: user_id.to_string(),
            reason,
        };
    }

    ChannelError::SendFailed {
        name: "discord".to_string(),
        reason: format!("{}: {}", status, reason),
    }
}

fn parse_snowflake(id: &str) -> Option<u64> {
    id.trim().parse().ok()
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<AttachmentMeta<'a>>,
    allowed_mentions: AllowedMentions,
}

#[derive(Serialize)]
struct AttachmentMeta<'a> {
    id: usize,
    filename: &'a str,
}

#[derive(Serialize)]
struct AllowedMentions {
    parse: &'static [&'static str],
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: Option<String>,
    code: Option<u64>,
    retry_after: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChannelInfo {
    id: String,
    guild_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleInfo {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct MemberInfo {
    user: Option<UserInfo>,
    nick: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    id: String,
    username: String,
    global_name: Option<String>,
}
