//! Chat platform seam.

use async_trait::async_trait;
use serde::Serialize;

use crate::error::ChannelError;
use crate::media::Attachment;

/// Where a message goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Destination {
    /// A channel inside a community.
    Channel { channel_id: u64 },
    /// A direct-message channel opened with one user.
    Direct { user_id: u64, channel_id: u64 },
}

impl Destination {
    pub fn channel(channel_id: u64) -> Self {
        Self::Channel { channel_id }
    }

    /// Channel id messages are posted to.
    pub fn channel_id(&self) -> u64 {
        match self {
            Self::Channel { channel_id } | Self::Direct { channel_id, .. } => *channel_id,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Channel { channel_id } => write!(f, "channel:{}", channel_id),
            Self::Direct { user_id, .. } => write!(f, "dm:{}", user_id),
        }
    }
}

/// Kind of mention target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MentionKind {
    Role,
    User,
}

/// One addressable identity in a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub id: u64,
    pub name: String,
    pub kind: MentionKind,
}

impl RosterEntry {
    pub fn role(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: MentionKind::Role,
        }
    }

    pub fn user(id: u64, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: MentionKind::User,
        }
    }

    /// Platform-native mention syntax.
    pub fn mention(&self) -> String {
        match self.kind {
            MentionKind::Role => format!("<@&{}>", self.id),
            MentionKind::User => format!("<@{}>", self.id),
        }
    }
}

/// Mention-able identities of a destination's community, in the platform's
/// enumeration order (roles first, then members). Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Roster {
    pub entries: Vec<RosterEntry>,
}

impl Roster {
    pub fn new(entries: Vec<RosterEntry>) -> Self {
        Self { entries }
    }

    pub fn by_id(&self, id: u64) -> Option<&RosterEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A message ready to send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutboundMessage {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attachments: Vec::new(),
        }
    }

    pub fn attachment_bytes(&self) -> usize {
        self.attachments.iter().map(Attachment::size).sum()
    }
}

/// Per-message limits of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlatformLimits {
    /// Maximum characters of message text.
    pub max_text_chars: usize,
    /// Maximum attachments per message.
    pub max_attachments: usize,
    /// Maximum total attachment bytes per message.
    pub max_total_bytes: usize,
}

impl PlatformLimits {
    /// Discord limits for a bot in a community without upload boosts.
    pub const fn discord() -> Self {
        Self {
            max_text_chars: 2000,
            max_attachments: 10,
            max_total_bytes: 10 * 1024 * 1024,
        }
    }

    /// Whether a message fits these limits.
    pub fn admits(&self, message: &OutboundMessage) -> bool {
        message.text.chars().count() <= self.max_text_chars
            && message.attachments.len() <= self.max_attachments
            && message.attachment_bytes() <= self.max_total_bytes
    }
}

impl Default for PlatformLimits {
    fn default() -> Self {
        Self::discord()
    }
}

/// Operations the relay needs from a chat platform.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Platform name for logs and errors.
    fn name(&self) -> &str;

    /// Per-message limits.
    fn limits(&self) -> PlatformLimits;

    /// Send one message.
    async fn send(
        &self,
        destination: &Destination,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError>;

    /// Open a direct-message destination for a user id.
    ///
    /// Fails with [`ChannelError::RecipientUnreachable`] when the user does
    /// not exist or cannot be messaged.
    async fn resolve_recipient(&self, user_id: u64) -> Result<Destination, ChannelError>;

    /// Enumerate the roster of the destination's parent community.
    async fn roster(&self, destination: &Destination) -> Result<Roster, ChannelError>;
}
