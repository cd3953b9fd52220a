//! Chat platform delivery.
//!
//! # Architecture
//!
//! ```text
//!   text + images ──► MentionResolver ──► MessageComposer ──► ChatPlatform::send
//!                          ▲                                      │
//!                          │                                      ▼
//!                  ChatPlatform::roster              DeliveryRetryManager (Discord)
//! ```
//!
//! [`ChatPlatform`] is the seam; [`DiscordClient`] is the production
//! binding. The health server, the prefix command parser and the HTTP
//! command boundary live here too, since they all face the chat host.

mod command_endpoint;
pub mod commands;
pub mod composer;
pub mod delivery_retry;
mod discord;
mod health_server;
pub mod mention;
mod platform;

pub use command_endpoint::{CommandRequest, command_routes};
pub use commands::{AnnounceArgs, CommandConfig, ParsedCommand, parse_command};
pub use composer::{MessageComposer, split_text};
pub use delivery_retry::{DeliveryRetryManager, DeliverySnapshot, RetryConfig};
pub use discord::{DISCORD_API_BASE, DiscordClient};
pub use health_server::{ALIVE_MESSAGE, HealthServer, HealthServerConfig};
pub use mention::MentionResolver;
pub use platform::{
    ChatPlatform, Destination, MentionKind, OutboundMessage, PlatformLimits, Roster, RosterEntry,
};
