//! `announce` and `render` subcommands.

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::mention_list;
use crate::announce::{Acknowledgement, PreparedAnnouncement, SkippedImage};
use crate::channels::{Destination, commands::parse_channel};
use crate::relay::Relay;

fn destination(channel: &str) -> anyhow::Result<Destination> {
    parse_channel(channel.trim())
        .map(Destination::channel)
        .ok_or_else(|| anyhow::anyhow!("'{}' is not a channel (use <#id> or an id)", channel))
}

/// Send the announcement. Prints the acknowledgement and returns whether it
/// succeeded.
pub async fn run_announce_command(
    relay: &Relay,
    channel: &str,
    mentions: &[String],
    cancel: &CancellationToken,
) -> anyhow::Result<bool> {
    let destination = destination(channel)?;
    let mentions = mention_list(mentions);

    let ack = match relay
        .announce()
        .announce(destination, mentions.as_deref(), cancel)
        .await
    {
        Ok(report) => Acknowledgement::sent(&report),
        Err(e) => Acknowledgement::from_error(&e),
    };
    println!("{}", ack.text);
    Ok(ack.success)
}

#[derive(Debug, Serialize)]
struct AttachmentPreview {
    filename: String,
    bytes: usize,
    mime_type: &'static str,
}

#[derive(Debug, Serialize)]
struct MessagePreview {
    text: String,
    attachments: Vec<AttachmentPreview>,
}

#[derive(Debug, Serialize)]
struct RenderPreview {
    destination: Destination,
    messages: Vec<MessagePreview>,
    skipped_images: Vec<SkippedImage>,
}

impl From<PreparedAnnouncement> for RenderPreview {
    fn from(prepared: PreparedAnnouncement) -> Self {
        Self {
            destination: prepared.destination,
            messages: prepared
                .messages
                .into_iter()
                .map(|m| MessagePreview {
                    attachments: m
                        .attachments
                        .iter()
                        .map(|a| AttachmentPreview {
                            filename: a.filename.clone(),
                            bytes: a.size(),
                            mime_type: a.mime_type(),
                        })
                        .collect(),
                    text: m.text,
                })
                .collect(),
            skipped_images: prepared.skipped_images,
        }
    }
}

fn print_preview(preview: &RenderPreview) {
    let total = preview.messages.len();
    for (i, message) in preview.messages.iter().enumerate() {
        println!(
            "── message {}/{} ({} chars, {} attachments)",
            i + 1,
            total,
            message.text.chars().count(),
            message.attachments.len()
        );
        if !message.text.is_empty() {
            println!("{}", message.text);
        }
        for attachment in &message.attachments {
            println!(
                "  [attachment] {} ({} bytes, {})",
                attachment.filename, attachment.bytes, attachment.mime_type
            );
        }
    }
    if !preview.skipped_images.is_empty() {
        println!("── skipped images");
        for skipped in &preview.skipped_images {
            println!("  {}: {}", skipped.reference, skipped.reason);
        }
    }
}

/// Render without sending. Without a channel, mentions are left as typed.
pub async fn run_render_command(
    relay: &Relay,
    channel: Option<&str>,
    mentions: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    // Channel 0 has no roster; the platform reports an error and the
    // renderer falls back to an empty one.
    let destination = match channel {
        Some(channel) => destination(channel)?,
        None => Destination::channel(0),
    };

    let prepared = relay.announce().prepare(destination, mentions).await?;
    let preview = RenderPreview::from(prepared);

    if json {
        println!("{}", serde_json::to_string_pretty(&preview)?);
    } else {
        print_preview(&preview);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destination_parsing() {
        assert_eq!(destination("<#12>").unwrap(), Destination::channel(12));
        assert_eq!(destination(" 12 ").unwrap(), Destination::channel(12));
        assert!(destination("general").is_err());
    }
}
