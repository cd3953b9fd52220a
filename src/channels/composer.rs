//! Message composition within platform limits.
//!
//! Text is split into chunks no longer than the platform allows, preferring
//! paragraph breaks, then line breaks, then spaces. Attachments are packed in
//! order into batches that respect both the per-message count and byte
//! limits. The first batch rides on the last text chunk; any further batches
//! follow as attachment-only messages. Nothing is truncated or dropped.

use super::platform::{OutboundMessage, PlatformLimits};
use crate::error::ComposeError;
use crate::media::Attachment;

/// Builds outbound messages for one destination.
#[derive(Debug, Clone, Copy)]
pub struct MessageComposer {
    limits: PlatformLimits,
}

impl MessageComposer {
    pub fn new(limits: PlatformLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> PlatformLimits {
        self.limits
    }

    /// Compose `text` and `images` into messages, with any explicit mention
    /// line prepended to the body and separated by a blank line.
    pub fn compose(
        &self,
        text: &str,
        images: Vec<Attachment>,
        explicit_mentions: Option<&str>,
    ) -> Result<Vec<OutboundMessage>, ComposeError> {
        let header = explicit_mentions.map(str::trim).filter(|h| !h.is_empty());
        let body = text.trim_end();
        let has_body = !body.trim().is_empty();

        let full = match (header, has_body) {
            (Some(header), true) => format!("{}\n\n{}", header, body),
            (Some(header), false) => header.to_string(),
            (None, true) => body.to_string(),
            (None, false) => String::new(),
        };

        if full.is_empty() && images.is_empty() {
            return Err(ComposeError::EmptyContent);
        }

        let mut messages: Vec<OutboundMessage> = if full.is_empty() {
            Vec::new()
        } else {
            split_text(&full, self.limits.max_text_chars)
                .into_iter()
                .map(OutboundMessage::text)
                .collect()
        };

        let mut batches = self.batch_attachments(images)?.into_iter();
        if let Some(last) = messages.last_mut()
            && let Some(first_batch) = batches.next()
        {
            last.attachments = first_batch;
        }
        messages.extend(batches.map(|attachments| OutboundMessage {
            text: String::new(),
            attachments,
        }));

        if messages.len() > 1 {
            tracing::debug!(parts = messages.len(), "Split content across messages");
        }
        Ok(messages)
    }

    /// Pack attachments in order into batches within the count and byte
    /// limits.
    fn batch_attachments(
        &self,
        attachments: Vec<Attachment>,
    ) -> Result<Vec<Vec<Attachment>>, ComposeError> {
        let max_count = self.limits.max_attachments.max(1);
        let max_bytes = self.limits.max_total_bytes;

        let mut batches: Vec<Vec<Attachment>> = Vec::new();
        let mut current: Vec<Attachment> = Vec::new();
        let mut current_bytes = 0usize;

        for attachment in attachments {
            let size = attachment.size();
            if size > max_bytes {
                return Err(ComposeError::AttachmentTooLarge {
                    filename: attachment.filename,
                    size,
                    max: max_bytes,
                });
            }
            if !current.is_empty()
                && (current.len() >= max_count || current_bytes + size > max_bytes)
            {
                batches.push(std::mem::take(&mut current));
                current_bytes = 0;
            }
            current_bytes += size;
            current.push(attachment);
        }

        if !current.is_empty() {
            batches.push(current);
        }
        Ok(batches)
    }
}

impl Default for MessageComposer {
    fn default() -> Self {
        Self::new(PlatformLimits::default())
    }
}

/// Split `content` into chunks of at most `max_chars` characters.
pub fn split_text(content: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = content;

    while !rest.is_empty() {
        let Some((window_end, _)) = rest.char_indices().nth(max_chars) else {
            // Fits entirely.
            push_chunk(&mut chunks, rest);
            break;
        };

        let window = &rest[..window_end];
        let (chunk_end, next_start) = find_break(window);
        push_chunk(&mut chunks, &rest[..chunk_end]);
        rest = rest[next_start..].trim_start_matches('\n');
    }

    chunks
}

fn push_chunk(chunks: &mut Vec<String>, chunk: &str) {
    let chunk = chunk.trim_end();
    if !chunk.trim().is_empty() {
        chunks.push(chunk.to_string());
    }
}

/// Pick where to cut a window that is too long: a paragraph or line break in
/// the back half, any space, or a hard cut at the window end. Returns the
/// chunk end and where the remainder starts.
fn find_break(window: &str) -> (usize, usize) {
    let half = window.len() / 2;

    if let Some(pos) = window.rfind("\n\n").filter(|&p| p >= half) {
        return (pos, pos + 2);
    }
    if let Some(pos) = window.rfind('\n').filter(|&p| p >= half) {
        return (pos, pos + 1);
    }
    if let Some(pos) = window.rfind(' ').filter(|&p| p > 0) {
        return (pos, pos + 1);
    }
    (window.len(), window.len())
}
