//! Ledger payload splitting.
//!
//! A payload is free text in which some lines are links to images. Those
//! lines become attachments; every other line stays text, in its original
//! order. A link that cannot be fetched is put back as text where it was.

use futures::StreamExt;
use url::Url;

use crate::media::{Attachment, LinkFetcher};

/// Extensions (lowercase) that make a link line an attachment.
pub const ATTACHMENT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif"];

/// Links of one payload fetched at once.
pub const LINK_FETCH_CONCURRENCY: usize = 4;

/// One line of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLine {
    Text(String),
    /// An image link, with the line as written.
    Attachment { url: Url, raw: String },
}

/// Classify one line.
///
/// A line is an attachment when, trimmed, it is a single http(s) URL whose
/// path ends in one of [`ATTACHMENT_EXTENSIONS`] (case-insensitive).
pub fn classify_line(line: &str) -> PayloadLine {
    let candidate = line.trim();
    if candidate.is_empty() || candidate.contains(char::is_whitespace) {
        return PayloadLine::Text(line.to_string());
    }

    match Url::parse(candidate) {
        Ok(url) if matches!(url.scheme(), "http" | "https") && has_image_extension(&url) => {
            PayloadLine::Attachment {
                url,
                raw: line.to_string(),
            }
        }
        _ => PayloadLine::Text(line.to_string()),
    }
}

fn has_image_extension(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    path.rsplit_once('.')
        .is_some_and(|(_, ext)| ATTACHMENT_EXTENSIONS.contains(&ext))
}

/// Split a payload into classified lines, keeping order.
pub fn split_payload(payload: &str) -> Vec<PayloadLine> {
    payload.lines().map(classify_line).collect()
}

/// Text and attachments ready to compose.
#[derive(Debug, Default)]
pub struct AssembledPayload {
    pub text: String,
    pub attachments: Vec<Attachment>,
    /// Attachment lines put back as text.
    pub demoted: usize,
}

/// Fetch every attachment line and assemble the payload.
///
/// Up to [`LINK_FETCH_CONCURRENCY`] links are fetched at once. A failed
/// fetch, or a body over `max_attachment_bytes`, demotes the link back to a
/// text line.
pub async fn assemble(
    lines: Vec<PayloadLine>,
    fetcher: &dyn LinkFetcher,
    max_attachment_bytes: usize,
) -> AssembledPayload {
    let urls: Vec<Option<String>> = lines
        .iter()
        .map(|line| match line {
            PayloadLine::Text(_) => None,
            PayloadLine::Attachment { url, .. } => Some(url.to_string()),
        })
        .collect();
    let fetched: Vec<_> = futures::stream::iter(urls)
        .map(|url| async move {
            match url {
                Some(url) => Some(fetcher.get(&url).await),
                None => None,
            }
        })
        .buffered(LINK_FETCH_CONCURRENCY)
        .collect()
        .await;

    let mut text_lines: Vec<String> = Vec::new();
    let mut assembled = AssembledPayload::default();

    for (line, result) in lines.into_iter().zip(fetched) {
        match (line, result) {
            (PayloadLine::Text(text), _) => text_lines.push(text),
            (PayloadLine::Attachment { url, .. }, Some(Ok(bytes)))
                if bytes.len() <= max_attachment_bytes =>
            {
                assembled
                    .attachments
                    .push(Attachment::new(link_filename(&url), bytes));
            }
            (PayloadLine::Attachment { url, raw }, Some(Ok(bytes))) => {
                tracing::warn!(
                    url = %url,
                    size = bytes.len(),
                    max = max_attachment_bytes,
                    "Linked image too large to attach; sending link as text"
                );
                assembled.demoted += 1;
                text_lines.push(raw);
            }
            (PayloadLine::Attachment { url, raw }, result) => {
                let reason = match result {
                    Some(Err(e)) => e.to_string(),
                    _ => "not fetched".to_string(),
                };
                tracing::warn!(url = %url, error = %reason, "Could not fetch linked image; sending link as text");
                assembled.demoted += 1;
                text_lines.push(raw);
            }
        }
    }

    assembled.text = text_lines.join("\n").trim().to_string();
    assembled
}

/// Last path segment of the link, or a generic name.
fn link_filename(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
        .map(|s| {
            urlencoding::decode(s)
                .map(|d| d.into_owned())
                .unwrap_or_else(|_| s.to_string())
        })
        .unwrap_or_else(|| "attachment.png".to_string())
}
