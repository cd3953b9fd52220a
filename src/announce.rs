//! Announcement rendering and delivery.
//!
//! One invocation reads the announcement document fresh, resolves its
//! images, rewrites mention tokens against the destination's roster,
//! composes messages within the platform's limits, and sends them in order.
//! The caller always gets exactly one [`Acknowledgement`] back, whatever
//! happened along the way.
//!
//! Cancellation and the timeout are honoured up to the first send. Once a
//! message has gone out, a later stop is reported as a partial delivery.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::channels::{
    AnnounceArgs, ChatPlatform, Destination, MentionResolver, MessageComposer, OutboundMessage,
    Roster,
};
use crate::document::DocumentReader;
use crate::error::{AccessError, ComposeError, Error, SourceError};
use crate::media::ImageResolver;
use crate::safety::{AccessPolicy, Invoker};

/// Default end-to-end time limit for one announcement.
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct AnnounceConfig {
    /// Document rendered by every invocation.
    pub document_id: String,
    /// Time allowed from invocation to first send.
    pub timeout: Duration,
}

impl AnnounceConfig {
    pub fn new(document_id: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// An image left out of the announcement, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedImage {
    pub reference: String,
    pub reason: String,
}

/// Messages ready to send to one destination.
#[derive(Debug, Clone)]
pub struct PreparedAnnouncement {
    pub destination: Destination,
    pub messages: Vec<OutboundMessage>,
    pub skipped_images: Vec<SkippedImage>,
}

/// What actually went out.
#[derive(Debug, Clone)]
pub struct AnnounceReport {
    pub destination: Destination,
    pub sent: usize,
    pub total: usize,
    pub skipped_images: Vec<SkippedImage>,
    /// Why sending stopped after at least one message went out.
    pub interrupted: Option<String>,
}

impl AnnounceReport {
    pub fn is_complete(&self) -> bool {
        self.interrupted.is_none() && self.sent == self.total
    }
}

/// The single reply to a command invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub success: bool,
    pub text: String,
}

impl Acknowledgement {
    pub fn sent(report: &AnnounceReport) -> Self {
        if let Some(reason) = &report.interrupted {
            return Self::failure(format!(
                "Sent {} of {} messages before stopping: {}",
                report.sent, report.total, reason
            ));
        }
        let mut text = "✅ Announcement sent.".to_string();
        match report.skipped_images.len() {
            0 => {}
            1 => text.push_str(" 1 image could not be included."),
            n => text.push_str(&format!(" {} images could not be included.", n)),
        }
        Self {
            success: true,
            text,
        }
    }

    pub fn failure(reason: impl AsRef<str>) -> Self {
        Self {
            success: false,
            text: format!("❌ {}", reason.as_ref()),
        }
    }

    /// User-facing wording for an error that stopped the announcement.
    pub fn from_error(error: &Error) -> Self {
        let reason = match error {
            Error::Access(AccessError::Unauthorized { .. }) => {
                "You are not allowed to send announcements.".to_string()
            }
            Error::Access(AccessError::RateLimited { retry_after, .. }) => format!(
                "Too many announcements. Try again in {}s.",
                retry_after.as_secs().max(1)
            ),
            Error::Compose(ComposeError::EmptyContent) => {
                "The announcement document is empty.".to_string()
            }
            Error::Source(SourceError::Unavailable { .. }) => {
                "Could not read the announcement document. Try again later.".to_string()
            }
            Error::Source(SourceError::Malformed { reason }) => {
                format!("The announcement document could not be read: {}", reason)
            }
            Error::Cancelled => "Announcement cancelled; nothing was sent.".to_string(),
            Error::TimedOut(after) => format!(
                "Announcement timed out after {}s; nothing was sent.",
                after.as_secs()
            ),
            other => other.to_string(),
        };
        Self::failure(reason)
    }
}

/// Renders the announcement document into a destination.
pub struct AnnounceService {
    reader: DocumentReader,
    resolver: ImageResolver,
    platform: Arc<dyn ChatPlatform>,
    mentions: MentionResolver,
    composer: MessageComposer,
    policy: AccessPolicy,
    config: AnnounceConfig,
}

impl AnnounceService {
    pub fn new(
        reader: DocumentReader,
        resolver: ImageResolver,
        platform: Arc<dyn ChatPlatform>,
        config: AnnounceConfig,
    ) -> Self {
        let composer = MessageComposer::new(platform.limits());
        Self {
            reader,
            resolver,
            platform,
            mentions: MentionResolver::new(),
            composer,
            policy: AccessPolicy::open(),
            config,
        }
    }

    pub fn with_policy(mut self, policy: AccessPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn config(&self) -> &AnnounceConfig {
        &self.config
    }

    pub fn resolver(&self) -> &ImageResolver {
        &self.resolver
    }

    /// Handle a command invocation end to end.
    pub async fn handle(
        &self,
        invoker: &Invoker,
        args: &AnnounceArgs,
        cancel: &CancellationToken,
    ) -> Acknowledgement {
        if let Err(e) = self.policy.check(invoker).await {
            return Acknowledgement::from_error(&Error::from(e));
        }

        let destination = Destination::channel(args.channel_id);
        match self
            .announce(destination, args.mentions.as_deref(), cancel)
            .await
        {
            Ok(report) => {
                tracing::info!(
                    user_id = invoker.user_id,
                    destination = %report.destination,
                    sent = report.sent,
                    total = report.total,
                    skipped_images = report.skipped_images.len(),
                    "Announcement handled"
                );
                Acknowledgement::sent(&report)
            }
            Err(e) => {
                tracing::warn!(
                    user_id = invoker.user_id,
                    destination = %destination,
                    error = %e,
                    "Announcement failed"
                );
                Acknowledgement::from_error(&e)
            }
        }
    }

    /// Render and send to `destination`.
    ///
    /// Fails without sending anything if the document cannot be read,
    /// renders to nothing, or `cancel`/the timeout fires first.
    pub async fn announce(
        &self,
        destination: Destination,
        explicit_mentions: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<AnnounceReport, Error> {
        let deadline = Instant::now() + self.config.timeout;

        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            _ = tokio::time::sleep_until(deadline) => {
                return Err(Error::TimedOut(self.config.timeout));
            }
            prepared = self.prepare(destination, explicit_mentions) => prepared?,
        };

        let total = prepared.messages.len();
        let mut report = AnnounceReport {
            destination,
            sent: 0,
            total,
            skipped_images: prepared.skipped_images,
            interrupted: None,
        };

        for (part, message) in prepared.messages.iter().enumerate() {
            let stop = if cancel.is_cancelled() {
                Some(Error::Cancelled)
            } else if Instant::now() >= deadline {
                Some(Error::TimedOut(self.config.timeout))
            } else {
                match self.platform.send(&destination, message).await {
                    Ok(()) => {
                        report.sent += 1;
                        None
                    }
                    Err(e) => Some(Error::from(e)),
                }
            };

            if let Some(e) = stop {
                if report.sent == 0 {
                    return Err(e);
                }
                tracing::warn!(
                    destination = %destination,
                    part,
                    sent = report.sent,
                    total,
                    error = %e,
                    "Announcement interrupted after partial send"
                );
                report.interrupted = Some(e.to_string());
                break;
            }
        }

        Ok(report)
    }

    /// Render without sending.
    pub async fn prepare(
        &self,
        destination: Destination,
        explicit_mentions: Option<&str>,
    ) -> Result<PreparedAnnouncement, Error> {
        let flat = self.reader.read(&self.config.document_id).await?;

        let (resolved, roster) = tokio::join!(
            self.resolver.resolve_all(&flat.images),
            self.roster_or_empty(&destination)
        );

        let mut skipped_images: Vec<SkippedImage> = resolved
            .failed
            .into_iter()
            .map(|(reference, e)| SkippedImage {
                reference: reference.to_string(),
                reason: e.to_string(),
            })
            .collect();

        let max_bytes = self.composer.limits().max_total_bytes;
        let (images, oversized): (Vec<_>, Vec<_>) = resolved
            .attachments
            .into_iter()
            .partition(|a| a.size() <= max_bytes);
        for attachment in oversized {
            tracing::warn!(
                filename = %attachment.filename,
                size = attachment.size(),
                max = max_bytes,
                "Image exceeds the per-message upload limit; skipping"
            );
            skipped_images.push(SkippedImage {
                reason: format!("{} bytes exceeds the {} byte upload limit", attachment.size(), max_bytes),
                reference: attachment.filename,
            });
        }

        let body = self.mentions.resolve(&flat.text, &roster);
        let header = explicit_mentions.map(|list| self.mentions.resolve_list(list, &roster));
        let messages = self.composer.compose(&body, images, header.as_deref())?;

        tracing::debug!(
            destination = %destination,
            messages = messages.len(),
            skipped_images = skipped_images.len(),
            "Prepared announcement"
        );

        Ok(PreparedAnnouncement {
            destination,
            messages,
            skipped_images,
        })
    }

    async fn roster_or_empty(&self, destination: &Destination) -> Roster {
        match self.platform.roster(destination).await {
            Ok(roster) => roster,
            Err(e) => {
                tracing::warn!(
                    destination = %destination,
                    error = %e,
                    "Could not load roster; mentions by name will stay as typed"
                );
                Roster::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::channels::{PlatformLimits, RosterEntry};
    use crate::document::{Block, Document, ImageRef, Paragraph, Run};
    use crate::safety::RateLimit;
    use crate::testing::{MemoryDocumentSource, MemoryObjectStore, RecordingPlatform, png_bytes};

    const DOC: &str = "doc-1";
    const CHANNEL: u64 = 100;

    fn paragraph(runs: Vec<Run>) -> Block {
        Block::Paragraph(Paragraph { runs })
    }

    fn document(blocks: Vec<Block>) -> MemoryDocumentSource {
        MemoryDocumentSource::new().with_document(Document {
            id: DOC.to_string(),
            blocks,
            ..Document::default()
        })
    }

    fn service(source: MemoryDocumentSource, store: MemoryObjectStore, platform: Arc<RecordingPlatform>) -> AnnounceService {
        AnnounceService::new(
            DocumentReader::new(Arc::new(source)),
            ImageResolver::new(Arc::new(store)),
            platform,
            AnnounceConfig::new(DOC),
        )
    }

    fn args(mentions: Option<&str>) -> AnnounceArgs {
        AnnounceArgs {
            channel_id: CHANNEL,
            mentions: mentions.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_handle_sends_and_acknowledges_once() {
        let platform = Arc::new(RecordingPlatform::new().with_roster(Roster::new(vec![
            RosterEntry::role(7, "General"),
            RosterEntry::user(9, "ana"),
        ])));
        let source = document(vec![paragraph(vec![Run::Text(
            "Hello @General, ping @ana\n".to_string(),
        )])]);
        let svc = service(source, MemoryObjectStore::new(), Arc::clone(&platform));

        let ack = svc
            .handle(&Invoker::new(1), &args(Some("@9 <@&7>")), &CancellationToken::new())
            .await;
        assert_eq!(ack, Acknowledgement {
            success: true,
            text: "✅ Announcement sent.".to_string()
        });

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::channel(CHANNEL));
        assert_eq!(sent[0].1.text, "<@9> <@&7>\n\nHello <@&7>, ping <@9>");
    }

    #[tokio::test]
    async fn test_images_follow_text_and_failures_are_noted() {
        let platform = Arc::new(RecordingPlatform::new());
        let store = MemoryObjectStore::new().with_object("file-aaaaaaaaaaaa", "banner", png_bytes(32));
        let source = document(vec![paragraph(vec![
            Run::Text("Look:".to_string()),
            Run::Image(ImageRef::bare("kix.1").with_title("banner")),
            Run::Image(ImageRef::bare("kix.2").with_title("missing")),
        ])]);
        let svc = service(source, store, Arc::clone(&platform));

        let ack = svc
            .handle(&Invoker::new(1), &args(None), &CancellationToken::new())
            .await;
        assert!(ack.success);
        assert_eq!(ack.text, "✅ Announcement sent. 1 image could not be included.");

        let sent = platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1.text, "Look:");
        assert_eq!(sent[0].1.attachments[0].filename, "file-aaaaaaaaaaaa.png");
    }

    #[tokio::test]
    async fn test_oversized_image_is_skipped_not_fatal() {
        let platform = Arc::new(RecordingPlatform::new().with_limits(PlatformLimits {
            max_total_bytes: 16,
            ..PlatformLimits::discord()
        }));
        let store = MemoryObjectStore::new()
            .with_object("file-aaaaaaaaaaaa", "big", png_bytes(64))
            .with_object("file-bbbbbbbbbbbb", "small", png_bytes(8));
        let source = document(vec![paragraph(vec![
            Run::Image(ImageRef::bare("a").with_title("big")),
            Run::Image(ImageRef::bare("b").with_title("small")),
        ])]);
        let svc = service(source, store, Arc::clone(&platform));

        let prepared = svc.prepare(Destination::channel(CHANNEL), None).await.unwrap();
        assert_eq!(prepared.skipped_images.len(), 1);
        assert_eq!(prepared.skipped_images[0].reference, "file-aaaaaaaaaaaa.png");
        assert_eq!(prepared.messages.len(), 1);
        assert_eq!(prepared.messages[0].attachments.len(), 1);
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_empty_document_is_a_failure_ack() {
        let platform = Arc::new(RecordingPlatform::new());
        let svc = service(document(vec![]), MemoryObjectStore::new(), Arc::clone(&platform));

        let ack = svc
            .handle(&Invoker::new(1), &args(None), &CancellationToken::new())
            .await;
        assert!(!ack.success);
        assert_eq!(ack.text, "❌ The announcement document is empty.");
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_unavailable_document_is_reported() {
        let platform = Arc::new(RecordingPlatform::new());
        let source = document(vec![paragraph(vec![Run::Text("x".to_string())])]);
        source.set_unavailable(true);
        let svc = service(source, MemoryObjectStore::new(), Arc::clone(&platform));

        let ack = svc
            .handle(&Invoker::new(1), &args(None), &CancellationToken::new())
            .await;
        assert!(!ack.success);
        assert!(ack.text.starts_with("❌ Could not read"));
    }

    #[tokio::test]
    async fn test_cancelled_before_send_sends_nothing() {
        let platform = Arc::new(RecordingPlatform::new());
        let source = document(vec![paragraph(vec![Run::Text("x".to_string())])]);
        let svc = service(source, MemoryObjectStore::new(), Arc::clone(&platform));

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = svc
            .announce(Destination::channel(CHANNEL), None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_slow_source_times_out_without_sending() {
        let platform = Arc::new(RecordingPlatform::new());
        let source = document(vec![paragraph(vec![Run::Text("x".to_string())])])
            .with_delay(Duration::from_secs(5));
        let svc = AnnounceService::new(
            DocumentReader::new(Arc::new(source)),
            ImageResolver::new(Arc::new(MemoryObjectStore::new())),
            Arc::clone(&platform) as Arc<dyn ChatPlatform>,
            AnnounceConfig::new(DOC).with_timeout(Duration::from_millis(20)),
        );

        let ack = svc
            .handle(&Invoker::new(1), &args(None), &CancellationToken::new())
            .await;
        assert!(!ack.success);
        assert!(ack.text.contains("timed out"));
        assert!(platform.sent().is_empty());
    }

    #[tokio::test]
    async fn test_send_failure_reports_failure() {
        let platform = Arc::new(RecordingPlatform::new().with_failing_channel(CHANNEL));
        let source = document(vec![paragraph(vec![Run::Text("x".to_string())])]);
        let svc = service(source, MemoryObjectStore::new(), Arc::clone(&platform));

        let ack = svc
            .handle(&Invoker::new(1), &args(None), &CancellationToken::new())
            .await;
        assert!(!ack.success);
        assert!(ack.text.contains("missing access"));
    }

    #[tokio::test]
    async fn test_access_denials_are_acknowledged() {
        let platform = Arc::new(RecordingPlatform::new());
        let source = document(vec![paragraph(vec![Run::Text("x".to_string())])]);
        let svc = service(source, MemoryObjectStore::new(), Arc::clone(&platform)).with_policy(
            AccessPolicy::open()
                .with_allowed_roles(vec!["Staff".to_string()])
                .with_rate_limit(Some(RateLimit::new(1, Duration::from_secs(60)))),
        );
        let cancel = CancellationToken::new();

        let denied = svc.handle(&Invoker::new(1), &args(None), &cancel).await;
        assert_eq!(denied.text, "❌ You are not allowed to send announcements.");

        let staff = Invoker::new(2).with_role(5, "Staff");
        assert!(svc.handle(&staff, &args(None), &cancel).await.success);
        let limited = svc.handle(&staff, &args(None), &cancel).await;
        assert!(limited.text.starts_with("❌ Too many announcements"));

        assert_eq!(platform.sent().len(), 1);
    }

    #[test]
    fn test_partial_report_is_not_success() {
        let report = AnnounceReport {
            destination: Destination::channel(1),
            sent: 1,
            total: 3,
            skipped_images: Vec::new(),
            interrupted: Some("Operation cancelled".to_string()),
        };
        let ack = Acknowledgement::sent(&report);
        assert!(!ack.success);
        assert_eq!(ack.text, "❌ Sent 1 of 3 messages before stopping: Operation cancelled");
        assert!(!report.is_complete());
    }
}
