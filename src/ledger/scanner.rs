//! Recurring ledger delivery loop.
//!
//! Each tick re-reads the whole ledger, classifies every row, and delivers
//! pending rows through a bounded pool of concurrent row tasks. A row is
//! marked fulfilled only after every message for it was sent; a failed send
//! or commit leaves it pending so the next tick picks it up again.
//!
//! Ticks never overlap. A tick requested while another runs is skipped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::payload::{assemble, split_payload};
use super::record::{ColumnMap, LedgerLayout, LedgerRecord, RowClass, classify};
use super::store::LedgerStore;
use crate::channels::{ChatPlatform, MessageComposer};
use crate::error::{ChannelError, LedgerError};
use crate::media::LinkFetcher;

/// Shared slot holding the latest tick report.
pub type StatusSlot = Arc<RwLock<Option<TickReport>>>;

/// Configuration for the delivery loop.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Time between tick starts.
    pub interval: Duration,
    /// Maximum rows delivered concurrently within one tick.
    pub workers: usize,
    pub layout: LedgerLayout,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            workers: 4,
            layout: LedgerLayout::default(),
        }
    }
}

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TickStatus {
    Completed,
    /// Another tick was still running.
    SkippedOverlap,
    /// The ledger could not be read.
    SourceUnavailable,
    /// The header lacks a required column.
    MissingColumns,
}

/// Per-tick row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickCounts {
    /// Data rows read.
    pub scanned: usize,
    pub fulfilled: usize,
    pub empty: usize,
    pub malformed: usize,
    pub delivered: usize,
    pub unreachable: usize,
    /// Send failures other than an unreachable recipient.
    pub failed: usize,
    /// Sent, but the status write failed. Redelivered next tick.
    pub commit_failed: usize,
    /// Image links sent as text instead of attachments.
    pub demoted_links: usize,
}

/// Summary of one tick.
#[derive(Debug, Clone, Serialize)]
pub struct TickReport {
    pub status: TickStatus,
    pub counts: TickCounts,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,
}

/// Result of delivering one pending row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowOutcome {
    Delivered { demoted: usize },
    Unreachable,
    Failed { demoted: usize },
    CommitFailed { demoted: usize },
}

/// Resets the in-progress flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// The ledger delivery loop.
pub struct DeliveryLoop {
    store: Arc<dyn LedgerStore>,
    platform: Arc<dyn ChatPlatform>,
    links: Arc<dyn LinkFetcher>,
    composer: MessageComposer,
    config: ScanConfig,
    in_progress: AtomicBool,
    last_report: StatusSlot,
}

impl DeliveryLoop {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        platform: Arc<dyn ChatPlatform>,
        links: Arc<dyn LinkFetcher>,
        config: ScanConfig,
    ) -> Self {
        let composer = MessageComposer::new(platform.limits());
        Self {
            store,
            platform,
            links,
            composer,
            config,
            in_progress: AtomicBool::new(false),
            last_report: StatusSlot::default(),
        }
    }

    /// Slot updated with each finished tick's report.
    pub fn status_slot(&self) -> StatusSlot {
        Arc::clone(&self.last_report)
    }

    pub async fn last_report(&self) -> Option<TickReport> {
        self.last_report.read().await.clone()
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Run one tick.
    pub async fn tick(&self) -> TickReport {
        let started_at = Utc::now();
        let start = Instant::now();

        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Previous ledger tick still running; skipping");
            return TickReport {
                status: TickStatus::SkippedOverlap,
                counts: TickCounts::default(),
                started_at,
                elapsed_ms: 0,
            };
        }
        let _guard = TickGuard(&self.in_progress);

        let (status, counts) = match self.scan().await {
            Ok(counts) => (TickStatus::Completed, counts),
            Err(e @ LedgerError::MissingColumn { .. }) => {
                tracing::error!(store = self.store.name(), error = %e, "Ledger header is unusable");
                (TickStatus::MissingColumns, TickCounts::default())
            }
            Err(e) => {
                tracing::warn!(store = self.store.name(), error = %e, "Ledger unavailable; will retry next tick");
                (TickStatus::SourceUnavailable, TickCounts::default())
            }
        };

        let report = TickReport {
            status,
            counts,
            started_at,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };

        let busy = counts.delivered
            + counts.malformed
            + counts.unreachable
            + counts.failed
            + counts.commit_failed;
        if busy > 0 {
            tracing::info!(
                scanned = counts.scanned,
                delivered = counts.delivered,
                malformed = counts.malformed,
                unreachable = counts.unreachable,
                failed = counts.failed,
                commit_failed = counts.commit_failed,
                elapsed_ms = report.elapsed_ms,
                "Ledger tick finished"
            );
        } else {
            tracing::debug!(scanned = counts.scanned, status = ?status, "Ledger tick finished");
        }

        *self.last_report.write().await = Some(report.clone());
        report
    }

    async fn scan(&self) -> Result<TickCounts, LedgerError> {
        let rows = self.store.read_all().await?;
        let mut counts = TickCounts::default();

        let Some((header, data)) = rows.split_first() else {
            return Ok(counts);
        };
        let layout = &self.config.layout;
        let columns = ColumnMap::from_header(header, layout)?;

        let mut pending: Vec<LedgerRecord> = Vec::new();
        for (i, cells) in data.iter().enumerate() {
            counts.scanned += 1;
            match classify(i + 1, cells, &columns, layout) {
                RowClass::Fulfilled => counts.fulfilled += 1,
                RowClass::EmptyPayload => counts.empty += 1,
                RowClass::Malformed(e) => {
                    counts.malformed += 1;
                    tracing::warn!(error = %e, "Skipping malformed ledger row");
                }
                RowClass::Pending(record) => pending.push(record),
            }
        }

        let status_column = columns.status + 1;
        let outcomes: Vec<RowOutcome> = futures::stream::iter(pending)
            .map(|record| async move { self.deliver_row(&record, status_column).await })
            .buffer_unordered(self.config.workers.max(1))
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                RowOutcome::Delivered { demoted } => {
                    counts.delivered += 1;
                    counts.demoted_links += demoted;
                }
                RowOutcome::Unreachable => counts.unreachable += 1,
                RowOutcome::Failed { demoted } => {
                    counts.failed += 1;
                    counts.demoted_links += demoted;
                }
                RowOutcome::CommitFailed { demoted } => {
                    counts.commit_failed += 1;
                    counts.demoted_links += demoted;
                }
            }
        }

        Ok(counts)
    }

    /// Send one row, then mark it fulfilled. `status_column` is 1-based.
    async fn deliver_row(&self, record: &LedgerRecord, status_column: usize) -> RowOutcome {
        let destination = match self.platform.resolve_recipient(record.recipient_id).await {
            Ok(destination) => destination,
            Err(ChannelError::RecipientUnreachable { reason, .. }) => {
                tracing::warn!(
                    row = record.row,
                    recipient = record.recipient_id,
                    reason = %reason,
                    "Recipient unreachable; row left pending"
                );
                return RowOutcome::Unreachable;
            }
            Err(e) => {
                tracing::warn!(row = record.row, error = %e, "Could not open recipient channel");
                return RowOutcome::Failed { demoted: 0 };
            }
        };

        let assembled = assemble(
            split_payload(&record.payload),
            self.links.as_ref(),
            self.composer.limits().max_total_bytes,
        )
        .await;
        let demoted = assembled.demoted;

        let messages = match self
            .composer
            .compose(&assembled.text, assembled.attachments, None)
        {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!(row = record.row, error = %e, "Could not compose ledger reply");
                return RowOutcome::Failed { demoted };
            }
        };

        for (part, message) in messages.iter().enumerate() {
            if let Err(e) = self.platform.send(&destination, message).await {
                tracing::warn!(
                    row = record.row,
                    recipient = record.recipient_id,
                    part,
                    error = %e,
                    "Ledger reply not delivered; row left pending"
                );
                return match e {
                    ChannelError::RecipientUnreachable { .. } => RowOutcome::Unreachable,
                    _ => RowOutcome::Failed { demoted },
                };
            }
        }

        let marker = &self.config.layout.fulfilled_marker;
        if let Err(e) = self
            .store
            .update_cell(record.sheet_row(), status_column, marker)
            .await
        {
            tracing::error!(
                row = record.row,
                error = %e,
                "Reply sent but row not marked fulfilled; it will be sent again"
            );
            return RowOutcome::CommitFailed { demoted };
        }

        tracing::info!(row = record.row, recipient = record.recipient_id, "Delivered ledger reply");
        RowOutcome::Delivered { demoted }
    }

    /// Run ticks on the configured interval until `cancel` fires.
    ///
    /// The first tick runs immediately. A tick in progress when cancellation
    /// arrives runs to completion.
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let interval = self.config.interval;
            tracing::info!(
                interval_secs = interval.as_secs(),
                workers = self.config.workers,
                store = self.store.name(),
                "Ledger delivery loop started"
            );

            let mut timer = tokio::time::interval(interval);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("Ledger delivery loop stopped");
                        break;
                    }
                    _ = timer.tick() => {
                        self.tick().await;
                    }
                }
            }
        })
    }
}
