//! In-memory stand-ins for every external seam.
//!
//! Used by unit tests, the integration suite, and `herald render` against
//! fixture content. None of these talk to the network.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::channels::{ChatPlatform, Destination, OutboundMessage, PlatformLimits, Roster};
use crate::document::{Document, DocumentSource};
use crate::error::{ChannelError, LedgerError, MediaError, SourceError};
use crate::ledger::LedgerStore;
use crate::media::{LinkFetcher, ObjectStore};

const MEMORY_OBJECT_PREFIX: &str = "memory://objects/";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// `n` bytes that sniff as PNG (truncated for `n < 8`).
pub fn png_bytes(n: usize) -> Bytes {
    const MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    let mut data: Vec<u8> = MAGIC.iter().copied().take(n).collect();
    data.resize(n, 0);
    Bytes::from(data)
}

// ---------------------------------------------------------------------------
// Document source
// ---------------------------------------------------------------------------

/// Documents keyed by id.
#[derive(Debug, Default)]
pub struct MemoryDocumentSource {
    documents: HashMap<String, Document>,
    unavailable: AtomicBool,
    delay: Option<Duration>,
}

impl MemoryDocumentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, document: Document) -> Self {
        self.documents.insert(document.id.clone(), document);
        self
    }

    /// Wait this long before answering each fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every fetch fail with `Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    async fn fetch(&self, document_id: &str) -> Result<Document, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable {
                source_name: self.name().to_string(),
                reason: "simulated outage".to_string(),
            });
        }
        self.documents
            .get(document_id)
            .cloned()
            .ok_or_else(|| SourceError::Unavailable {
                source_name: self.name().to_string(),
                reason: format!("document {} not found", document_id),
            })
    }

    fn name(&self) -> &str {
        "memory-docs"
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// Objects addressable by id, by name (insertion order), and by
/// `memory://objects/<id>` or arbitrary registered URIs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Vec<(String, String, Bytes)>,
    uris: HashMap<String, Bytes>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_object(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        self.objects.push((id.into(), name.into(), data.into()));
        self
    }

    /// Serve `data` for `fetch_uri(uri)`.
    pub fn with_uri(mut self, uri: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.uris.insert(uri.into(), data.into());
        self
    }

    /// The URI that [`ObjectStore::object_id_from_uri`] maps back to `id`.
    pub fn uri_for(id: &str) -> String {
        format!("{}{}", MEMORY_OBJECT_PREFIX, id)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn fetch(&self, object_id: &str) -> Result<Bytes, MediaError> {
        self.objects
            .iter()
            .find(|(id, _, _)| id == object_id)
            .map(|(_, _, data)| data.clone())
            .ok_or_else(|| MediaError::DownloadFailed {
                reason: format!("no object {}", object_id),
            })
    }

    async fn find_by_name(&self, name: &str) -> Result<Vec<String>, MediaError> {
        Ok(self
            .objects
            .iter()
            .filter(|(_, n, _)| n == name)
            .map(|(id, _, _)| id.clone())
            .collect())
    }

    async fn fetch_uri(&self, uri: &str) -> Result<Bytes, MediaError> {
        self.uris
            .get(uri)
            .cloned()
            .ok_or_else(|| MediaError::DownloadFailed {
                reason: format!("no content at {}", uri),
            })
    }

    fn object_id_from_uri(&self, uri: &str) -> Option<String> {
        uri.strip_prefix(MEMORY_OBJECT_PREFIX)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    fn name(&self) -> &str {
        "memory-objects"
    }
}

// ---------------------------------------------------------------------------
// Link fetcher
// ---------------------------------------------------------------------------

/// Fixed URL → body table. Unknown URLs fail.
#[derive(Debug, Default)]
pub struct StaticLinkFetcher {
    bodies: HashMap<String, Bytes>,
}

impl StaticLinkFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        self.bodies.insert(url.into(), body.into());
        self
    }
}

#[async_trait]
impl LinkFetcher for StaticLinkFetcher {
    async fn get(&self, url: &str) -> Result<Bytes, MediaError> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| MediaError::DownloadFailed {
                reason: format!("GET {}: 404 Not Found", url),
            })
    }
}

// ---------------------------------------------------------------------------
// Ledger store
// ---------------------------------------------------------------------------

/// A grid of cells, header row first, with failure injection.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    rows: Mutex<Vec<Vec<String>>>,
    writes: Mutex<Vec<(usize, usize, String)>>,
    failing_commits: AtomicUsize,
    failing_reads: AtomicBool,
}

impl MemoryLedger {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    /// Append a row, as the intake path would.
    pub fn append(&self, row: Vec<String>) {
        lock(&self.rows).push(row);
    }

    /// Successful cell writes so far, as `(row, column, value)`, 1-based.
    pub fn writes(&self) -> Vec<(usize, usize, String)> {
        lock(&self.writes).clone()
    }

    /// Current value of a cell, 1-based. Cells past a short row read as
    /// `None`.
    pub fn cell(&self, row: usize, column: usize) -> Option<String> {
        let rows = lock(&self.rows);
        rows.get(row.checked_sub(1)?)?
            .get(column.checked_sub(1)?)
            .cloned()
    }

    /// Fail the next `n` commits with `CommitFailed`.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Make reads fail with `Unavailable` until turned off.
    pub fn fail_reads(&self, failing: bool) {
        self.failing_reads.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn name(&self) -> &str {
        "memory-ledger"
    }

    async fn read_all(&self) -> Result<Vec<Vec<String>>, LedgerError> {
        if self.failing_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable {
                reason: "simulated outage".to_string(),
            });
        }
        Ok(lock(&self.rows).clone())
    }

    async fn update_cell(&self, row: usize, column: usize, value: &str) -> Result<(), LedgerError> {
        let failing = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(LedgerError::CommitFailed {
                row,
                reason: "simulated write failure".to_string(),
            });
        }
        if row == 0 || column == 0 {
            return Err(LedgerError::CommitFailed {
                row,
                reason: format!("invalid cell ({}, {})", row, column),
            });
        }

        let mut rows = lock(&self.rows);
        if rows.len() < row {
            rows.resize(row, Vec::new());
        }
        let cells = &mut rows[row - 1];
        if cells.len() < column {
            cells.resize(column, String::new());
        }
        cells[column - 1] = value.to_string();
        drop(rows);

        lock(&self.writes).push((row, column, value.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Chat platform
// ---------------------------------------------------------------------------

/// Records every send instead of delivering it.
///
/// Every user id resolves to a direct destination whose channel id equals
/// the user id, except ids marked unreachable.
#[derive(Debug, Default)]
pub struct RecordingPlatform {
    limits: Option<PlatformLimits>,
    roster: Roster,
    unreachable: HashSet<u64>,
    failing_channels: HashSet<u64>,
    sent: Mutex<Vec<(Destination, OutboundMessage)>>,
}

impl RecordingPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: PlatformLimits) -> Self {
        self.limits = Some(limits);
        self
    }

    pub fn with_roster(mut self, roster: Roster) -> Self {
        self.roster = roster;
        self
    }

    pub fn with_unreachable(mut self, user_id: u64) -> Self {
        self.unreachable.insert(user_id);
        self
    }

    /// Sends to this channel fail with a non-transient error.
    pub fn with_failing_channel(mut self, channel_id: u64) -> Self {
        self.failing_channels.insert(channel_id);
        self
    }

    pub fn sent(&self) -> Vec<(Destination, OutboundMessage)> {
        lock(&self.sent).clone()
    }
}

#[async_trait]
impl ChatPlatform for RecordingPlatform {
    fn name(&self) -> &str {
        "recording"
    }

    fn limits(&self) -> PlatformLimits {
        self.limits.unwrap_or_else(PlatformLimits::discord)
    }

    async fn send(
        &self,
        destination: &Destination,
        message: &OutboundMessage,
    ) -> Result<(), ChannelError> {
        if self.failing_channels.contains(&destination.channel_id()) {
            return Err(ChannelError::SendFailed {
                name: self.name().to_string(),
                reason: format!("missing access to {}", destination),
            });
        }
        if !self.limits().admits(message) {
            return Err(ChannelError::InvalidMessage(format!(
                "message exceeds limits: {} chars, {} attachments",
                message.text.chars().count(),
                message.attachments.len()
            )));
        }
        lock(&self.sent).push((*destination, message.clone()));
        Ok(())
    }

    async fn resolve_recipient(&self, user_id: u64) -> Result<Destination, ChannelError> {
        if self.unreachable.contains(&user_id) {
            return Err(ChannelError::RecipientUnreachable {
                recipient: user_id.to_string(),
                reason: "cannot send messages to this user".to_string(),
            });
        }
        Ok(Destination::Direct {
            user_id,
            channel_id: user_id,
        })
    }

    async fn roster(&self, _destination: &Destination) -> Result<Roster, ChannelError> {
        Ok(self.roster.clone())
    }
}
