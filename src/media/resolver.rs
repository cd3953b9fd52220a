//! Image resolution against the object store.
//!
//! Documents encode image identity inconsistently, so each reference is tried
//! against several strategies in turn:
//!
//! 1. store id pattern-matched out of the source or content URI, fetched by id
//! 2. the content URI fetched directly with store credentials
//! 3. the display title looked up by name, first listed match fetched by id
//!
//! A reference that no strategy resolves is reported, never raised: the
//! render continues without it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;

use super::attachment::Attachment;
use super::store::ObjectStore;
use crate::document::ImageRef;
use crate::error::MediaError;

/// Default cap on concurrent image fetches.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 4;

/// Outcome of resolving a batch of references.
#[derive(Debug, Default)]
pub struct ResolvedImages {
    /// Resolved images, in reference order.
    pub attachments: Vec<Attachment>,
    /// References that could not be resolved.
    pub failed: Vec<(ImageRef, MediaError)>,
}

/// Resolver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct ResolverStats {
    pub resolved: u64,
    pub failed: u64,
    pub ambiguous_names: u64,
}

/// Resolves [`ImageRef`]s into attachment bytes.
pub struct ImageResolver {
    store: Arc<dyn ObjectStore>,
    concurrency: usize,
    resolved: AtomicU64,
    failed: AtomicU64,
    ambiguous_names: AtomicU64,
}

impl ImageResolver {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            concurrency: DEFAULT_FETCH_CONCURRENCY,
            resolved: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            ambiguous_names: AtomicU64::new(0),
        }
    }

    /// Set the concurrent fetch cap (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Resolve a single reference.
    pub async fn resolve(&self, reference: &ImageRef) -> Result<Attachment, MediaError> {
        let result = self.try_strategies(reference).await;
        match &result {
            Ok(_) => {
                self.resolved.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(image = %reference, error = %e, "Image resolution failed");
            }
        }
        result
    }

    /// Resolve many references with bounded concurrency, keeping order.
    pub async fn resolve_all(&self, references: &[ImageRef]) -> ResolvedImages {
        let results: Vec<_> = futures::stream::iter(references.to_vec())
            .map(|reference| async move {
                let result = self.resolve(&reference).await;
                (reference, result)
            })
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut out = ResolvedImages::default();
        for (reference, result) in results {
            match result {
                Ok(attachment) => out.attachments.push(attachment),
                Err(e) => out.failed.push((reference, e)),
            }
        }
        out
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            resolved: self.resolved.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            ambiguous_names: self.ambiguous_names.load(Ordering::Relaxed),
        }
    }

    async fn try_strategies(&self, reference: &ImageRef) -> Result<Attachment, MediaError> {
        let mut reasons: Vec<String> = Vec::new();

        // 1. Store id embedded in a URI.
        for uri in [&reference.source_uri, &reference.content_uri]
            .into_iter()
            .flatten()
        {
            if let Some(object_id) = self.store.object_id_from_uri(uri) {
                match self.store.fetch(&object_id).await {
                    Ok(data) => return Ok(Attachment::image(&object_id, data)),
                    Err(e) => reasons.push(format!("fetch {}: {}", object_id, e)),
                }
            }
        }

        // 2. Content URI fetched as-is.
        if let Some(uri) = &reference.content_uri {
            match self.store.fetch_uri(uri).await {
                Ok(data) => return Ok(Attachment::image(&reference.object_id, data)),
                Err(e) => reasons.push(format!("content uri: {}", e)),
            }
        }

        // 3. Lookup by display title.
        if let Some(title) = reference.title.as_deref().filter(|t| !t.trim().is_empty()) {
            match self.resolve_by_name(title).await {
                Ok(attachment) => return Ok(attachment),
                Err(e) => reasons.push(format!("name '{}': {}", title, e)),
            }
        }

        let reason = if reasons.is_empty() {
            "reference carries no usable identifier".to_string()
        } else {
            reasons.join("; ")
        };
        Err(MediaError::ResolutionFailed {
            reference: reference.to_string(),
            reason,
        })
    }

    async fn resolve_by_name(&self, title: &str) -> Result<Attachment, MediaError> {
        let candidates = self.store.find_by_name(title).await?;
        let Some(first) = candidates.first() else {
            return Err(MediaError::ResolutionFailed {
                reference: title.to_string(),
                reason: format!("no object named '{}' in {}", title, self.store.name()),
            });
        };

        if candidates.len() > 1 {
            // The store does not promise a stable listing order.
            self.ambiguous_names.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                name = title,
                candidates = candidates.len(),
                chosen = %first,
                "Several stored objects share this name; picked the first listed"
            );
        }

        let data = self.store.fetch(first).await?;
        Ok(Attachment::image(first, data))
    }
}
