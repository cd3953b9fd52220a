//! Document reader over a pluggable source.

use std::sync::Arc;

use async_trait::async_trait;

use super::model::{Document, FlatDocument};
use crate::error::SourceError;

/// Read-only access to structured documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch a fresh snapshot of a document.
    async fn fetch(&self, document_id: &str) -> Result<Document, SourceError>;

    /// Source name for logs and errors.
    fn name(&self) -> &str;
}

/// Fetches a document and flattens it for rendering.
#[derive(Clone)]
pub struct DocumentReader {
    source: Arc<dyn DocumentSource>,
}

impl DocumentReader {
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        Self { source }
    }

    /// Fetch `document_id` and flatten it into reading order.
    pub async fn read(&self, document_id: &str) -> Result<FlatDocument, SourceError> {
        if document_id.trim().is_empty() {
            return Err(SourceError::Malformed {
                reason: "empty document id".to_string(),
            });
        }

        let document = self.source.fetch(document_id).await?;
        let flat = document.flatten();

        tracing::debug!(
            source = self.source.name(),
            document_id,
            revision = document.revision_id.as_deref().unwrap_or("-"),
            runs = document.run_count(),
            images = flat.images.len(),
            chars = flat.text.chars().count(),
            "Read document"
        );

        Ok(flat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Block, ImageRef, Paragraph, Run};
    use crate::testing::MemoryDocumentSource;

    #[tokio::test]
    async fn test_read_flattens_document() {
        let source = MemoryDocumentSource::new().with_document(Document {
            id: "doc-1".to_string(),
            blocks: vec![Block::Paragraph(Paragraph {
                runs: vec![
                    Run::Text("Hi ".to_string()),
                    Run::Image(ImageRef::bare("kix.a")),
                ],
            })],
            ..Document::default()
        });
        let reader = DocumentReader::new(Arc::new(source));

        let flat = reader.read("doc-1").await.unwrap();
        assert_eq!(flat.text, "Hi ");
        assert_eq!(flat.images, vec![ImageRef::bare("kix.a")]);
    }

    #[tokio::test]
    async fn test_read_missing_document_is_unavailable() {
        let reader = DocumentReader::new(Arc::new(MemoryDocumentSource::new()));
        let err = reader.read("nope").await.unwrap_err();
        assert!(matches!(err, SourceError::Unavailable { .. }));
    }

    #[tokio::test]
    async fn test_read_rejects_blank_id() {
        let reader = DocumentReader::new(Arc::new(MemoryDocumentSource::new()));
        let err = reader.read("  ").await.unwrap_err();
        assert!(matches!(err, SourceError::Malformed { .. }));
    }
}
