//! Docs v1 document source.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{ApiFailure, GoogleClient};
use crate::document::{Block, Cell, Document, DocumentSource, ImageRef, Paragraph, Run, Table};
use crate::error::SourceError;

pub const DOCS_API_BASE: &str = "https://docs.googleapis.com/v1";

/// Reads documents through the Docs REST API.
#[derive(Debug, Clone)]
pub struct GoogleDocsSource {
    client: GoogleClient,
    base_url: String,
}

impl GoogleDocsSource {
    pub fn new(client: GoogleClient) -> Self {
        Self {
            client,
            base_url: DOCS_API_BASE.to_string(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl DocumentSource for GoogleDocsSource {
    fn name(&self) -> &str {
        "google-docs"
    }

    async fn fetch(&self, document_id: &str) -> Result<Document, SourceError> {
        let url = format!(
            "{}/documents/{}",
            self.base_url,
            urlencoding::encode(document_id)
        );
        let unavailable = |reason: String| SourceError::Unavailable {
            source_name: self.name().to_string(),
            reason,
        };

        let response = self
            .client
            .send(self.client.http().get(&url))
            .await
            .map_err(|e| match e {
                ApiFailure::Status { status, message } if status == StatusCode::NOT_FOUND => {
                    unavailable(format!("document '{}' not found: {}", document_id, message))
                }
                other => unavailable(other.to_string()),
            })?;

        let raw: RawDocument = response.json().await.map_err(|e| SourceError::Malformed {
            reason: format!("unexpected document shape: {}", e),
        })?;
        convert_document(document_id, raw)
    }
}

/// Convert the API representation into the document model.
fn convert_document(document_id: &str, raw: RawDocument) -> Result<Document, SourceError> {
    let body = raw.body.ok_or_else(|| SourceError::Malformed {
        reason: "document has no body".to_string(),
    })?;

    let objects = EmbeddedObjects {
        inline: &raw.inline_objects,
        positioned: &raw.positioned_objects,
    };
    let blocks = convert_elements(&body.content, &objects);

    Ok(Document {
        id: raw.document_id.unwrap_or_else(|| document_id.to_string()),
        title: raw.title,
        revision_id: raw.revision_id,
        blocks,
    })
}

struct EmbeddedObjects<'a> {
    inline: &'a HashMap<String, RawInlineObject>,
    positioned: &'a HashMap<String, RawPositionedObject>,
}

impl EmbeddedObjects<'_> {
    fn inline_image(&self, id: &str) -> Option<ImageRef> {
        let embedded = self
            .inline
            .get(id)?
            .inline_object_properties
            .as_ref()?
            .embedded_object
            .as_ref()?;
        image_ref(id, embedded)
    }

    fn positioned_image(&self, id: &str) -> Option<ImageRef> {
        let embedded = self
            .positioned
            .get(id)?
            .positioned_object_properties
            .as_ref()?
            .embedded_object
            .as_ref()?;
        image_ref(id, embedded)
    }
}

/// Objects without image properties (drawings, charts) are ignored.
fn image_ref(object_id: &str, embedded: &RawEmbeddedObject) -> Option<ImageRef> {
    let props = embedded.image_properties.as_ref()?;
    let title = embedded
        .title
        .clone()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| object_id.to_string());

    Some(ImageRef {
        object_id: object_id.to_string(),
        content_uri: props.content_uri.clone(),
        source_uri: props.source_uri.clone(),
        title: Some(title),
    })
}

fn convert_elements(elements: &[RawStructuralElement], objects: &EmbeddedObjects<'_>) -> Vec<Block> {
    let mut blocks = Vec::new();
    for element in elements {
        if let Some(paragraph) = &element.paragraph {
            blocks.push(Block::Paragraph(convert_paragraph(paragraph, objects)));
        } else if let Some(table) = &element.table {
            blocks.push(Block::Table(Table {
                rows: table
                    .table_rows
                    .iter()
                    .map(|row| {
                        row.table_cells
                            .iter()
                            .map(|cell| Cell {
                                blocks: convert_elements(&cell.content, objects),
                            })
                            .collect()
                    })
                    .collect(),
            }));
        } else if let Some(toc) = &element.table_of_contents {
            blocks.extend(convert_elements(&toc.content, objects));
        }
    }
    blocks
}

fn convert_paragraph(paragraph: &RawParagraph, objects: &EmbeddedObjects<'_>) -> Paragraph {
    let mut runs = Vec::new();
    for element in &paragraph.elements {
        if let Some(text) = &element.text_run {
            if !text.content.is_empty() {
                runs.push(Run::Text(text.content.clone()));
            }
        } else if let Some(inline) = &element.inline_object_element {
            match objects.inline_image(&inline.inline_object_id) {
                Some(image) => runs.push(Run::Image(image)),
                None => tracing::debug!(
                    object_id = %inline.inline_object_id,
                    "Skipping inline object without image properties"
                ),
            }
        }
    }

    // Positioned (floating) images anchor to the paragraph; they follow its text.
    for id in &paragraph.positioned_object_ids {
        if let Some(image) = objects.positioned_image(id) {
            runs.push(Run::Image(image));
        }
    }

    Paragraph { runs }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    document_id: Option<String>,
    title: Option<String>,
    revision_id: Option<String>,
    body: Option<RawBody>,
    #[serde(default)]
    inline_objects: HashMap<String, RawInlineObject>,
    #[serde(default)]
    positioned_objects: HashMap<String, RawPositionedObject>,
}

#[derive(Debug, Deserialize)]
struct RawBody {
    #[serde(default)]
    content: Vec<RawStructuralElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStructuralElement {
    paragraph: Option<RawParagraph>,
    table: Option<RawTable>,
    table_of_contents: Option<RawTableOfContents>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParagraph {
    #[serde(default)]
    elements: Vec<RawParagraphElement>,
    #[serde(default)]
    positioned_object_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawParagraphElement {
    text_run: Option<RawTextRun>,
    inline_object_element: Option<RawInlineObjectElement>,
}

#[derive(Debug, Deserialize)]
struct RawTextRun {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInlineObjectElement {
    inline_object_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTable {
    #[serde(default)]
    table_rows: Vec<RawTableRow>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTableRow {
    #[serde(default)]
    table_cells: Vec<RawTableCell>,
}

#[derive(Debug, Deserialize)]
struct RawTableCell {
    #[serde(default)]
    content: Vec<RawStructuralElement>,
}

#[derive(Debug, Deserialize)]
struct RawTableOfContents {
    #[serde(default)]
    content: Vec<RawStructuralElement>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInlineObject {
    inline_object_properties: Option<RawObjectProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPositionedObject {
    positioned_object_properties: Option<RawObjectProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObjectProperties {
    embedded_object: Option<RawEmbeddedObject>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEmbeddedObject {
    title: Option<String>,
    image_properties: Option<RawImageProperties>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawImageProperties {
    content_uri: Option<String>,
    source_uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::google::test_support;

    fn sample() -> serde_json::Value {
        serde_json::json!({
            "documentId": "doc-1",
            "title": "Weekly",
            "revisionId": "rev-9",
            "body": {"content": [
                {"sectionBreak": {}},
                {"paragraph": {"elements": [
                    {"textRun": {"content": "Hello "}},
                    {"inlineObjectElement": {"inlineObjectId": "kix.img1"}},
                    {"textRun": {"content": "world\n"}}
                ]}},
                {"table": {"tableRows": [
                    {"tableCells": [
                        {"content": [{"paragraph": {"elements": [{"textRun": {"content": "A1\n"}}]}}]},
                        {"content": [{"paragraph": {"elements": [
                            {"inlineObjectElement": {"inlineObjectId": "kix.img2"}}
                        ]}}]}
                    ]}
                ]}},
                {"tableOfContents": {"content": [
                    {"paragraph": {"elements": [{"textRun": {"content": "Contents\n"}}]}}
                ]}},
                {"paragraph": {
                    "elements": [{"inlineObjectElement": {"inlineObjectId": "kix.chart"}}],
                    "positionedObjectIds": ["kix.float"]
                }}
            ]},
            "inlineObjects": {
                "kix.img1": {"inlineObjectProperties": {"embeddedObject": {
                    "title": "banner",
                    "imageProperties": {"contentUri": "https://lh3.example/img1"}
                }}},
                "kix.img2": {"inlineObjectProperties": {"embeddedObject": {
                    "imageProperties": {
                        "contentUri": "https://lh3.example/img2",
                        "sourceUri": "https://drive.google.com/file/d/abcdefghijkl/view"
                    }
                }}},
                "kix.chart": {"inlineObjectProperties": {"embeddedObject": {
                    "linkedContentReference": {}
                }}}
            },
            "positionedObjects": {
                "kix.float": {"positionedObjectProperties": {"embeddedObject": {
                    "imageProperties": {"contentUri": "https://lh3.example/float"}
                }}}
            }
        })
    }

    #[tokio::test]
    async fn test_fetch_converts_full_tree() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/documents/doc-1"))
            .and(header("authorization", "Bearer test-access-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(sample()))
            .mount(&server)
            .await;

        let source = GoogleDocsSource::new(test_support::client()).with_base_url(server.uri());
        let document = source.fetch("doc-1").await.unwrap();

        assert_eq!(document.title.as_deref(), Some("Weekly"));
        assert_eq!(document.revision_id.as_deref(), Some("rev-9"));
        assert_eq!(document.blocks.len(), 4);

        let flat = document.flatten();
        assert_eq!(flat.text, "Hello world\nA1\nContents\n");
        let ids: Vec<&str> = flat.images.iter().map(|i| i.object_id.as_str()).collect();
        assert_eq!(ids, vec!["kix.img1", "kix.img2", "kix.float"]);

        assert_eq!(flat.images[0].title.as_deref(), Some("banner"));
        // Untitled images fall back to their object id as lookup name.
        assert_eq!(flat.images[1].title.as_deref(), Some("kix.img2"));
        assert_eq!(
            flat.images[1].source_uri.as_deref(),
            Some("https://drive.google.com/file/d/abcdefghijkl/view")
        );
    }

    #[tokio::test]
    async fn test_not_found_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "error": {"code": 404, "message": "Requested entity was not found."}
            })))
            .mount(&server)
            .await;

        let source = GoogleDocsSource::new(test_support::client()).with_base_url(server.uri());
        match source.fetch("missing").await.unwrap_err() {
            SourceError::Unavailable { source_name, reason } => {
                assert_eq!(source_name, "google-docs");
                assert!(reason.contains("not found"));
            }
            other => panic!("expected Unavailable, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"documentId": "x"})),
            )
            .mount(&server)
            .await;

        let source = GoogleDocsSource::new(test_support::client()).with_base_url(server.uri());
        assert!(matches!(
            source.fetch("x").await,
            Err(SourceError::Malformed { .. })
        ));
    }
}
