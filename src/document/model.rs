//! Structured document model.
//!
//! A [`Document`] is an ordered tree of paragraphs and tables. Tables hold
//! cells, and each cell holds its own block list, so the tree can nest to any
//! depth. [`Document::flatten`] walks it depth-first into a single text
//! accumulator plus the images in the order they occur.

use serde::{Deserialize, Serialize};

/// A fetched document snapshot. Never cached across fetches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier the document was fetched by.
    pub id: String,
    /// Document title, if the source reports one.
    pub title: Option<String>,
    /// Source revision, if the source reports one.
    pub revision_id: Option<String>,
    /// Top-level blocks in reading order.
    pub blocks: Vec<Block>,
}

/// A structural block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Block {
    Paragraph(Paragraph),
    Table(Table),
}

/// An ordered sequence of runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Paragraph {
    pub runs: Vec<Run>,
}

/// A grid of cells, stored row-major.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub rows: Vec<Vec<Cell>>,
}

/// A table cell; its content is a nested block list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub blocks: Vec<Block>,
}

/// The smallest unit of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Run {
    Text(String),
    Image(ImageRef),
}

/// Reference to an embedded image, carrying every identifier the source
/// exposed so the resolver can try each encoding in turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Source-local id of the embedded object.
    pub object_id: String,
    /// Short-lived URI serving the rendered image content.
    pub content_uri: Option<String>,
    /// URI the image was originally inserted from, when known.
    pub source_uri: Option<String>,
    /// Display title; doubles as the lookup key for name-based resolution.
    pub title: Option<String>,
}

impl ImageRef {
    /// Reference with only an object id; resolution will fail without hints.
    pub fn bare(object_id: impl Into<String>) -> Self {
        Self {
            object_id: object_id.into(),
            ..Self::default()
        }
    }

    pub fn with_content_uri(mut self, uri: impl Into<String>) -> Self {
        self.content_uri = Some(uri.into());
        self
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = Some(uri.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Whether the reference carries anything a resolver could use.
    pub fn has_hint(&self) -> bool {
        self.content_uri.is_some() || self.source_uri.is_some() || self.title.is_some()
    }
}

impl std::fmt::Display for ImageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.title {
            Some(title) => write!(f, "{} ({})", self.object_id, title),
            None => write!(f, "{}", self.object_id),
        }
    }
}

/// Position of an image inside the flattened text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImagePlaceholder {
    /// Byte offset into [`FlatDocument::text`] where the image occurred.
    pub offset: usize,
    /// Index into [`FlatDocument::images`].
    pub index: usize,
}

/// A document flattened into reading order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FlatDocument {
    /// All text runs concatenated.
    pub text: String,
    /// Where each image sat relative to the text.
    pub placeholders: Vec<ImagePlaceholder>,
    /// Image references in order of occurrence.
    pub images: Vec<ImageRef>,
}

/// A piece of the interleaved text/image stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Image(&'a ImageRef),
}

impl FlatDocument {
    /// Rebuild the interleaved order of text and images.
    pub fn segments(&self) -> Vec<Segment<'_>> {
        let mut segments = Vec::with_capacity(self.placeholders.len() * 2 + 1);
        let mut cursor = 0;
        for placeholder in &self.placeholders {
            if placeholder.offset > cursor {
                segments.push(Segment::Text(&self.text[cursor..placeholder.offset]));
                cursor = placeholder.offset;
            }
            if let Some(image) = self.images.get(placeholder.index) {
                segments.push(Segment::Image(image));
            }
        }
        if cursor < self.text.len() {
            segments.push(Segment::Text(&self.text[cursor..]));
        }
        segments
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.images.is_empty()
    }
}

impl Document {
    /// Flatten depth-first: blocks in order, table rows top-to-bottom, cells
    /// left-to-right, recursing into each cell's blocks.
    pub fn flatten(&self) -> FlatDocument {
        let mut flat = FlatDocument::default();
        flatten_blocks(&self.blocks, &mut flat);
        flat
    }

    /// Number of runs anywhere in the tree.
    pub fn run_count(&self) -> usize {
        count_runs(&self.blocks)
    }
}

fn flatten_blocks(blocks: &[Block], flat: &mut FlatDocument) {
    for block in blocks {
        match block {
            Block::Paragraph(paragraph) => {
                for run in &paragraph.runs {
                    match run {
                        Run::Text(content) => flat.text.push_str(content),
                        Run::Image(image) => {
                            flat.placeholders.push(ImagePlaceholder {
                                offset: flat.text.len(),
                                index: flat.images.len(),
                            });
                            flat.images.push(image.clone());
                        }
                    }
                }
            }
            Block::Table(table) => {
                for row in &table.rows {
                    for cell in row {
                        flatten_blocks(&cell.blocks, flat);
                    }
                }
            }
        }
    }
}

fn count_runs(blocks: &[Block]) -> usize {
    blocks
        .iter()
        .map(|block| match block {
            Block::Paragraph(p) => p.runs.len(),
            Block::Table(t) => t
                .rows
                .iter()
                .flatten()
                .map(|cell| count_runs(&cell.blocks))
                .sum(),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn text(s: &str) -> Run {
        Run::Text(s.to_string())
    }

    fn para(runs: Vec<Run>) -> Block {
        Block::Paragraph(Paragraph { runs })
    }

    fn cell(blocks: Vec<Block>) -> Cell {
        Cell { blocks }
    }

    #[test]
    fn test_flatten_paragraphs_in_order() {
        let doc = Document {
            blocks: vec![para(vec![text("Hello ")]), para(vec![text("world\n")])],
            ..Document::default()
        };
        let flat = doc.flatten();
        assert_eq!(flat.text, "Hello world\n");
        assert!(flat.images.is_empty());
    }

    #[test]
    fn test_flatten_recurses_into_tables_row_major() {
        let doc = Document {
            blocks: vec![
                para(vec![text("intro\n")]),
                Block::Table(Table {
                    rows: vec![
                        vec![
                            cell(vec![para(vec![text("a")])]),
                            cell(vec![para(vec![text("b")])]),
                        ],
                        vec![
                            cell(vec![para(vec![text("c")])]),
                            cell(vec![Block::Table(Table {
                                rows: vec![vec![cell(vec![para(vec![text("d")])])]],
                            })]),
                        ],
                    ],
                }),
                para(vec![text("\noutro")]),
            ],
            ..Document::default()
        };
        assert_eq!(doc.flatten().text, "intro\nabcd\noutro");
        assert_eq!(doc.run_count(), 6);
    }

    #[test]
    fn test_placeholders_track_image_positions() {
        let doc = Document {
            blocks: vec![
                para(vec![
                    text("before "),
                    Run::Image(ImageRef::bare("kix.1")),
                    text("after"),
                ]),
                Block::Table(Table {
                    rows: vec![vec![cell(vec![para(vec![Run::Image(ImageRef::bare(
                        "kix.2",
                    ))])])]],
                }),
            ],
            ..Document::default()
        };
        let flat = doc.flatten();
        assert_eq!(flat.images.len(), 2);
        assert_eq!(flat.placeholders[0], ImagePlaceholder { offset: 7, index: 0 });
        assert_eq!(flat.placeholders[1], ImagePlaceholder { offset: 12, index: 1 });

        let segments = flat.segments();
        assert_eq!(
            segments,
            vec![
                Segment::Text("before "),
                Segment::Image(&flat.images[0]),
                Segment::Text("after"),
                Segment::Image(&flat.images[1]),
            ]
        );
    }

    #[test]
    fn test_empty_document_is_empty() {
        let doc = Document {
            blocks: vec![para(vec![text("\n")])],
            ..Document::default()
        };
        assert!(doc.flatten().is_empty());
    }

    #[test]
    fn test_image_ref_hints() {
        assert!(!ImageRef::bare("x").has_hint());
        assert!(ImageRef::bare("x").with_title("banner").has_hint());
        assert_eq!(ImageRef::bare("x").with_title("banner").to_string(), "x (banner)");
    }
}
