//! Document source reading.
//!
//! Fetches the announcement document and flattens it into text plus
//! image references, recursing through tables.

mod model;
mod reader;

pub use model::{
    Block, Cell, Document, FlatDocument, ImagePlaceholder, ImageRef, Paragraph, Run, Segment,
    Table,
};
pub use reader::{DocumentReader, DocumentSource};
