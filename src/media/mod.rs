//! Media handling.
//!
//! Provides:
//! - Attachments and magic-byte image format detection
//! - The object store seam and image resolution against it
//! - Plain HTTP fetching for external links

mod attachment;
mod link;
mod resolver;
mod store;

pub use attachment::{Attachment, ImageFormat};
pub use link::{DEFAULT_MAX_DOWNLOAD_BYTES, HttpLinkFetcher, LinkFetcher};
pub(crate) use link::read_capped;
pub use resolver::{DEFAULT_FETCH_CONCURRENCY, ImageResolver, ResolvedImages, ResolverStats};
pub use store::ObjectStore;
