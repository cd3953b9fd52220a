//! Binary object store seam.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::MediaError;

/// A store of binary objects addressable by id or by name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object's bytes by store id.
    async fn fetch(&self, object_id: &str) -> Result<Bytes, MediaError>;

    /// Ids of objects whose stored name equals `name`, in the store's
    /// listing order.
    async fn find_by_name(&self, name: &str) -> Result<Vec<String>, MediaError>;

    /// Fetch bytes from a content URI served on behalf of this store,
    /// using the store's credentials.
    async fn fetch_uri(&self, uri: &str) -> Result<Bytes, MediaError>;

    /// Extract a store object id from a URI, if the URI points into this
    /// store.
    fn object_id_from_uri(&self, uri: &str) -> Option<String>;

    /// Store name for logs.
    fn name(&self) -> &str;
}
