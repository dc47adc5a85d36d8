use dynent_types::PrimaryKey;

use crate::document::DocValue;
use crate::error::BoxError;
use crate::schema::DocPath;

/// Backing store a document reads deferred fields from.
///
/// Implementations may block on their own I/O; the call runs on the thread
/// that resolves the field. Errors are passed through to the caller without
/// interpretation and are never retried.
pub trait StoreDriver: Send + Sync {
    /// Read one field of the record `key` of document schema `schema`.
    ///
    /// Returns `Ok(None)` if the record has no value at `path`.
    fn read(&self, schema: &str, key: &PrimaryKey, path: &DocPath) -> Result<Option<DocValue>, BoxError>;
}
