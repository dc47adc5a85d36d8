//! Tree-structured documents used as the backing representation of entities.
//!
//! A [`DocSchema`] is the structural index of a document kind: a tree of
//! path segments whose leaves hold scalars, nested documents, or lists of
//! either. A [`Document`] stores field values by [`DocPath`] and notifies
//! registered [`DocumentObserver`]s when a field changes.
//!
//! Fields may be [`DocValue::Deferred`]: the value lives in the backing store
//! and is read through the document's [`StoreDriver`] on first
//! [`Document::resolve`].
//!
//! # Drivers
//!
//! - [`InMemoryStoreDriver`] -- `HashMap`-based driver for tests and embedding

pub mod document;
pub mod error;
pub mod memory;
pub mod schema;
pub mod traits;

pub use document::{DocChange, DocValue, Document, DocumentId, DocumentObserver, DocumentSource, ObserverId};
pub use error::{BoxError, DocumentError, DocumentResult};
pub use memory::{InMemoryStoreDriver, StoreOffline};
pub use schema::{DocPath, DocSchema, NodeKind, SchemaNode};
pub use traits::StoreDriver;
