//! Value store adapter: dynamic entities backed by documents.
//!
//! The [`ValueStoreAdapter`] makes an entity's attributes observably backed
//! by a [`Document`](dynent_document::Document):
//!
//! 1. **Binding** -- each attribute of an entity type is resolved once to a
//!    path in the type's document schema ([`TypeBinding`]). Attributes with
//!    no matching leaf stay unmapped; the rest of the type is still usable.
//! 2. **Lazy read** -- references, collections and deferred document fields
//!    are installed as lazy slots and materialized on first `get`.
//! 3. **Write propagation** -- `set`/`unset` write through to the document,
//!    unwrapping referenced entities to their documents.
//! 4. **Change bridge** -- changes made directly on the document are
//!    re-emitted as entity change events.
//!
//! Wrapping is identity-stable: a weak instance cache keyed by document id
//! returns the live wrapper of a document instead of building a new one.

pub mod adapter;
pub mod binding;
pub mod error;

mod backing;
mod proxy;

pub use adapter::ValueStoreAdapter;
pub use binding::TypeBinding;
pub use error::{AdapterError, AdapterResult};
