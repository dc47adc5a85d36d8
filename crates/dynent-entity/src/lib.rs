//! Attribute storage for dynamically defined entities.
//!
//! A [`DynamicEntity`] is the generic, schema-driven storage for one instance
//! of an [`EntityType`](dynent_schema::EntityType). Attributes are addressed
//! by name or slot index and hold a [`Value`]: a scalar, a reference to
//! another entity, or a [`Collection`].
//!
//! # Slots
//!
//! Each slot is [`Slot::Unset`], [`Slot::Value`] or [`Slot::Lazy`]. A lazy
//! slot holds a [`LazyValue`] that is materialized synchronously on the first
//! `get` and then replaced by the loaded value.
//!
//! # Capabilities
//!
//! Optional behaviour is exposed through independent traits rather than a
//! fixed hierarchy:
//!
//! - [`ChangeTracking`]: listeners notified on every `set`/`unset`
//! - [`LazyLoading`]: whether a slot has been materialized
//! - [`FetchGroupTracking`]: which attributes a partial instance carries
//!
//! A backing representation plugs in through [`EntityBacking`]; reloading
//! through [`Reload`].

pub mod collection;
pub mod entity;
pub mod error;
pub mod lazy;
pub mod listener;
pub mod traits;
pub mod value;

pub use collection::{Collection, CollectionStorage, ElementSpec};
pub use entity::{DynamicEntity, EntityIdentity, EntityRef};
pub use error::{EntityError, EntityResult};
pub use lazy::{LazyLoad, LazyValue, Slot};
pub use listener::{ChangeEvent, ChangeListener, ChangeOrigin, ListenerId};
pub use traits::{
    AttributeKey, ChangeTracking, EntityBacking, FetchGroupTracking, LazyLoading, Reload,
};
pub use value::Value;
