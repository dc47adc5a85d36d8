//! Schema descriptors and runtime entity types.
//!
//! A [`SchemaDescriptor`] describes one entity type: its attributes, their
//! value kinds and shapes, which attributes form the primary key, and which
//! attribute (if any) carries the optimistic-lock version. The
//! [`TypeRegistry`] turns descriptors into shared [`EntityType`] objects and
//! guarantees one canonical type per name for the registry's lifetime.
//!
//! # Modules
//!
//! - [`error`]: Error types for schema registration
//! - [`names`]: Type and attribute name validation
//! - [`descriptor`]: [`SchemaDescriptor`], [`AttributeDescriptor`] and the builder
//! - [`entity_type`]: [`EntityType`], the validated runtime form of a descriptor
//! - [`registry`]: [`TypeRegistry`]

pub mod descriptor;
pub mod entity_type;
pub mod error;
pub mod names;
pub mod registry;

pub use descriptor::{AttributeDescriptor, SchemaBuilder, SchemaDescriptor};
pub use entity_type::EntityType;
pub use error::{SchemaError, SchemaResult};
pub use names::{validate_attribute_name, validate_type_name};
pub use registry::TypeRegistry;
