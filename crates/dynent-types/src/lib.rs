//! Foundation types for the dynamic entity engine.
//!
//! This crate provides the value-level vocabulary shared by every other
//! `dynent` crate. It has no knowledge of schemas or entities.
//!
//! # Key Types
//!
//! - [`Scalar`]: A single non-reference attribute value
//! - [`ValueKind`]: The declared kind of an attribute's values
//! - [`ContainerKind`]: The container used by collection attributes
//! - [`AttributeShape`]: Scalar, reference, or a collection of either
//! - [`PrimaryKey`]: Ordered key values identifying an instance within a type

pub mod error;
pub mod key;
pub mod kind;
pub mod scalar;

pub use error::TypeError;
pub use key::PrimaryKey;
pub use kind::{AttributeShape, ContainerKind, ValueKind};
pub use scalar::Scalar;
