//! Error types for schema registration and lookup.

use thiserror::Error;

/// Errors raised while validating or registering a schema descriptor.
///
/// Every variant except [`SchemaError::TypeNotFound`] describes a malformed
/// descriptor: a fatal configuration error that retrying cannot fix.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    /// The type name is invalid.
    #[error("invalid type name {name:?}: {reason}")]
    InvalidTypeName { name: String, reason: String },

    /// An attribute name is invalid.
    #[error("invalid attribute name {name:?} on {type_name}: {reason}")]
    InvalidAttributeName {
        type_name: String,
        name: String,
        reason: String,
    },

    /// Two attributes share a name.
    #[error("duplicate attribute {name:?} on {type_name}")]
    DuplicateAttribute { type_name: String, name: String },

    /// Slot indices are not exactly `0..len`.
    #[error("slot indices of {type_name} are not dense: expected slot {expected}, found {found}")]
    NonDenseSlots {
        type_name: String,
        expected: usize,
        found: usize,
    },

    /// A reference attribute does not name the type it points to.
    #[error("reference attribute {attribute:?} on {type_name} has no referenced type")]
    MissingReferencedType { type_name: String, attribute: String },

    /// A scalar attribute names a referenced type.
    #[error("scalar attribute {attribute:?} on {type_name} cannot reference a type")]
    UnexpectedReferencedType { type_name: String, attribute: String },

    /// A key attribute has a shape keys cannot have.
    #[error("key attribute {attribute:?} on {type_name}: {reason}")]
    InvalidKeyAttribute {
        type_name: String,
        attribute: String,
        reason: String,
    },

    /// More than one attribute is flagged as the version attribute.
    #[error("{type_name} declares more than one version attribute")]
    MultipleVersionAttributes { type_name: String },

    /// The version attribute has a shape versions cannot have.
    #[error("version attribute {attribute:?} on {type_name}: {reason}")]
    InvalidVersionAttribute {
        type_name: String,
        attribute: String,
        reason: String,
    },

    /// No type with this name is registered.
    #[error("entity type not found: {0}")]
    TypeNotFound(String),
}

/// Convenience type alias for schema operations.
pub type SchemaResult<T> = std::result::Result<T, SchemaError>;
