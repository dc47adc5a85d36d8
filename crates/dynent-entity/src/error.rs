//! Error types for attribute access.

use thiserror::Error;

/// Boxed error from a backing collaborator, passed through uninterpreted.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while reading or writing entity attributes.
#[derive(Debug, Error)]
pub enum EntityError {
    /// No attribute with this name exists on the type.
    #[error("unknown attribute {attribute:?} on {type_name}")]
    UnknownAttribute { type_name: String, attribute: String },

    /// The value's kind does not match the attribute's declared kind.
    #[error("type mismatch for {type_name}.{attribute}: expected {expected}, found {found}")]
    TypeMismatch {
        type_name: String,
        attribute: String,
        expected: String,
        found: String,
    },

    /// A referenced entity is not of the declared referenced type.
    #[error("invalid reference for {type_name}.{attribute}: expected {expected}, found {found}")]
    InvalidReferenceType {
        type_name: String,
        attribute: String,
        expected: String,
        found: String,
    },

    /// The attribute has no counterpart in the backing representation.
    #[error("attribute {type_name}.{attribute} is not mapped to the backing representation")]
    UnmappedAttribute { type_name: String, attribute: String },

    /// Required attributes are unset.
    #[error("{type_name} is missing required attributes: {}", attributes.join(", "))]
    MissingRequired {
        type_name: String,
        attributes: Vec<String>,
    },

    /// A set collection already contains an equal element.
    #[error("duplicate element in set {type_name}.{attribute}")]
    DuplicateElement { type_name: String, attribute: String },

    /// Collection index out of range.
    #[error("index {index} out of range for collection of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// Failure reported by the backing store, passed through as-is.
    #[error("backing store error: {0}")]
    BackingStore(#[source] BoxError),
}

impl EntityError {
    /// Wrap any backing collaborator error.
    pub fn backing(err: impl Into<BoxError>) -> Self {
        EntityError::BackingStore(err.into())
    }
}

/// Convenience alias for entity results.
pub type EntityResult<T> = Result<T, EntityError>;
