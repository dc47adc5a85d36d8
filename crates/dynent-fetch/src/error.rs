//! Error types for fetch plans and graph traversals.

use dynent_entity::EntityError;
use dynent_schema::SchemaError;
use thiserror::Error;

/// Errors that can occur while building or running a fetch plan.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The plan was used before [`initialize`](crate::FetchPlan::initialize).
    #[error("fetch plan is not initialized")]
    NotInitialized,

    /// A plan item names no attribute of the target type.
    #[error("fetch plan item {attribute:?} is not an attribute of {type_name}")]
    UnmappedAttribute { type_name: String, attribute: String },

    /// A nested plan hangs off an attribute that is not a reference.
    #[error("{type_name}.{attribute} is not a relationship and cannot carry a nested plan")]
    NotARelationship { type_name: String, attribute: String },

    /// The target type is not registered.
    #[error("unknown entity type: {0}")]
    UnknownType(String),

    /// The plan is bound to another type than the entity handed to it.
    #[error("fetch plan targets {expected}, found an instance of {found}")]
    WrongType { expected: String, found: String },

    /// Merge semantics outside the supported minimum.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A key attribute of an instance being merged is unset.
    #[error("{type_name} instance has unset primary key attributes")]
    MissingKey { type_name: String },

    #[error(transparent)]
    Entity(#[from] EntityError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Convenience alias for fetch results.
pub type FetchResult<T> = Result<T, FetchError>;
