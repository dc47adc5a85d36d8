use dynent_entity::EntityError;

/// Errors from identity cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The instance's key attributes are unset, or its type has no key.
    #[error("cannot cache {type_name} instance without a primary key")]
    MissingKey { type_name: String },

    #[error(transparent)]
    Entity(#[from] EntityError),
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
