use dynent_document::DocumentError;
use dynent_entity::EntityError;
use dynent_schema::SchemaError;

/// Errors from the value store adapter.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The attribute has no leaf in the bound document schema.
    #[error("attribute {type_name}.{attribute} is not mapped to the document schema")]
    UnmappedAttribute { type_name: String, attribute: String },

    /// No registered entity type is backed by this document schema.
    #[error("no entity type is bound to document schema {0}")]
    UnknownType(String),

    /// The document schema is not registered with the adapter.
    #[error("unknown document schema: {0}")]
    UnknownSchema(String),

    /// The entity type declares no backing schema.
    #[error("entity type {0} has no backing document schema")]
    NoBackingSchema(String),

    /// The entity is not backed by a document of this adapter.
    #[error("entity of type {type_name} is not backed by a document")]
    NotBacked { type_name: String },

    /// A primary key with the wrong number of components for the type.
    #[error("key for {type_name} has {found} components, expected {expected}")]
    KeyMismatch {
        type_name: String,
        expected: usize,
        found: usize,
    },

    /// The adapter was dropped while entities it created were still in use.
    #[error("value store adapter is no longer available")]
    Detached,

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Entity(#[from] EntityError),
}

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

impl From<AdapterError> for EntityError {
    /// Entity errors pass through unchanged; everything else is a
    /// backing-store failure from the entity's point of view.
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Entity(inner) => inner,
            AdapterError::UnmappedAttribute {
                type_name,
                attribute,
            } => EntityError::UnmappedAttribute {
                type_name,
                attribute,
            },
            other => EntityError::backing(other),
        }
    }
}
