use crate::schema::DocPath;

/// Boxed error from a store driver, passed through uninterpreted.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from document operations.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The document schema is malformed.
    #[error("invalid document schema {schema}: {reason}")]
    InvalidSchema { schema: String, reason: String },

    /// The path does not name a leaf of the document schema.
    #[error("no field {path} in document schema {schema}")]
    UnknownPath { schema: String, path: DocPath },

    /// The value does not have the shape the schema declares for the field.
    #[error("field {path}: expected {expected}, found {found}")]
    ShapeMismatch {
        path: DocPath,
        expected: String,
        found: String,
    },

    /// A list operation on a field that does not hold a list.
    #[error("field {path} is not a list")]
    NotAList { path: DocPath },

    /// List index out of range.
    #[error("index {index} out of range for list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A deferred field or refresh needs a source, and the document has none.
    #[error("document of schema {schema} has no backing source")]
    NoSource { schema: String },

    /// Failure reported by the store driver.
    #[error("store driver error: {0}")]
    Driver(#[source] BoxError),
}

/// Result alias for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;
