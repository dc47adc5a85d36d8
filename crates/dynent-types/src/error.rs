use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown value kind: {0}")]
    UnknownKind(String),

    #[error("unknown container kind: {0}")]
    UnknownContainer(String),

    #[error("a primary key needs at least one value")]
    EmptyKey,
}
