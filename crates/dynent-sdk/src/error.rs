use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("config error: {0}")]
    Config(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema error: {0}")]
    Schema(#[from] dynent_schema::SchemaError),

    #[error("entity error: {0}")]
    Entity(#[from] dynent_entity::EntityError),

    #[error("document error: {0}")]
    Document(#[from] dynent_document::DocumentError),

    #[error("adapter error: {0}")]
    Adapter(#[from] dynent_adapter::AdapterError),

    #[error("cache error: {0}")]
    Cache(#[from] dynent_cache::CacheError),

    #[error("fetch error: {0}")]
    Fetch(#[from] dynent_fetch::FetchError),
}

pub type SdkResult<T> = Result<T, SdkError>;
