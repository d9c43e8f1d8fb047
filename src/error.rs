use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Embedding service unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Record store unavailable: {0}")]
    StoreUnavailable(#[source] StoreError),
    #[error("Embedding computed but not persisted: {0}")]
    PersistenceFailed(String),
    #[error("Search cancelled")]
    Cancelled,
}

impl EngineError {
    /// Stable identifier for the inbound API and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::InvalidInput(_) => "invalid_input",
            EngineError::UpstreamUnavailable(_) => "upstream_unavailable",
            EngineError::StoreUnavailable(_) => "store_unavailable",
            EngineError::PersistenceFailed(_) => "persistence_failed",
            EngineError::Cancelled => "cancelled",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    Database(#[from] surrealdb::Error),
    #[error("Store returned no record for {0}")]
    MissingRecord(String),
}

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Embedding request failed: {0}")]
    Request(String),
    #[error("Model returned {actual} dimensions, expected {expected}")]
    Dimension {
        expected: usize,
        actual: usize,
    },
    #[error("Model returned no embedding")]
    Empty,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue {
        key: &'static str,
        value: String,
    },
    #[error("Missing required setting {0}")]
    Missing(&'static str),
    #[error("Unsupported embedding model: {0}")]
    UnsupportedModel(String),
}
