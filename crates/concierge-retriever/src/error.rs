use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding provider error: {0}")]
    Provider(#[from] concierge_providers::provider::ProviderError),

    #[error("embedding dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

impl RetrievalError {
    pub fn code(&self) -> &'static str {
        match self {
            RetrievalError::Database(_) => "RETRIEVAL_DATABASE_ERROR",
            RetrievalError::Serialization(_) => "RETRIEVAL_SERIALIZATION_ERROR",
            RetrievalError::Provider(_) => "RETRIEVAL_PROVIDER_ERROR",
            RetrievalError::DimensionMismatch { .. } => "RETRIEVAL_DIMENSION_MISMATCH",
        }
    }
}

pub type Result<T> = std::result::Result<T, RetrievalError>;
