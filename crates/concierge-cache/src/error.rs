use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    pub fn code(&self) -> &'static str {
        match self {
            CacheError::Database(_) => "CACHE_DATABASE_ERROR",
            CacheError::Serialization(_) => "CACHE_SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;
