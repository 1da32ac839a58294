use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("source not found: {0}")]
    SourceNotFound(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("unsupported source format: {0}")]
    Unsupported(String),

    #[error("extracted text is empty")]
    EmptyText,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("retrieval error: {0}")]
    Retrieval(#[from] concierge_retriever::RetrievalError),
}

impl IngestError {
    pub fn code(&self) -> &'static str {
        match self {
            IngestError::Database(_) => "INGEST_DATABASE_ERROR",
            IngestError::SourceNotFound(_) => "INGEST_SOURCE_NOT_FOUND",
            IngestError::Extraction(_) => "INGEST_EXTRACTION_FAILED",
            IngestError::Unsupported(_) => "INGEST_UNSUPPORTED_FORMAT",
            IngestError::EmptyText => "INGEST_EMPTY_TEXT",
            IngestError::Http(_) => "INGEST_HTTP_ERROR",
            IngestError::Retrieval(_) => "INGEST_RETRIEVAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;
