use thiserror::Error;

/// Errors raised by the persistence gateway (C7): tenants, conversations,
/// messages, and audit events.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("conversation not found: {id}")]
    ConversationNotFound { id: String },

    #[error("tenant not found: {id}")]
    TenantNotFound { id: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistenceError {
    pub fn code(&self) -> &'static str {
        match self {
            PersistenceError::ConversationNotFound { .. } => "CONVERSATION_NOT_FOUND",
            PersistenceError::TenantNotFound { .. } => "TENANT_NOT_FOUND",
            PersistenceError::Database(_) => "DATABASE_ERROR",
            PersistenceError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
