use thiserror::Error;

/// Process-level errors: configuration load, tenant lookup failure surfaced
/// to a caller, serialization. Component crates define their own error enums
/// (`PolicyError`, `ProcedureError`, …) — this one is for the shared core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Tenant not found: {id}")]
    TenantNotFound { id: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Short machine-readable code, reused in audit payloads and the `error`
    /// SSE event.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::Config(_) => "CONFIG_ERROR",
            CoreError::TenantNotFound { .. } => "TENANT_NOT_FOUND",
            CoreError::Serialization(_) => "SERIALIZATION_ERROR",
            CoreError::Io(_) => "IO_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
