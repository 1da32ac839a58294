use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcedureError {
    #[error("step not found: {0}")]
    StepNotFound(String),

    #[error("connector not found: {0}")]
    ConnectorNotFound(String),

    #[error("connector {0} belongs to a different tenant")]
    CrossTenantConnector(String),

    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProcedureError {
    pub fn code(&self) -> &'static str {
        match self {
            ProcedureError::StepNotFound(_) => "PROCEDURE_STEP_NOT_FOUND",
            ProcedureError::ConnectorNotFound(_) => "PROCEDURE_CONNECTOR_NOT_FOUND",
            ProcedureError::CrossTenantConnector(_) => "PROCEDURE_CROSS_TENANT_CONNECTOR",
            ProcedureError::EndpointNotFound(_) => "PROCEDURE_ENDPOINT_NOT_FOUND",
            ProcedureError::Http(_) => "PROCEDURE_HTTP_ERROR",
            ProcedureError::Json(_) => "PROCEDURE_JSON_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProcedureError>;
