use thiserror::Error;

/// Errors that propagate out of the pipeline. Every other component failure
/// (policy load, procedure load, cache, audit, embedding, retrieval,
/// generation) is caught and logged at its call site and turned into a
/// degraded-but-successful outcome instead (§7 "Propagation") — conversation
/// bookkeeping is the one thing whose failure genuinely means the call
/// cannot be trusted to have happened.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("request cancelled")]
    Cancelled,

    #[error("persistence error: {0}")]
    Persistence(#[from] concierge_persistence::PersistenceError),
}

impl OrchestratorError {
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Cancelled => "ORCHESTRATOR_CANCELLED",
            OrchestratorError::Persistence(_) => "ORCHESTRATOR_PERSISTENCE_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
