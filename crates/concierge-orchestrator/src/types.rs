use concierge_core::types::{Channel, SourceId};

/// Per-call knobs for [`crate::orchestrator::Orchestrator::handle`].
#[derive(Debug, Clone, Default)]
pub struct HandleOptions {
    /// Skip every persistence write and every side-effecting external call
    /// (connector HTTP, cache populate) while still running the full
    /// pipeline logic — used for policy/procedure dry-runs.
    pub dry_run: bool,
}

/// Input to one orchestration call (§4.1 `handle`).
#[derive(Debug, Clone)]
pub struct HandleRequest {
    pub tenant_id: String,
    pub conversation_id: Option<String>,
    pub user_message: String,
    pub channel: Channel,
    pub user_id: Option<String>,
    pub options: HandleOptions,
}

/// Outcome of one orchestration call.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandleResult {
    pub resolved: bool,
    pub content: String,
    pub conversation_id: String,
    pub message_id: Option<String>,
    pub confidence: f32,
    pub citations: Vec<SourceId>,
    pub blocked_reason: Option<String>,
    pub escalated: bool,
    pub debug: serde_json::Value,
}

/// Events emitted by [`crate::orchestrator::Orchestrator::handle_stream`]
/// (§4.1 "Streaming mode"). Wire-format agnostic — the gateway maps each
/// variant directly onto its fixed SSE event shapes.
#[derive(Debug, Clone)]
pub enum HandleStreamEvent {
    /// One provider text chunk, forwarded verbatim as it arrives. May
    /// include text from an answer step 13 later rejects; callers must
    /// treat a trailing `Blocked`/`Escalated` as authoritative over any
    /// `Delta`s that preceded it.
    Delta { text: String },
    /// Generation completed and passed every gate.
    Done { conversation_id: String },
    /// Pre-policy gate rejected the message before generation ever started.
    Blocked { message: String },
    /// Escalated to a human — either no confident retrieval match (step 10)
    /// or a post-policy violation discarding the generated answer (step 13).
    Escalated { message: String, conversation_id: String },
    /// The pipeline call itself failed (cancellation, persistence fault).
    Error { message: String },
}
