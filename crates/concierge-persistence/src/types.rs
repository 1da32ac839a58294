use serde::{Deserialize, Serialize};

use concierge_core::types::{Channel, ConversationStatus, Role, SourceId, TenantConfig};

/// A persisted conversation. Owns its messages (§3 "conversations own their
/// messages").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub tenant_id: String,
    pub channel: Channel,
    pub status: ConversationStatus,
    pub user_id: Option<String>,
    pub first_response_at: Option<String>,
    pub resolved_at: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

/// An append-only message within a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// `None` for user messages; `Some` for assistant messages that went
    /// through the confidence gate.
    pub confidence: Option<f32>,
    /// Deduplicated, first-occurrence-ordered source ids (empty for
    /// non-cited messages).
    pub citations: Vec<SourceId>,
    pub metadata: serde_json::Value,
    pub created_at: String,
}

/// An append-only, best-effort audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: String,
    pub tenant_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub created_at: String,
}

/// Row shape of the `tenants` table. Carries the same fields as
/// [`TenantConfig`] plus bookkeeping timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantRecord {
    pub config: TenantConfig,
    pub created_at: String,
    pub updated_at: String,
}
