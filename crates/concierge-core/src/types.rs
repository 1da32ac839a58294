use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Tenant identifier — the isolation unit for every record in the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies a conversation. UUIDv7 so ids sort chronologically in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ConversationId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Identifies a single append-only message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a knowledge source (url/file/manual) owned by a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId(pub String);

impl SourceId {
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for SourceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SourceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Inbound channel a message arrived on. Channel *adapters* (Telegram, Discord,
/// …) live outside this crate — this enum is the abstract contract they target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Web,
    Email,
    Whatsapp,
    Sms,
    Voice,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Web => write!(f, "web"),
            Channel::Email => write!(f, "email"),
            Channel::Whatsapp => write!(f, "whatsapp"),
            Channel::Sms => write!(f, "sms"),
            Channel::Voice => write!(f, "voice"),
        }
    }
}

impl std::str::FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "web" => Ok(Channel::Web),
            "email" => Ok(Channel::Email),
            "whatsapp" => Ok(Channel::Whatsapp),
            "sms" => Ok(Channel::Sms),
            "voice" => Ok(Channel::Voice),
            other => Err(format!("unknown channel: {other}")),
        }
    }
}

/// Conversation lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationStatus {
    Active,
    Resolved,
    Escalated,
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationStatus::Active => write!(f, "active"),
            ConversationStatus::Resolved => write!(f, "resolved"),
            ConversationStatus::Escalated => write!(f, "escalated"),
        }
    }
}

impl std::str::FromStr for ConversationStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConversationStatus::Active),
            "resolved" => Ok(ConversationStatus::Resolved),
            "escalated" => Ok(ConversationStatus::Escalated),
            other => Err(format!("unknown conversation status: {other}")),
        }
    }
}

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// Knowledge source lifecycle status, driven only by the ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Processing,
    Ready,
    Failed,
}

impl fmt::Display for SourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceStatus::Processing => write!(f, "processing"),
            SourceStatus::Ready => write!(f, "ready"),
            SourceStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SourceStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "processing" => Ok(SourceStatus::Processing),
            "ready" => Ok(SourceStatus::Ready),
            "failed" => Ok(SourceStatus::Failed),
            other => Err(format!("unknown source status: {other}")),
        }
    }
}

/// Per-tenant configuration materialized from the `tenants` table.
///
/// A tenant row that omits any of these fields falls back to the default
/// here rather than failing load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: TenantId,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default = "default_max_history_messages")]
    pub max_history_messages: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: i64,
    pub model_override: Option<String>,
    pub system_prompt_prefix: Option<String>,
}

impl TenantConfig {
    /// Defaults used when the tenant record cannot be read (pipeline step 1:
    /// "If unreadable, use defaults").
    pub fn defaults(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            confidence_threshold: default_confidence_threshold(),
            max_history_messages: default_max_history_messages(),
            cache_ttl_secs: default_cache_ttl_secs(),
            model_override: None,
            system_prompt_prefix: None,
        }
    }
}

pub fn default_confidence_threshold() -> f32 {
    0.7
}

pub fn default_max_history_messages() -> usize {
    10
}

pub fn default_cache_ttl_secs() -> i64 {
    3600
}

/// Default embedding dimension shared by every tenant.
pub const DEFAULT_EMBEDDING_DIM: usize = 1024;

/// Default retrieval fan-out (orchestrator pipeline step 9).
pub const DEFAULT_RETRIEVAL_K: usize = 5;

/// The three fixed, non-leaking user-visible messages.
pub const POLICY_BLOCKED_MESSAGE: &str =
    "I'm not able to help with that request. Please rephrase or contact a human agent.";
pub const LOW_CONFIDENCE_MESSAGE: &str =
    "I don't have enough information to answer that confidently. I'm connecting you with a human agent.";
pub const GENERATION_FALLBACK_MESSAGE: &str =
    "I'm having trouble generating a response right now. Please try again in a moment.";

/// Deterministic vector id: `{sourceId}#v{version}#chunk-{index}`, with the
/// version segment omitted when absent.
pub fn vector_id(source_id: &SourceId, version: Option<u32>, chunk_index: usize) -> String {
    match version {
        Some(v) => format!("{source_id}#v{v}#chunk-{chunk_index}"),
        None => format!("{source_id}#chunk-{chunk_index}"),
    }
}

/// Persisted document id derived from a vector id: non-alphanumeric (outside
/// `._-`) characters become `_`, then truncated to 36 characters.
pub fn document_id(vector_id: &str) -> String {
    let sanitized: String = vector_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    sanitized.chars().take(36).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vector_id_includes_version_when_present() {
        let id = vector_id(&SourceId::from("src1"), Some(2), 3);
        assert_eq!(id, "src1#v2#chunk-3");
    }

    #[test]
    fn vector_id_omits_version_when_absent() {
        let id = vector_id(&SourceId::from("src1"), None, 0);
        assert_eq!(id, "src1#chunk-0");
    }

    #[test]
    fn document_id_sanitizes_and_truncates() {
        let long_source = "a".repeat(50);
        let id = vector_id(&SourceId::from(long_source), Some(1), 0);
        let doc_id = document_id(&id);
        assert_eq!(doc_id.len(), 36);
        assert!(doc_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-'));
    }
}
