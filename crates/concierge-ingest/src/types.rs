use concierge_core::types::SourceStatus;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    File,
    Manual,
}

/// Triggers an ingestion run (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEvent {
    pub source_id: String,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub url: Option<String>,
    pub file_id: Option<String>,
    pub content: Option<String>,
    pub title: Option<String>,
    pub version: Option<u32>,
}

/// A persisted knowledge source row, owned by this crate since it mutates
/// only by ingestion (§3 "Knowledge Source").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeSource {
    pub id: String,
    pub tenant_id: String,
    pub kind: SourceKind,
    pub locator: String,
    pub status: SourceStatus,
    pub version: u32,
    pub metadata: serde_json::Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionResult {
    pub source_id: String,
    pub success: bool,
    pub chunks_count: usize,
    pub vectors_count: usize,
    pub error: Option<String>,
}
