use serde::{Deserialize, Serialize};

/// One embedded chunk of a knowledge source (§3 "Chunk Vector").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkVector {
    /// Deterministic id: `concierge_core::types::vector_id`.
    pub id: String,
    pub tenant_id: String,
    pub source_id: String,
    pub chunk_index: usize,
    /// ≤10 KB snapshot of the chunk's source text.
    pub text: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// A scored retrieval hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub chunk: ChunkVector,
    pub score: f32,
}
