use serde::{Deserialize, Serialize};

/// One cached resolved answer, keyed by `(tenant_id, fingerprint)` (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub id: i64,
    pub tenant_id: String,
    /// Embedding of the cleaned query that produced `content`.
    pub fingerprint: Vec<f32>,
    pub content: String,
    pub confidence: f32,
    pub citations: Vec<String>,
    pub created_at: String,
    pub expires_at: String,
}

/// What `get` hands back on a hit.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub content: String,
    pub confidence: f32,
    pub citations: Vec<String>,
}

/// Cosine similarity at or above which a cache entry counts as a hit (§4.5).
pub const SIMILARITY_THRESHOLD: f32 = 0.95;
