use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::instrument;

use crate::error::Result;
use crate::types::{ChunkVector, SearchResult};

const PAGE_SIZE: i64 = 100;

/// Tenant-scoped vector store backed by SQLite. One connection per store
/// behind a `Mutex` rather than a connection pool — the concurrency model
/// does not require one (§4.7).
pub struct VectorStore {
    db: Mutex<Connection>,
}

impl VectorStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Opens an in-process store backed by SQLite's `:memory:` mode. Used
    /// by this crate's own tests and by downstream crates (e.g. the
    /// ingestion pipeline) that need a disposable store in their tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Insert or replace a chunk vector (ingestion writes; re-ingestion of
    /// the same source/version/chunk-index overwrites in place).
    #[instrument(skip(self, chunk), fields(tenant_id = %chunk.tenant_id, id = %chunk.id))]
    pub fn insert(&self, chunk: &ChunkVector) -> Result<()> {
        let embedding_blob = bincode::serialize(&chunk.embedding)
            .expect("serializing a Vec<f32> to bincode cannot fail");
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO chunk_vectors
                (id, tenant_id, source_id, chunk_index, text, embedding, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                embedding = excluded.embedding,
                metadata = excluded.metadata",
            params![
                chunk.id,
                chunk.tenant_id,
                chunk.source_id,
                chunk.chunk_index as i64,
                chunk.text,
                embedding_blob,
                chunk.metadata.to_string(),
            ],
        )?;
        Ok(())
    }

    /// Delete every vector belonging to a source, paging until exhausted
    /// (§4.4 "Deletion").
    #[instrument(skip(self), fields(tenant_id = %tenant_id, source_id = %source_id))]
    pub fn delete_by_source(&self, tenant_id: &str, source_id: &str) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let deleted = db.execute(
            "DELETE FROM chunk_vectors WHERE tenant_id = ?1 AND source_id = ?2",
            params![tenant_id, source_id],
        )?;
        Ok(deleted)
    }

    /// Cosine top-K search over every vector owned by `tenant_id`, scanned in
    /// pages of 100 using a keyset cursor on `id` (§4.4 "Search").
    #[instrument(skip(self, query_embedding), fields(tenant_id = %tenant_id, k))]
    pub fn search(&self, tenant_id: &str, query_embedding: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        let db = self.db.lock().unwrap();
        let mut scored: Vec<SearchResult> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut stmt = match &cursor {
                Some(after) => db.prepare(
                    "SELECT id, tenant_id, source_id, chunk_index, text, embedding, metadata
                     FROM chunk_vectors
                     WHERE tenant_id = ?1 AND id > ?2
                     ORDER BY id ASC
                     LIMIT ?3",
                )?,
                None => db.prepare(
                    "SELECT id, tenant_id, source_id, chunk_index, text, embedding, metadata
                     FROM chunk_vectors
                     WHERE tenant_id = ?1
                     ORDER BY id ASC
                     LIMIT ?2",
                )?,
            };

            let rows: Vec<ChunkVector> = match &cursor {
                Some(after) => stmt
                    .query_map(params![tenant_id, after, PAGE_SIZE], row_to_chunk)?
                    .filter_map(|r| r.ok())
                    .collect(),
                None => stmt
                    .query_map(params![tenant_id, PAGE_SIZE], row_to_chunk)?
                    .filter_map(|r| r.ok())
                    .collect(),
            };

            if rows.is_empty() {
                break;
            }

            cursor = rows.last().map(|c| c.id.clone());
            let page_len = rows.len();

            for chunk in rows {
                let score = cosine_similarity(&chunk.embedding, query_embedding);
                scored.push(SearchResult { chunk, score });
            }

            if (page_len as i64) < PAGE_SIZE {
                break;
            }
        }

        // Descending score, ties broken by ascending vector id for a
        // deterministic top-k across repeated queries over unchanged data.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        });
        scored.truncate(k);
        Ok(scored)
    }
}

fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS chunk_vectors (
            id            TEXT PRIMARY KEY,
            tenant_id     TEXT NOT NULL,
            source_id     TEXT NOT NULL,
            chunk_index   INTEGER NOT NULL,
            text          TEXT NOT NULL,
            embedding     BLOB NOT NULL,
            metadata      TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_chunk_vectors_tenant ON chunk_vectors(tenant_id, id);
        CREATE INDEX IF NOT EXISTS idx_chunk_vectors_source ON chunk_vectors(tenant_id, source_id);",
    )?;
    Ok(())
}

fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChunkVector> {
    let embedding_blob: Vec<u8> = row.get(5)?;
    let embedding: Vec<f32> = bincode::deserialize(&embedding_blob).unwrap_or_default();
    let metadata_str: String = row.get(6)?;
    Ok(ChunkVector {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        source_id: row.get(2)?,
        chunk_index: row.get::<_, i64>(3)? as usize,
        text: row.get(4)?,
        embedding,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
    })
}

/// `dot(a,b) / (‖a‖·‖b‖)`; zero magnitude on either side yields 0 (§4.4).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, tenant: &str, embedding: Vec<f32>) -> ChunkVector {
        ChunkVector {
            id: id.to_string(),
            tenant_id: tenant.to_string(),
            source_id: "src1".to_string(),
            chunk_index: 0,
            text: "hello".to_string(),
            embedding,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn cosine_similarity_zero_magnitude_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn search_is_tenant_scoped() {
        let store = VectorStore::in_memory().unwrap();
        store.insert(&chunk("a#chunk-0", "acme", vec![1.0, 0.0])).unwrap();
        store.insert(&chunk("b#chunk-0", "other", vec![1.0, 0.0])).unwrap();
        let results = store.search("acme", &[1.0, 0.0], 5).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].chunk.id, "a#chunk-0");
    }

    #[test]
    fn search_orders_by_descending_score() {
        let store = VectorStore::in_memory().unwrap();
        store.insert(&chunk("low#chunk-0", "acme", vec![0.1, 0.99])).unwrap();
        store.insert(&chunk("high#chunk-0", "acme", vec![1.0, 0.0])).unwrap();
        let results = store.search("acme", &[1.0, 0.0], 5).unwrap();
        assert_eq!(results[0].chunk.id, "high#chunk-0");
    }

    #[test]
    fn delete_by_source_removes_all_matching() {
        let store = VectorStore::in_memory().unwrap();
        store.insert(&chunk("a#chunk-0", "acme", vec![1.0, 0.0])).unwrap();
        store.insert(&chunk("a#chunk-1", "acme", vec![0.0, 1.0])).unwrap();
        let deleted = store.delete_by_source("acme", "src1").unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(store.search("acme", &[1.0, 0.0], 5).unwrap().len(), 0);
    }
}
