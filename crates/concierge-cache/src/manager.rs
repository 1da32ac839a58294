use std::collections::HashMap;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::warn;

use crate::error::Result;
use crate::types::{CacheEntry, CacheHit, SIMILARITY_THRESHOLD};

/// Max in-memory entries retained per tenant for back-to-back hit avoidance.
const MAX_RECENT_PER_TENANT: usize = 32;

/// Tenant-scoped semantic response cache (§4.5).
///
/// Thread-safe: wraps the SQLite connection in a `Mutex` and keeps an
/// in-memory map from tenant id to its most-recently-written entries to
/// avoid rescanning SQLite on back-to-back hits within the same tenant.
pub struct CacheStore {
    db: Mutex<Connection>,
    recent: Mutex<HashMap<String, Vec<CacheEntry>>>,
}

impl CacheStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        crate::db::init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            recent: Mutex::new(HashMap::new()),
        })
    }

    /// Opens an in-process store backed by SQLite's `:memory:` mode. Used
    /// by this crate's own tests and by downstream crates (e.g. the
    /// ingestion pipeline) that need a disposable cache in their tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        crate::db::init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
            recent: Mutex::new(HashMap::new()),
        })
    }

    /// Nearest-neighbor lookup within the tenant's cache entries. Cache
    /// faults are non-fatal: any read error is logged and treated as a miss.
    pub fn get(&self, tenant_id: &str, query_fingerprint: &[f32]) -> Option<CacheHit> {
        let now = chrono::Utc::now().to_rfc3339();

        if let Some(hit) = self.best_match(tenant_id, query_fingerprint, &now, true) {
            return Some(hit);
        }

        match self.load_unexpired(tenant_id, &now) {
            Ok(entries) => {
                let mut recent = self.recent.lock().unwrap();
                recent.insert(tenant_id.to_string(), entries);
                drop(recent);
                self.best_match(tenant_id, query_fingerprint, &now, false)
            }
            Err(e) => {
                warn!(tenant_id, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    fn best_match(
        &self,
        tenant_id: &str,
        query_fingerprint: &[f32],
        now: &str,
        from_cache_only: bool,
    ) -> Option<CacheHit> {
        let recent = self.recent.lock().unwrap();
        let entries = recent.get(tenant_id)?;
        if from_cache_only && entries.is_empty() {
            return None;
        }
        entries
            .iter()
            .filter(|e| e.expires_at.as_str() > now)
            .map(|e| (e, cosine_similarity(&e.fingerprint, query_fingerprint)))
            .filter(|(_, score)| *score >= SIMILARITY_THRESHOLD)
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(entry, _)| CacheHit {
                content: entry.content.clone(),
                confidence: entry.confidence,
                citations: entry.citations.clone(),
            })
    }

    fn load_unexpired(&self, tenant_id: &str, now: &str) -> Result<Vec<CacheEntry>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, tenant_id, fingerprint, content, confidence, citations,
                    created_at, expires_at
             FROM cache_entries
             WHERE tenant_id = ?1 AND expires_at > ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![tenant_id, now], row_to_entry)?;
        Ok(rows.filter_map(|r| r.ok()).collect())
    }

    /// Write a resolved answer into the tenant's cache. Write errors are
    /// logged and ignored per the cache's non-fatal failure policy.
    pub fn set(
        &self,
        tenant_id: &str,
        fingerprint: &[f32],
        content: &str,
        confidence: f32,
        citations: &[String],
        ttl_seconds: i64,
    ) {
        let now = chrono::Utc::now();
        let expires_at = (now + chrono::Duration::seconds(ttl_seconds)).to_rfc3339();
        let created_at = now.to_rfc3339();

        let fingerprint_blob = match bincode::serialize(&fingerprint.to_vec()) {
            Ok(blob) => blob,
            Err(e) => {
                warn!(tenant_id, error = %e, "cache write failed: could not encode fingerprint");
                return;
            }
        };
        let citations_json = match serde_json::to_string(citations) {
            Ok(json) => json,
            Err(e) => {
                warn!(tenant_id, error = %e, "cache write failed: could not encode citations");
                return;
            }
        };

        let id = {
            let db = self.db.lock().unwrap();
            let result = db.execute(
                "INSERT INTO cache_entries
                    (tenant_id, fingerprint, content, confidence, citations, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    tenant_id,
                    fingerprint_blob,
                    content,
                    confidence,
                    citations_json,
                    created_at,
                    expires_at,
                ],
            );
            match result {
                Ok(_) => db.last_insert_rowid(),
                Err(e) => {
                    warn!(tenant_id, error = %e, "cache write failed");
                    return;
                }
            }
        };

        let entry = CacheEntry {
            id,
            tenant_id: tenant_id.to_string(),
            fingerprint: fingerprint.to_vec(),
            content: content.to_string(),
            confidence,
            citations: citations.to_vec(),
            created_at,
            expires_at,
        };

        let mut recent = self.recent.lock().unwrap();
        let slice = recent.entry(tenant_id.to_string()).or_default();
        slice.push(entry);
        if slice.len() > MAX_RECENT_PER_TENANT {
            slice.remove(0);
        }
    }

    /// Remove every entry for a tenant, both durable and in-memory. Invoked
    /// by the ingestion pipeline after any successful source publication.
    pub fn invalidate_tenant(&self, tenant_id: &str) {
        {
            let db = self.db.lock().unwrap();
            if let Err(e) = db.execute(
                "DELETE FROM cache_entries WHERE tenant_id = ?1",
                rusqlite::params![tenant_id],
            ) {
                warn!(tenant_id, error = %e, "cache invalidation failed");
            }
        }
        self.recent.lock().unwrap().remove(tenant_id);
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CacheEntry> {
    let fingerprint_blob: Vec<u8> = row.get(2)?;
    let fingerprint: Vec<f32> = bincode::deserialize(&fingerprint_blob).unwrap_or_default();
    let citations_json: String = row.get(5)?;
    let citations: Vec<String> = serde_json::from_str(&citations_json).unwrap_or_default();
    Ok(CacheEntry {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        fingerprint,
        content: row.get(3)?,
        confidence: row.get(4)?,
        citations,
        created_at: row.get(6)?,
        expires_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_on_empty_cache() {
        let store = CacheStore::in_memory().unwrap();
        assert!(store.get("acme", &[1.0, 0.0]).is_none());
    }

    #[test]
    fn set_then_get_is_a_hit_for_near_identical_query() {
        let store = CacheStore::in_memory().unwrap();
        store.set("acme", &[1.0, 0.0], "the answer", 0.9, &["src1".to_string()], 3600);
        let hit = store.get("acme", &[1.0, 0.0]).expect("expected cache hit");
        assert_eq!(hit.content, "the answer");
        assert_eq!(hit.citations, vec!["src1".to_string()]);
    }

    #[test]
    fn dissimilar_query_is_a_miss() {
        let store = CacheStore::in_memory().unwrap();
        store.set("acme", &[1.0, 0.0], "the answer", 0.9, &[], 3600);
        assert!(store.get("acme", &[0.0, 1.0]).is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let store = CacheStore::in_memory().unwrap();
        store.set("acme", &[1.0, 0.0], "the answer", 0.9, &[], -10);
        assert!(store.get("acme", &[1.0, 0.0]).is_none());
    }

    #[test]
    fn cross_tenant_lookup_is_a_miss() {
        let store = CacheStore::in_memory().unwrap();
        store.set("acme", &[1.0, 0.0], "the answer", 0.9, &[], 3600);
        assert!(store.get("other", &[1.0, 0.0]).is_none());
    }

    #[test]
    fn invalidate_tenant_clears_durable_and_recent() {
        let store = CacheStore::in_memory().unwrap();
        store.set("acme", &[1.0, 0.0], "the answer", 0.9, &[], 3600);
        store.invalidate_tenant("acme");
        assert!(store.get("acme", &[1.0, 0.0]).is_none());
    }
}
