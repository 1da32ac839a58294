use std::sync::Mutex;

use rusqlite::Connection;

use crate::error::Result;
use crate::types::{KnowledgeSource, SourceKind};

/// Initialise the `knowledge_sources` schema in `conn`. Idempotent.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS knowledge_sources (
            id          TEXT NOT NULL PRIMARY KEY,
            tenant_id   TEXT NOT NULL,
            kind        TEXT NOT NULL,
            locator     TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'processing',
            version     INTEGER NOT NULL DEFAULT 1,
            metadata    TEXT NOT NULL DEFAULT '{}',
            created_at  TEXT NOT NULL,
            updated_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sources_tenant ON knowledge_sources(tenant_id);",
    )?;
    Ok(())
}

/// Durable store for knowledge sources. Mutated only by the ingestion
/// pipeline transitioning a source toward `ready` or `failed` (§3).
pub struct KnowledgeSourceStore {
    db: Mutex<Connection>,
}

impl KnowledgeSourceStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    #[cfg(test)]
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn upsert_processing(
        &self,
        tenant_id: &str,
        source_id: &str,
        kind: SourceKind,
        locator: &str,
        version: u32,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let kind_str = serde_json::to_value(kind).unwrap().as_str().unwrap().to_string();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO knowledge_sources
                (id, tenant_id, kind, locator, status, version, metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'processing', ?5, '{}', ?6, ?6)
             ON CONFLICT(id) DO UPDATE SET
                locator = excluded.locator,
                status = 'processing',
                version = excluded.version,
                updated_at = excluded.updated_at",
            rusqlite::params![source_id, tenant_id, kind_str, locator, version, now],
        )?;
        Ok(())
    }

    pub fn mark_ready(&self, source_id: &str, metadata: serde_json::Value) -> Result<()> {
        self.set_status(source_id, "ready", metadata)
    }

    pub fn mark_failed(&self, source_id: &str, error: &str) -> Result<()> {
        self.set_status(source_id, "failed", serde_json::json!({"error": error}))
    }

    fn set_status(&self, source_id: &str, status: &str, metadata: serde_json::Value) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE knowledge_sources SET status = ?1, metadata = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![status, metadata.to_string(), now, source_id],
        )?;
        Ok(())
    }

    pub fn get(&self, source_id: &str) -> Result<Option<KnowledgeSource>> {
        let db = self.db.lock().unwrap();
        let result = db.query_row(
            "SELECT id, tenant_id, kind, locator, status, version, metadata, created_at, updated_at
             FROM knowledge_sources WHERE id = ?1",
            [source_id],
            row_to_source,
        );
        match result {
            Ok(source) => Ok(Some(source)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn row_to_source(row: &rusqlite::Row<'_>) -> rusqlite::Result<KnowledgeSource> {
    let kind_str: String = row.get(2)?;
    let status_str: String = row.get(4)?;
    let metadata_str: String = row.get(6)?;
    Ok(KnowledgeSource {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        kind: serde_json::from_value(serde_json::Value::String(kind_str)).unwrap_or(SourceKind::Manual),
        locator: row.get(3)?,
        status: status_str.parse().unwrap_or(concierge_core::types::SourceStatus::Processing),
        version: row.get(5)?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}
