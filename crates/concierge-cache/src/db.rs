use rusqlite::{Connection, Result};

/// Initialise cache tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_cache_entries_table(conn)
}

fn create_cache_entries_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache_entries (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            tenant_id   TEXT NOT NULL,
            fingerprint BLOB NOT NULL,
            content     TEXT NOT NULL,
            confidence  REAL NOT NULL,
            citations   TEXT NOT NULL,
            created_at  TEXT NOT NULL,
            expires_at  TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cache_tenant
            ON cache_entries(tenant_id, expires_at);",
    )
}
