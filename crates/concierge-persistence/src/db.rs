use rusqlite::Connection;

use crate::error::Result;

/// Open a connection and enable WAL so readers are never blocked by a writer
/// (the audit writer in particular — §4.7 "Connection model").
pub fn open(path: &str) -> Result<Connection> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    Ok(conn)
}

/// Initialise the `tenants` table. Safe to call on every startup.
pub fn init_tenants(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS tenants (
            tenant_id              TEXT PRIMARY KEY,
            confidence_threshold   REAL NOT NULL,
            max_history_messages   INTEGER NOT NULL,
            cache_ttl_secs         INTEGER NOT NULL,
            model_override         TEXT,
            system_prompt_prefix   TEXT,
            created_at             TEXT NOT NULL,
            updated_at             TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Initialise the `conversations` and `messages` tables and their indexes.
pub fn init_conversations(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS conversations (
            id                  TEXT PRIMARY KEY,
            tenant_id           TEXT NOT NULL,
            channel             TEXT NOT NULL,
            status              TEXT NOT NULL,
            user_id             TEXT,
            first_response_at   TEXT,
            resolved_at         TEXT,
            metadata            TEXT NOT NULL,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_conversations_tenant
            ON conversations(tenant_id, updated_at DESC);

        CREATE TABLE IF NOT EXISTS messages (
            id                TEXT PRIMARY KEY,
            conversation_id   TEXT NOT NULL,
            role              TEXT NOT NULL,
            content           TEXT NOT NULL,
            confidence        REAL,
            citations         TEXT NOT NULL,
            metadata          TEXT NOT NULL,
            created_at        TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id, created_at ASC);",
    )?;
    Ok(())
}

/// Initialise the `policies` table and its tenant index.
pub fn init_policies(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS policies (
            id          TEXT PRIMARY KEY,
            tenant_id   TEXT NOT NULL,
            name        TEXT NOT NULL,
            kind        TEXT NOT NULL,
            mode        TEXT NOT NULL,
            config      TEXT NOT NULL,
            enabled     INTEGER NOT NULL,
            priority    INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_policies_tenant ON policies(tenant_id);",
    )?;
    Ok(())
}

/// Initialise the `procedures` table and its tenant index.
pub fn init_procedures(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS procedures (
            id          TEXT PRIMARY KEY,
            tenant_id   TEXT NOT NULL,
            enabled     INTEGER NOT NULL,
            document    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_procedures_tenant ON procedures(tenant_id);",
    )?;
    Ok(())
}

/// Initialise the `data_connectors` table and its tenant index.
pub fn init_connectors(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS data_connectors (
            id          TEXT PRIMARY KEY,
            tenant_id   TEXT NOT NULL,
            enabled     INTEGER NOT NULL,
            document    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_connectors_tenant ON data_connectors(tenant_id);",
    )?;
    Ok(())
}

/// Initialise the `audit_events` table and its tenant index.
pub fn init_audit(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS audit_events (
            id           TEXT PRIMARY KEY,
            tenant_id    TEXT NOT NULL,
            event_type   TEXT NOT NULL,
            payload      TEXT NOT NULL,
            created_at   TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_audit_tenant
            ON audit_events(tenant_id, created_at DESC);",
    )?;
    Ok(())
}
