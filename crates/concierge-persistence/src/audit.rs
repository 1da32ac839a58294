use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::conversations::Cursor;
use crate::db;
use crate::error::Result;
use crate::types::AuditEvent;

/// Append-only audit log. Writes are best-effort (§3 "written asynchronously;
/// best-effort") — callers use [`AuditStore::record_best_effort`] to log and
/// swallow failures rather than fail the request that triggered the event.
pub struct AuditStore {
    db: Mutex<Connection>,
}

impl AuditStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = db::open(path)?;
        db::init_audit(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_audit(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    #[instrument(skip(self, payload), fields(tenant_id, event_type))]
    pub fn record(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value) -> Result<()> {
        let event = AuditEvent {
            id: Uuid::now_v7().to_string(),
            tenant_id: tenant_id.to_string(),
            event_type: event_type.to_string(),
            payload,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO audit_events (id, tenant_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                event.id,
                event.tenant_id,
                event.event_type,
                event.payload.to_string(),
                event.created_at,
            ],
        )?;
        Ok(())
    }

    /// Record an event, logging and discarding any failure instead of
    /// propagating it — the shape every orchestrator call site uses.
    pub fn record_best_effort(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value) {
        if let Err(e) = self.record(tenant_id, event_type, payload) {
            warn!(tenant_id, event_type, error = %e, "audit write failed");
        }
    }

    #[instrument(skip(self), fields(tenant_id, limit))]
    pub fn list_for_tenant(
        &self,
        tenant_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<AuditEvent>> {
        let db = self.db.lock().unwrap();
        let rows = match cursor {
            Some(c) => {
                let mut stmt = db.prepare(
                    "SELECT id, tenant_id, event_type, payload, created_at
                     FROM audit_events
                     WHERE tenant_id = ?1 AND (created_at, id) < (?2, ?3)
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?4",
                )?;
                let result = stmt
                    .query_map(
                        params![tenant_id, c.created_at, c.id, limit as i64],
                        row_to_event,
                    )?
                    .filter_map(|r| r.ok())
                    .collect();
                result
            }
            None => {
                let mut stmt = db.prepare(
                    "SELECT id, tenant_id, event_type, payload, created_at
                     FROM audit_events
                     WHERE tenant_id = ?1
                     ORDER BY created_at DESC, id DESC
                     LIMIT ?2",
                )?;
                let result = stmt
                    .query_map(params![tenant_id, limit as i64], row_to_event)?
                    .filter_map(|r| r.ok())
                    .collect();
                result
            }
        };
        Ok(rows)
    }
}

impl concierge_core::audit::AuditSink for AuditStore {
    fn record_best_effort(&self, tenant_id: &str, event_type: &str, payload: serde_json::Value) {
        AuditStore::record_best_effort(self, tenant_id, event_type, payload);
    }
}

fn row_to_event(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditEvent> {
    let payload_str: String = row.get(3)?;
    Ok(AuditEvent {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        event_type: row.get(2)?,
        payload: serde_json::from_str(&payload_str).unwrap_or(serde_json::json!({})),
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_then_list_returns_newest_first() {
        let store = AuditStore::in_memory().unwrap();
        store
            .record("acme", "conversation.created", serde_json::json!({"n": 1}))
            .unwrap();
        store
            .record("acme", "message.received", serde_json::json!({"n": 2}))
            .unwrap();
        let events = store.list_for_tenant("acme", None, 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, "message.received");
    }

    #[test]
    fn record_best_effort_never_panics_on_success() {
        let store = AuditStore::in_memory().unwrap();
        store.record_best_effort("acme", "cache.hit", serde_json::json!({}));
        assert_eq!(store.list_for_tenant("acme", None, 10).unwrap().len(), 1);
    }
}
