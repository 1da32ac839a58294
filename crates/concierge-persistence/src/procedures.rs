use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::instrument;

use concierge_procedures::types::Procedure;

use crate::db;
use crate::error::Result;

/// Tenant-scoped store for procedure documents (§4.3). The whole `Procedure`
/// round-trips as one JSON document; only `id`/`tenant_id`/`enabled` are
/// broken out into columns since nothing else is queried on.
pub struct ProcedureStore {
    db: Mutex<Connection>,
}

impl ProcedureStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = db::open(path)?;
        db::init_procedures(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_procedures(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn upsert(&self, procedure: &Procedure) -> Result<()> {
        let doc = serde_json::to_string(procedure)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO procedures (id, tenant_id, enabled, document)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET enabled = excluded.enabled, document = excluded.document",
            params![procedure.id, procedure.tenant_id, procedure.enabled, doc],
        )?;
        Ok(())
    }

    /// Fetch enabled procedures for a tenant, up to 100, in storage order
    /// (§4.3 "Matching" scans "up to 100" in storage order).
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn list_enabled(&self, tenant_id: &str) -> Result<Vec<Procedure>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT document FROM procedures WHERE tenant_id = ?1 AND enabled = 1 LIMIT 100",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], |row| row.get::<_, String>(0))?
            .filter_map(|r| r.ok())
            .filter_map(|doc| serde_json::from_str(&doc).ok())
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concierge_procedures::types::{Trigger, TriggerType};

    fn sample(tenant_id: &str) -> Procedure {
        Procedure {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: "refund-flow".to_string(),
            trigger: Trigger { kind: TriggerType::Keyword, condition: "refund".to_string() },
            steps: vec![],
            enabled: true,
            version: 1,
        }
    }

    #[test]
    fn list_enabled_is_tenant_scoped() {
        let store = ProcedureStore::in_memory().unwrap();
        store.upsert(&sample("acme")).unwrap();
        store.upsert(&sample("other")).unwrap();
        let procedures = store.list_enabled("acme").unwrap();
        assert_eq!(procedures.len(), 1);
        assert_eq!(procedures[0].tenant_id, "acme");
    }

    #[test]
    fn disabled_procedures_are_excluded() {
        let store = ProcedureStore::in_memory().unwrap();
        let mut p = sample("acme");
        p.enabled = false;
        store.upsert(&p).unwrap();
        assert!(store.list_enabled("acme").unwrap().is_empty());
    }
}
