use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::instrument;

use concierge_procedures::types::DataConnector;

use crate::db;
use crate::error::Result;

/// Tenant-scoped store for data connector documents (§4.3 `api_call` steps
/// resolve a connector through this store).
pub struct ConnectorStore {
    db: Mutex<Connection>,
}

impl ConnectorStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = db::open(path)?;
        db::init_connectors(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_connectors(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn upsert(&self, connector: &DataConnector) -> Result<()> {
        let doc = serde_json::to_string(connector)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO data_connectors (id, tenant_id, enabled, document)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET enabled = excluded.enabled, document = excluded.document",
            params![connector.id, connector.tenant_id, connector.enabled, doc],
        )?;
        Ok(())
    }

    /// All enabled connectors for a tenant, handed to the procedure executor
    /// so it can resolve `api_call`/`data_lookup` steps without a second
    /// round-trip per step.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn list_enabled(&self, tenant_id: &str) -> Result<Vec<DataConnector>> {
        let db = self.db.lock().unwrap();
        let mut stmt =
            db.prepare("SELECT document FROM data_connectors WHERE tenant_id = ?1 AND enabled = 1")?;
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
    use concierge_procedures::types::ConnectorAuth;
    use concierge_procedures::types::ConnectorAuthType;

    fn sample(tenant_id: &str) -> DataConnector {
        DataConnector {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            provider: "shipping-api".to_string(),
            auth: ConnectorAuth {
                kind: ConnectorAuthType::ApiKey,
                credentials: serde_json::json!({"key": "secret"}),
                base_url: "https://example.com".to_string(),
            },
            endpoints: vec![],
            enabled: true,
        }
    }

    #[test]
    fn list_enabled_is_tenant_scoped() {
        let store = ConnectorStore::in_memory().unwrap();
        store.upsert(&sample("acme")).unwrap();
        store.upsert(&sample("other")).unwrap();
        let connectors = store.list_enabled("acme").unwrap();
        assert_eq!(connectors.len(), 1);
        assert_eq!(connectors[0].tenant_id, "acme");
    }
}
