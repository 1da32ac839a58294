use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::instrument;

use concierge_core::types::{TenantConfig, TenantId};

use crate::db;
use crate::error::Result;

/// Tenant-scoped configuration store. One connection per store, behind a
/// `Mutex` rather than a pool (§4.7 "Connection model").
pub struct TenantStore {
    db: Mutex<Connection>,
}

impl TenantStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = db::open(path)?;
        db::init_tenants(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_tenants(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Read a tenant's configuration, falling back to defaults if the row
    /// is absent — pipeline step 1: "If unreadable, use defaults."
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn get_or_default(&self, tenant_id: &TenantId) -> TenantConfig {
        match self.get(tenant_id) {
            Ok(Some(cfg)) => cfg,
            _ => TenantConfig::defaults(tenant_id.clone()),
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn get(&self, tenant_id: &TenantId) -> Result<Option<TenantConfig>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT tenant_id, confidence_threshold, max_history_messages, cache_ttl_secs,
                    model_override, system_prompt_prefix
             FROM tenants WHERE tenant_id = ?1",
            params![tenant_id.as_str()],
            row_to_config,
        ) {
            Ok(cfg) => Ok(Some(cfg)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create or replace a tenant's configuration row.
    #[instrument(skip(self, config), fields(tenant_id = %config.tenant_id))]
    pub fn upsert(&self, config: &TenantConfig) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO tenants
                (tenant_id, confidence_threshold, max_history_messages, cache_ttl_secs,
                 model_override, system_prompt_prefix, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(tenant_id) DO UPDATE SET
                confidence_threshold = excluded.confidence_threshold,
                max_history_messages = excluded.max_history_messages,
                cache_ttl_secs       = excluded.cache_ttl_secs,
                model_override       = excluded.model_override,
                system_prompt_prefix = excluded.system_prompt_prefix,
                updated_at           = excluded.updated_at",
            params![
                config.tenant_id.as_str(),
                config.confidence_threshold,
                config.max_history_messages as i64,
                config.cache_ttl_secs,
                config.model_override,
                config.system_prompt_prefix,
                now,
            ],
        )?;
        Ok(())
    }
}

fn row_to_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<TenantConfig> {
    Ok(TenantConfig {
        tenant_id: TenantId::from(row.get::<_, String>(0)?),
        confidence_threshold: row.get(1)?,
        max_history_messages: row.get::<_, i64>(2)? as usize,
        cache_ttl_secs: row.get(3)?,
        model_override: row.get(4)?,
        system_prompt_prefix: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tenant_falls_back_to_defaults() {
        let store = TenantStore::in_memory().unwrap();
        let id = TenantId::from("acme");
        let cfg = store.get_or_default(&id);
        assert_eq!(cfg.confidence_threshold, 0.7);
    }

    #[test]
    fn upsert_then_get_roundtrips() {
        let store = TenantStore::in_memory().unwrap();
        let mut cfg = TenantConfig::defaults(TenantId::from("acme"));
        cfg.confidence_threshold = 0.9;
        store.upsert(&cfg).unwrap();
        let fetched = store.get(&cfg.tenant_id).unwrap().unwrap();
        assert_eq!(fetched.confidence_threshold, 0.9);
    }
}
