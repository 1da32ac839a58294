use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::instrument;

use concierge_policy::types::{Policy, PolicyKind, PolicyMode};

use crate::db;
use crate::error::Result;

/// Tenant-scoped store for policy rows (§4.7, §4.2 "Loaded per request").
pub struct PolicyStore {
    db: Mutex<Connection>,
}

impl PolicyStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = db::open(path)?;
        db::init_policies(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_policies(&conn)?;
        Ok(Self { db: Mutex::new(conn) })
    }

    pub fn upsert(&self, policy: &Policy) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO policies (id, tenant_id, name, kind, mode, config, enabled, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name, kind = excluded.kind, mode = excluded.mode,
                config = excluded.config, enabled = excluded.enabled, priority = excluded.priority",
            params![
                policy.id,
                policy.tenant_id,
                policy.name,
                kind_str(policy.kind),
                mode_str(policy.mode),
                policy.config.to_string(),
                policy.enabled,
                policy.priority,
            ],
        )?;
        Ok(())
    }

    /// Fetch all enabled policies for a tenant (pipeline step 2). Ordering
    /// (priority-descending within a phase) is the caller's responsibility —
    /// `concierge_policy::validate` re-sorts before evaluating.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn list_enabled(&self, tenant_id: &str) -> Result<Vec<Policy>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, tenant_id, name, kind, mode, config, enabled, priority
             FROM policies WHERE tenant_id = ?1 AND enabled = 1",
        )?;
        let rows = stmt
            .query_map(params![tenant_id], row_to_policy)?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }
}

fn kind_str(kind: PolicyKind) -> &'static str {
    match kind {
        PolicyKind::TopicFilter => "topic_filter",
        PolicyKind::PiiFilter => "pii_filter",
        PolicyKind::Tone => "tone",
        PolicyKind::Length => "length",
    }
}

fn mode_str(mode: PolicyMode) -> &'static str {
    match mode {
        PolicyMode::Pre => "pre",
        PolicyMode::Post => "post",
    }
}

fn row_to_policy(row: &rusqlite::Row<'_>) -> rusqlite::Result<Policy> {
    let kind_str: String = row.get(3)?;
    let mode_str: String = row.get(4)?;
    let config_str: String = row.get(5)?;
    let kind = match kind_str.as_str() {
        "topic_filter" => PolicyKind::TopicFilter,
        "pii_filter" => PolicyKind::PiiFilter,
        "tone" => PolicyKind::Tone,
        _ => PolicyKind::Length,
    };
    let mode = if mode_str == "pre" { PolicyMode::Pre } else { PolicyMode::Post };
    Ok(Policy {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        name: row.get(2)?,
        kind,
        mode,
        config: serde_json::from_str(&config_str).unwrap_or(serde_json::json!({})),
        enabled: row.get(6)?,
        priority: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(tenant_id: &str, priority: i32) -> Policy {
        Policy {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            name: "block-competitors".to_string(),
            kind: PolicyKind::TopicFilter,
            mode: PolicyMode::Pre,
            config: serde_json::json!({"blocked_topics": ["acme-rival"]}),
            enabled: true,
            priority,
        }
    }

    #[test]
    fn list_enabled_is_tenant_scoped() {
        let store = PolicyStore::in_memory().unwrap();
        store.upsert(&sample("acme", 10)).unwrap();
        store.upsert(&sample("other", 10)).unwrap();
        let policies = store.list_enabled("acme").unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].tenant_id, "acme");
    }

    #[test]
    fn disabled_policies_are_excluded() {
        let store = PolicyStore::in_memory().unwrap();
        let mut p = sample("acme", 10);
        p.enabled = false;
        store.upsert(&p).unwrap();
        assert!(store.list_enabled("acme").unwrap().is_empty());
    }

    #[test]
    fn upsert_is_idempotent_by_id() {
        let store = PolicyStore::in_memory().unwrap();
        let mut p = sample("acme", 10);
        store.upsert(&p).unwrap();
        p.priority = 99;
        store.upsert(&p).unwrap();
        let policies = store.list_enabled("acme").unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].priority, 99);
    }
}
