use std::sync::Mutex;

use rusqlite::{params, Connection};
use tracing::instrument;

use concierge_core::types::{Channel, ConversationId, ConversationStatus, Role, SourceId};

use crate::db;
use crate::error::{PersistenceError, Result};
use crate::types::{Conversation, Message};

/// A keyset pagination cursor: the `(created_at, id)` of the last row seen.
/// Ties on `created_at` are broken by `id` so the cursor is unambiguous even
/// when two rows share a timestamp.
#[derive(Debug, Clone)]
pub struct Cursor {
    pub created_at: String,
    pub id: String,
}

/// Conversation and message store — the two tables share a connection since
/// every message write is immediately followed by a conversation touch
/// (§4.7 groups "conversations/messages" as one logical store).
pub struct ConversationStore {
    db: Mutex<Connection>,
}

impl ConversationStore {
    pub fn open(path: &str) -> Result<Self> {
        let conn = db::open(path)?;
        db::init_conversations(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        db::init_conversations(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// Create a new conversation — pipeline step 5 ("Ensure conversation").
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub fn create(
        &self,
        tenant_id: &str,
        channel: Channel,
        user_id: Option<&str>,
    ) -> Result<Conversation> {
        let id = ConversationId::new().to_string();
        let now = chrono::Utc::now().to_rfc3339();
        let conversation = Conversation {
            id: id.clone(),
            tenant_id: tenant_id.to_string(),
            channel,
            status: ConversationStatus::Active,
            user_id: user_id.map(str::to_string),
            first_response_at: None,
            resolved_at: None,
            metadata: serde_json::json!({}),
            created_at: now.clone(),
            updated_at: now,
        };

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO conversations
                (id, tenant_id, channel, status, user_id, first_response_at, resolved_at,
                 metadata, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, NULL, NULL, ?6, ?7, ?7)",
            params![
                conversation.id,
                conversation.tenant_id,
                conversation.channel.to_string(),
                conversation.status.to_string(),
                conversation.user_id,
                conversation.metadata.to_string(),
                conversation.created_at,
            ],
        )?;

        Ok(conversation)
    }

    /// Fetch a conversation, scoped to its tenant. Returns `None` rather than
    /// an error for an absent id — callers distinguish "not found" from
    /// "tenant mismatch" the same way (both read as `None`).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, conversation_id))]
    pub fn get(&self, tenant_id: &str, conversation_id: &str) -> Result<Option<Conversation>> {
        let db = self.db.lock().unwrap();
        match db.query_row(
            "SELECT id, tenant_id, channel, status, user_id, first_response_at, resolved_at,
                    metadata, created_at, updated_at
             FROM conversations WHERE id = ?1 AND tenant_id = ?2",
            params![conversation_id, tenant_id],
            row_to_conversation,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Transition a conversation's status. Stamps `resolved_at` when
    /// transitioning to `resolved`, and `first_response_at` on the first call
    /// that moves a conversation out of `active` (whichever status it lands on).
    #[instrument(skip(self), fields(tenant_id = %tenant_id, conversation_id, status = %status))]
    pub fn set_status(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        status: ConversationStatus,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let db = self.db.lock().unwrap();
        let resolved_at = match status {
            ConversationStatus::Resolved => Some(now.clone()),
            _ => None,
        };
        let rows = db.execute(
            "UPDATE conversations
             SET status = ?1,
                 resolved_at = COALESCE(?2, resolved_at),
                 first_response_at = COALESCE(first_response_at, ?3),
                 updated_at = ?3
             WHERE id = ?4 AND tenant_id = ?5",
            params![status.to_string(), resolved_at, now, conversation_id, tenant_id],
        )?;
        if rows == 0 {
            return Err(PersistenceError::ConversationNotFound {
                id: conversation_id.to_string(),
            });
        }
        Ok(())
    }

    /// List a tenant's conversations, most recently updated first, using
    /// keyset pagination on `(updated_at, id)`.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, limit))]
    pub fn list_for_tenant(
        &self,
        tenant_id: &str,
        cursor: Option<&Cursor>,
        limit: usize,
    ) -> Result<Vec<Conversation>> {
        let db = self.db.lock().unwrap();
        let rows = match cursor {
            Some(c) => {
                let mut stmt = db.prepare(
                    "SELECT id, tenant_id, channel, status, user_id, first_response_at,
                            resolved_at, metadata, created_at, updated_at
                     FROM conversations
                     WHERE tenant_id = ?1
                       AND (updated_at, id) < (?2, ?3)
                     ORDER BY updated_at DESC, id DESC
                     LIMIT ?4",
                )?;
                let result = stmt
                    .query_map(
                        params![tenant_id, c.created_at, c.id, limit as i64],
                        row_to_conversation,
                    )?
                    .filter_map(|r| r.ok())
                    .collect();
                result
            }
            None => {
                let mut stmt = db.prepare(
                    "SELECT id, tenant_id, channel, status, user_id, first_response_at,
                            resolved_at, metadata, created_at, updated_at
                     FROM conversations
                     WHERE tenant_id = ?1
                     ORDER BY updated_at DESC, id DESC
                     LIMIT ?2",
                )?;
                let result = stmt
                    .query_map(params![tenant_id, limit as i64], row_to_conversation)?
                    .filter_map(|r| r.ok())
                    .collect();
                result
            }
        };
        Ok(rows)
    }

    /// Append a message. Messages are scoped by `conversation_id`, which
    /// transitively ties them to a tenant (§4.7) — verify ownership first so
    /// a caller cannot append to another tenant's conversation.
    #[instrument(skip(self, message), fields(tenant_id = %tenant_id, conversation_id = %message.conversation_id))]
    pub fn append_message(&self, tenant_id: &str, message: &Message) -> Result<()> {
        {
            let db = self.db.lock().unwrap();
            let owned: i64 = db.query_row(
                "SELECT COUNT(*) FROM conversations WHERE id = ?1 AND tenant_id = ?2",
                params![message.conversation_id, tenant_id],
                |row| row.get(0),
            )?;
            if owned == 0 {
                return Err(PersistenceError::ConversationNotFound {
                    id: message.conversation_id.clone(),
                });
            }
        }

        let citations = serde_json::to_string(&message.citations)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO messages
                (id, conversation_id, role, content, confidence, citations, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.id,
                message.conversation_id,
                message.role.to_string(),
                message.content,
                message.confidence,
                citations,
                message.metadata.to_string(),
                message.created_at,
            ],
        )?;
        Ok(())
    }

    /// Return the last `limit` messages of a conversation, in chronological
    /// (oldest-first) order — pipeline step 11's history window.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, conversation_id, limit))]
    pub fn recent_messages(
        &self,
        tenant_id: &str,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT m.id, m.conversation_id, m.role, m.content, m.confidence, m.citations,
                    m.metadata, m.created_at
             FROM messages m
             JOIN conversations c ON c.id = m.conversation_id
             WHERE m.conversation_id = ?1 AND c.tenant_id = ?2
             ORDER BY m.created_at DESC
             LIMIT ?3",
        )?;
        let mut rows: Vec<Message> = stmt
            .query_map(params![conversation_id, tenant_id, limit as i64], row_to_message)?
            .filter_map(|r| r.ok())
            .collect();
        rows.reverse();
        Ok(rows)
    }
}

fn row_to_conversation(row: &rusqlite::Row<'_>) -> rusqlite::Result<Conversation> {
    let channel_str: String = row.get(2)?;
    let status_str: String = row.get(3)?;
    let metadata_str: String = row.get(7)?;
    Ok(Conversation {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        channel: channel_str.parse().unwrap_or(Channel::Web),
        status: status_str.parse().unwrap_or(ConversationStatus::Active),
        user_id: row.get(4)?,
        first_response_at: row.get(5)?,
        resolved_at: row.get(6)?,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let citations_str: String = row.get(5)?;
    let metadata_str: String = row.get(6)?;
    let citations: Vec<SourceId> = serde_json::from_str(&citations_str).unwrap_or_default();
    Ok(Message {
        id: row.get(0)?,
        conversation_id: row.get(1)?,
        role: role_str.parse().unwrap_or(Role::User),
        content: row.get(3)?,
        confidence: row.get(4)?,
        citations,
        metadata: serde_json::from_str(&metadata_str).unwrap_or(serde_json::json!({})),
        created_at: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(conversation_id: &str) -> Message {
        Message {
            id: concierge_core::types::MessageId::new().to_string(),
            conversation_id: conversation_id.to_string(),
            role: Role::User,
            content: "hello".to_string(),
            confidence: None,
            citations: vec![],
            metadata: serde_json::json!({}),
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    #[test]
    fn create_then_get_roundtrips() {
        let store = ConversationStore::in_memory().unwrap();
        let conv = store.create("acme", Channel::Web, Some("u1")).unwrap();
        let fetched = store.get("acme", &conv.id).unwrap().unwrap();
        assert_eq!(fetched.status, ConversationStatus::Active);
    }

    #[test]
    fn cross_tenant_get_returns_none() {
        let store = ConversationStore::in_memory().unwrap();
        let conv = store.create("acme", Channel::Web, None).unwrap();
        assert!(store.get("other-tenant", &conv.id).unwrap().is_none());
    }

    #[test]
    fn append_message_rejects_foreign_conversation() {
        let store = ConversationStore::in_memory().unwrap();
        let conv = store.create("acme", Channel::Web, None).unwrap();
        let msg = sample_message(&conv.id);
        assert!(store.append_message("other-tenant", &msg).is_err());
    }

    #[test]
    fn recent_messages_are_chronological() {
        let store = ConversationStore::in_memory().unwrap();
        let conv = store.create("acme", Channel::Web, None).unwrap();
        for i in 0..3 {
            let mut msg = sample_message(&conv.id);
            msg.content = format!("msg-{i}");
            store.append_message("acme", &msg).unwrap();
        }
        let recent = store.recent_messages("acme", &conv.id, 10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].content, "msg-0");
        assert_eq!(recent[2].content, "msg-2");
    }

    #[test]
    fn set_status_stamps_resolved_at() {
        let store = ConversationStore::in_memory().unwrap();
        let conv = store.create("acme", Channel::Web, None).unwrap();
        store
            .set_status("acme", &conv.id, ConversationStatus::Resolved)
            .unwrap();
        let fetched = store.get("acme", &conv.id).unwrap().unwrap();
        assert_eq!(fetched.status, ConversationStatus::Resolved);
        assert!(fetched.resolved_at.is_some());
    }
}
