//! Chat session store: sessions, messages, and the additive session meta.
//!
//! `meta` is a string-keyed bag of independently-updatable fields (budget
//! counters, cache keys, record bindings, phase-payload buckets). Partial
//! updates run as read-modify-write inside a per-session critical section
//! so concurrent turns on the same session serialize.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock, Mutex};

use dashmap::DashMap;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;
use uuid::Uuid;

use crate::types::ChatSession;

use super::db::{now_utc, with_connection, DbLocation, StoreError};

static CHAT_DB: DbLocation = DbLocation::new("CHAT_DB_PATH", "data/chat/chat.db", "chat.db");

static SESSION_LOCKS: LazyLock<DashMap<String, Arc<Mutex<()>>>> = LazyLock::new(DashMap::new);

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS chat_sessions (
        session_id TEXT PRIMARY KEY,
        title TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        meta_json TEXT
    )",
    "CREATE TABLE IF NOT EXISTS chat_messages (
        message_id TEXT PRIMARY KEY,
        session_id TEXT NOT NULL,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        actions_json TEXT,
        references_json TEXT,
        created_at TEXT NOT NULL,
        meta_json TEXT,
        FOREIGN KEY(session_id) REFERENCES chat_sessions(session_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_chat_messages_session_created
        ON chat_messages(session_id, created_at)",
];

/// One stored chat message, as listed in session detail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRow {
    pub id: String,
    pub role: String,
    pub content: String,
    #[serde(default)]
    pub actions: Value,
    #[serde(default)]
    pub references: Value,
    pub created_at: String,
    #[serde(default)]
    pub meta: Value,
}

/// Handle to the chat session store. Cheap to clone; the underlying path
/// and lock table are process-wide.
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionStore;

impl SessionStore {
    pub fn new() -> Self {
        Self
    }

    /// Test hook: point the store at a throwaway database.
    pub fn set_db_path_for_tests(path: std::path::PathBuf) {
        CHAT_DB.set_path(path);
    }

    pub fn create_session(
        &self,
        title: Option<String>,
        meta: Option<BTreeMap<String, Value>>,
    ) -> Result<ChatSession, StoreError> {
        let session_id = format!("chat_{}", Uuid::new_v4().simple());
        let now = now_utc();
        let meta = meta.unwrap_or_default();
        let meta_json = serde_json::to_string(&meta)?;

        with_connection(&CHAT_DB, &SCHEMA, |conn| {
            conn.execute(
                "INSERT INTO chat_sessions (session_id, title, created_at, updated_at, meta_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![session_id, title, now, now, meta_json],
            )?;
            Ok(())
        })?;

        Ok(ChatSession {
            session_id,
            title,
            created_at: now.clone(),
            updated_at: now,
            meta,
        })
    }

    pub fn get_session(&self, session_id: &str) -> Result<Option<ChatSession>, StoreError> {
        with_connection(&CHAT_DB, &SCHEMA, |conn| {
            let row = conn
                .query_row(
                    "SELECT session_id, title, created_at, updated_at, meta_json
                     FROM chat_sessions WHERE session_id = ?1",
                    params![session_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    },
                )
                .optional()?;

            Ok(row.map(|(session_id, title, created_at, updated_at, meta_json)| ChatSession {
                session_id,
                title,
                created_at,
                updated_at,
                meta: parse_meta(meta_json.as_deref()),
            }))
        })
    }

    pub fn list_sessions(&self, limit: i64) -> Result<Vec<ChatSession>, StoreError> {
        with_connection(&CHAT_DB, &SCHEMA, |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, title, created_at, updated_at, meta_json
                 FROM chat_sessions ORDER BY updated_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            })?;

            let mut sessions = Vec::new();
            for row in rows {
                let (session_id, title, created_at, updated_at, meta_json) = row?;
                sessions.push(ChatSession {
                    session_id,
                    title,
                    created_at,
                    updated_at,
                    meta: parse_meta(meta_json.as_deref()),
                });
            }
            Ok(sessions)
        })
    }

    /// Refresh `updated_at` so recently-used sessions sort first.
    pub fn touch_session(&self, session_id: &str) -> Result<(), StoreError> {
        let now = now_utc();
        with_connection(&CHAT_DB, &SCHEMA, |conn| {
            conn.execute(
                "UPDATE chat_sessions SET updated_at = ?1 WHERE session_id = ?2",
                params![now, session_id],
            )?;
            Ok(())
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub fn append_message(
        &self,
        session_id: &str,
        role: &str,
        content: &str,
        actions: Option<Value>,
        references: Option<Value>,
        meta: Option<Value>,
    ) -> Result<MessageRow, StoreError> {
        let message_id = format!("msg_{}", Uuid::new_v4().simple());
        let now = now_utc();
        let actions_json =
            serde_json::to_string(&actions.clone().unwrap_or_else(|| Value::Array(Vec::new())))?;
        let references_json = serde_json::to_string(
            &references.clone().unwrap_or_else(|| Value::Array(Vec::new())),
        )?;
        let meta_json = meta.as_ref().map(serde_json::to_string).transpose()?;

        with_connection(&CHAT_DB, &SCHEMA, |conn| {
            conn.execute(
                "INSERT INTO chat_messages (
                    message_id, session_id, role, content, actions_json,
                    references_json, created_at, meta_json
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    message_id,
                    session_id,
                    role,
                    content,
                    actions_json,
                    references_json,
                    now,
                    meta_json
                ],
            )?;
            Ok(())
        })?;

        if let Err(e) = self.touch_session(session_id) {
            error!(session_id, error = %e, "touch_session failed");
        }

        Ok(MessageRow {
            id: message_id,
            role: role.to_string(),
            content: content.to_string(),
            actions: actions.unwrap_or_else(|| Value::Array(Vec::new())),
            references: references.unwrap_or_else(|| Value::Array(Vec::new())),
            created_at: now,
            meta: meta.unwrap_or(Value::Null),
        })
    }

    pub fn list_messages(
        &self,
        session_id: &str,
        limit: i64,
    ) -> Result<Vec<MessageRow>, StoreError> {
        with_connection(&CHAT_DB, &SCHEMA, |conn| {
            let mut stmt = conn.prepare(
                "SELECT message_id, role, content, actions_json, references_json,
                        created_at, meta_json
                 FROM chat_messages WHERE session_id = ?1
                 ORDER BY created_at ASC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![session_id, limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, Option<String>>(6)?,
                ))
            })?;

            let mut messages = Vec::new();
            for row in rows {
                let (id, role, content, actions, references, created_at, meta) = row?;
                messages.push(MessageRow {
                    id,
                    role,
                    content,
                    actions: parse_json_column(actions.as_deref(), Value::Array(Vec::new())),
                    references: parse_json_column(references.as_deref(), Value::Array(Vec::new())),
                    created_at,
                    meta: parse_json_column(meta.as_deref(), Value::Null),
                });
            }
            Ok(messages)
        })
    }

    /// Session meta, empty when the session is missing.
    pub fn get_meta(&self, session_id: &str) -> BTreeMap<String, Value> {
        self.get_session(session_id)
            .ok()
            .flatten()
            .map(|s| s.meta)
            .unwrap_or_default()
    }

    /// Merge `updates` into the session meta. Additive: existing keys not
    /// named in `updates` are preserved. Serialized per session.
    pub fn update_meta_fields(
        &self,
        session_id: &str,
        updates: BTreeMap<String, Value>,
    ) -> Result<bool, StoreError> {
        if updates.is_empty() {
            return Ok(true);
        }

        let lock = SESSION_LOCKS
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = match lock.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };

        let Some(session) = self.get_session(session_id)? else {
            return Ok(false);
        };
        let mut meta = session.meta;
        for (key, value) in updates {
            meta.insert(key, value);
        }
        let meta_json = serde_json::to_string(&meta)?;
        let now = now_utc();

        with_connection(&CHAT_DB, &SCHEMA, |conn| {
            conn.execute(
                "UPDATE chat_sessions SET meta_json = ?1, updated_at = ?2 WHERE session_id = ?3",
                params![meta_json, now, session_id],
            )?;
            Ok(())
        })?;

        Ok(true)
    }

    /// Convenience single-key meta update.
    pub fn update_meta(
        &self,
        session_id: &str,
        key: &str,
        value: Value,
    ) -> Result<bool, StoreError> {
        self.update_meta_fields(session_id, BTreeMap::from([(key.to_string(), value)]))
    }
}

fn parse_meta(raw: Option<&str>) -> BTreeMap<String, Value> {
    raw.and_then(|s| serde_json::from_str(s).ok()).unwrap_or_default()
}

fn parse_json_column(raw: Option<&str>, default: Value) -> Value {
    raw.and_then(|s| serde_json::from_str(s).ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> SessionStore {
        SessionStore::set_db_path_for_tests(crate::store::db::test_db_dir().join("chat.db"));
        SessionStore::new()
    }

    #[test]
    fn test_session_roundtrip() {
        let store = store();
        let created = store.create_session(Some("标题".to_string()), None).unwrap();
        let loaded = store.get_session(&created.session_id).unwrap().unwrap();
        assert_eq!(loaded.title.as_deref(), Some("标题"));
        assert!(loaded.meta.is_empty());
    }

    #[test]
    fn test_missing_session_is_none() {
        let store = store();
        assert!(store.get_session("chat_nope").unwrap().is_none());
    }

    #[test]
    fn test_meta_updates_are_additive() {
        let store = store();
        let session = store.create_session(None, None).unwrap();
        store
            .update_meta(&session.session_id, "record_id", json!("rec_1"))
            .unwrap();
        store
            .update_meta_fields(
                &session.session_id,
                BTreeMap::from([("tool_call_count".to_string(), json!(3))]),
            )
            .unwrap();

        let meta = store.get_meta(&session.session_id);
        assert_eq!(meta["record_id"], json!("rec_1"));
        assert_eq!(meta["tool_call_count"], json!(3));
    }

    #[test]
    fn test_messages_append_and_list() {
        let store = store();
        let session = store.create_session(None, None).unwrap();
        store
            .append_message(&session.session_id, "user", "你好", None, None, None)
            .unwrap();
        store
            .append_message(
                &session.session_id,
                "assistant",
                "回复",
                Some(json!([{"type": "link", "label": "历史", "href": "/history"}])),
                None,
                Some(json!({"record_id": "rec_1"})),
            )
            .unwrap();

        let messages = store.list_messages(&session.session_id, 50).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(messages[1].meta["record_id"], json!("rec_1"));
    }

    #[test]
    fn test_update_meta_missing_session_returns_false() {
        let store = store();
        let ok = store
            .update_meta("chat_missing", "k", json!(1))
            .unwrap();
        assert!(!ok);
    }
}
