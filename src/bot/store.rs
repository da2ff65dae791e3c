//! SQLite persistence for users, conversations and the message log.
//!
//! The store is the durable mirror of the in-memory routing state, written
//! best effort. Each method is its own atomic unit; the multi-row seed
//! write goes through one transaction.

use rusqlite::{Connection, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

use crate::bot::router::ConversationKind;

/// Profile fields captured from an inbound Telegram contact.
#[derive(Debug, Clone)]
pub struct UserProfile {
    pub user_id: i64,
    pub first_name: String,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub is_bot: bool,
}

/// A user row as stored, for the admin export.
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub user_id: i64,
    pub first_name: String,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub is_bot: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// One row of the append-only message log.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMessage {
    pub user_id: i64,
    pub text: String,
    pub from_operator: bool,
    pub created_at: String,
}

pub struct Store {
    conn: Mutex<Connection>,
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

impl Store {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open(path)
            .map_err(|e| format!("failed to open database {}: {e}", path.display()))?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;

        info!(
            "Opened database at {} ({} users, {} conversations, {} messages)",
            path.display(),
            store.count_users(),
            store.count_conversations(),
            store.count_messages()
        );
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("in-memory database");
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema().expect("schema");
        store
    }

    fn init_schema(&self) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                username TEXT,
                language_code TEXT,
                is_bot INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS conversations (
                user_id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                operator_id INTEGER,
                last_message TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                text TEXT NOT NULL,
                from_operator INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_user_id ON messages(user_id);
            CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
        "#,
        )
        .map_err(|e| format!("failed to initialize schema: {e}"))
    }

    // ==================== USERS ====================

    /// Insert the user on first contact, refresh profile fields after.
    pub fn upsert_user(&self, profile: &UserProfile) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        let ts = now();
        conn.execute(
            "INSERT INTO users (user_id, first_name, username, language_code, is_bot, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                first_name = ?2,
                username = ?3,
                language_code = ?4,
                updated_at = ?6",
            params![
                profile.user_id,
                profile.first_name,
                profile.username,
                profile.language_code,
                profile.is_bot,
                ts
            ],
        )
        .map_err(|e| format!("failed to upsert user: {e}"))?;
        Ok(())
    }

    /// All user rows, oldest first, for the admin export.
    pub fn export_users(&self) -> Result<Vec<StoredUser>, String> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, first_name, username, language_code, is_bot, created_at, updated_at
                 FROM users ORDER BY created_at, user_id",
            )
            .map_err(|e| format!("failed to prepare export: {e}"))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(StoredUser {
                    user_id: row.get(0)?,
                    first_name: row.get(1)?,
                    username: row.get(2)?,
                    language_code: row.get(3)?,
                    is_bot: row.get(4)?,
                    created_at: row.get(5)?,
                    updated_at: row.get(6)?,
                })
            })
            .map_err(|e| format!("failed to export users: {e}"))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| format!("failed to read user row: {e}"))
    }

    // ==================== CONVERSATIONS ====================

    /// Mirror a newly opened (or refreshed) conversation.
    pub fn insert_conversation(
        &self,
        user_id: i64,
        kind: ConversationKind,
        last_message: &str,
    ) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        let ts = now();
        conn.execute(
            "INSERT INTO conversations (user_id, kind, operator_id, last_message, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                last_message = ?3,
                updated_at = ?4",
            params![user_id, kind.as_str(), last_message, ts],
        )
        .map_err(|e| format!("failed to insert conversation: {e}"))?;
        Ok(())
    }

    pub fn update_conversation_operator(
        &self,
        user_id: i64,
        operator_id: Option<i64>,
    ) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE conversations SET operator_id = ?2, updated_at = ?3 WHERE user_id = ?1",
            params![user_id, operator_id, now()],
        )
        .map_err(|e| format!("failed to update conversation operator: {e}"))?;
        Ok(())
    }

    pub fn delete_conversation(&self, user_id: i64) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM conversations WHERE user_id = ?1", params![user_id])
            .map_err(|e| format!("failed to delete conversation: {e}"))?;
        Ok(())
    }

    /// Wipe the conversations table. Returns the number of rows removed.
    pub fn delete_all_conversations(&self) -> Result<usize, String> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM conversations", [])
            .map_err(|e| format!("failed to clear conversations: {e}"))
    }

    // ==================== MESSAGES ====================

    pub fn insert_message(&self, user_id: i64, text: &str, from_operator: bool) -> Result<(), String> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO messages (user_id, text, from_operator, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, text, from_operator, now()],
        )
        .map_err(|e| format!("failed to insert message: {e}"))?;
        Ok(())
    }

    /// The most recent `limit` messages for a user, oldest first.
    pub fn query_history(&self, user_id: i64, limit: usize) -> Result<Vec<StoredMessage>, String> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare(
                "SELECT user_id, text, from_operator, created_at FROM messages
                 WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
            )
            .map_err(|e| format!("failed to prepare history query: {e}"))?;

        let rows = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(StoredMessage {
                    user_id: row.get(0)?,
                    text: row.get(1)?,
                    from_operator: row.get(2)?,
                    created_at: row.get(3)?,
                })
            })
            .map_err(|e| format!("failed to query history: {e}"))?;

        let mut messages = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| format!("failed to read message row: {e}"))?;
        messages.reverse();
        Ok(messages)
    }

    // ==================== SEED WRITE ====================

    /// First contact of a conversation: user profile, conversation row and
    /// the seed message land in one transaction so a crash cannot leave an
    /// orphaned conversation without its message.
    pub fn record_contact(
        &self,
        profile: &UserProfile,
        kind: ConversationKind,
        text: &str,
    ) -> Result<(), String> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn
            .transaction()
            .map_err(|e| format!("failed to begin transaction: {e}"))?;
        let ts = now();

        tx.execute(
            "INSERT INTO users (user_id, first_name, username, language_code, is_bot, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                first_name = ?2,
                username = ?3,
                language_code = ?4,
                updated_at = ?6",
            params![
                profile.user_id,
                profile.first_name,
                profile.username,
                profile.language_code,
                profile.is_bot,
                ts
            ],
        )
        .map_err(|e| format!("failed to upsert user: {e}"))?;

        tx.execute(
            "INSERT INTO conversations (user_id, kind, operator_id, last_message, created_at, updated_at)
             VALUES (?1, ?2, NULL, ?3, ?4, ?4)
             ON CONFLICT(user_id) DO UPDATE SET
                last_message = ?3,
                updated_at = ?4",
            params![profile.user_id, kind.as_str(), text, ts],
        )
        .map_err(|e| format!("failed to insert conversation: {e}"))?;

        tx.execute(
            "INSERT INTO messages (user_id, text, from_operator, created_at) VALUES (?1, ?2, 0, ?3)",
            params![profile.user_id, text, ts],
        )
        .map_err(|e| format!("failed to insert seed message: {e}"))?;

        tx.commit().map_err(|e| format!("failed to commit contact: {e}"))
    }

    // ==================== COUNTS ====================

    pub fn count_users(&self) -> usize {
        self.count("SELECT COUNT(*) FROM users")
    }

    pub fn count_conversations(&self) -> usize {
        self.count("SELECT COUNT(*) FROM conversations")
    }

    pub fn count_messages(&self) -> usize {
        self.count("SELECT COUNT(*) FROM messages")
    }

    fn count(&self, sql: &str) -> usize {
        let conn = self.conn.lock().unwrap();
        conn.query_row(sql, [], |row| row.get::<_, i64>(0)).unwrap_or(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(user_id: i64, first_name: &str, username: Option<&str>) -> UserProfile {
        UserProfile {
            user_id,
            first_name: first_name.to_string(),
            username: username.map(str::to_string),
            language_code: Some("en".to_string()),
            is_bot: false,
        }
    }

    #[test]
    fn test_upsert_user_updates_profile() {
        let store = Store::in_memory();
        store.upsert_user(&profile(100, "Alice", None)).unwrap();
        store.upsert_user(&profile(100, "Alice", Some("alice_tg"))).unwrap();

        assert_eq!(store.count_users(), 1);
        let users = store.export_users().unwrap();
        assert_eq!(users[0].username.as_deref(), Some("alice_tg"));
    }

    #[test]
    fn test_one_conversation_row_per_user() {
        let store = Store::in_memory();
        store.insert_conversation(100, ConversationKind::Question, "first").unwrap();
        store.insert_conversation(100, ConversationKind::Question, "second").unwrap();
        assert_eq!(store.count_conversations(), 1);
    }

    #[test]
    fn test_record_contact_writes_all_three() {
        let store = Store::in_memory();
        store
            .record_contact(&profile(100, "Alice", Some("alice")), ConversationKind::Question, "hi")
            .unwrap();

        assert_eq!(store.count_users(), 1);
        assert_eq!(store.count_conversations(), 1);
        assert_eq!(store.count_messages(), 1);

        let history = store.query_history(100, 10).unwrap();
        assert_eq!(history[0].text, "hi");
        assert!(!history[0].from_operator);
    }

    #[test]
    fn test_operator_assignment() {
        let store = Store::in_memory();
        store.insert_conversation(100, ConversationKind::Question, "q").unwrap();
        store.update_conversation_operator(100, Some(1001)).unwrap();
        store.update_conversation_operator(100, None).unwrap();
        store.delete_conversation(100).unwrap();
        assert_eq!(store.count_conversations(), 0);
    }

    #[test]
    fn test_delete_all_conversations_returns_count() {
        let store = Store::in_memory();
        for id in 1..=5 {
            store.insert_conversation(id, ConversationKind::Question, "q").unwrap();
        }
        assert_eq!(store.delete_all_conversations().unwrap(), 5);
        assert_eq!(store.count_conversations(), 0);
        assert_eq!(store.delete_all_conversations().unwrap(), 0);
    }

    #[test]
    fn test_history_limit_and_order() {
        let store = Store::in_memory();
        for i in 1..=10 {
            store.insert_message(100, &format!("msg {i}"), i % 2 == 0).unwrap();
        }
        store.insert_message(200, "other user", false).unwrap();

        let history = store.query_history(100, 3).unwrap();
        assert_eq!(history.len(), 3);
        // Oldest first within the returned window.
        assert_eq!(history[0].text, "msg 8");
        assert_eq!(history[2].text, "msg 10");
        assert!(history.iter().all(|m| m.user_id == 100));
    }

    #[test]
    fn test_history_for_unknown_user_is_empty() {
        let store = Store::in_memory();
        assert!(store.query_history(999, 10).unwrap().is_empty());
    }

    #[test]
    fn test_message_direction_flags() {
        let store = Store::in_memory();
        store.insert_message(100, "from user", false).unwrap();
        store.insert_message(100, "from operator", true).unwrap();

        let history = store.query_history(100, 10).unwrap();
        assert!(!history[0].from_operator);
        assert!(history[1].from_operator);
    }
}
