//! CRUD operations for [`Message`] records.
//!
//! Messages are never removed. Deleting one clears its content and flags
//! the row, so listings keep their shape.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::{not_found, Result, StoreError};
use crate::models::{ChatRef, Message};
use crate::store::{fmt_ts, now, opt_uuid_col, search_term, ts_col, uuid_col, Store};

const MESSAGE_COLUMNS: &str = "id, content, sender_id, one_on_one_chat_id, group_chat_id, \
                               is_deleted, created_at, updated_at";

/// Foreign-key column holding messages of `chat`'s kind.
fn chat_column(chat: ChatRef) -> &'static str {
    match chat {
        ChatRef::OneOnOne(_) => "one_on_one_chat_id",
        ChatRef::Group(_) => "group_chat_id",
    }
}

impl Store<'_> {
    pub fn insert_message(&self, content: &str, sender_id: Uuid, chat: ChatRef) -> Result<Message> {
        let id = Uuid::new_v4();
        let ts = now();
        let (one_on_one_chat_id, group_chat_id) = match chat {
            ChatRef::OneOnOne(id) => (Some(id), None),
            ChatRef::Group(id) => (None, Some(id)),
        };

        self.conn().execute(
            "INSERT INTO messages (id, content, sender_id, one_on_one_chat_id, group_chat_id,
                                   is_deleted, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
            params![
                id.to_string(),
                content,
                sender_id.to_string(),
                one_on_one_chat_id.map(|id| id.to_string()),
                group_chat_id.map(|id| id.to_string()),
                fmt_ts(&ts),
            ],
        )?;

        Ok(Message {
            id,
            content: content.to_owned(),
            sender_id,
            one_on_one_chat_id,
            group_chat_id,
            is_deleted: false,
            created_at: ts,
            updated_at: ts,
        })
    }

    pub fn get_message(&self, id: Uuid) -> Result<Message> {
        self.conn()
            .query_row(
                &format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"),
                params![id.to_string()],
                row_to_message,
            )
            .map_err(not_found)
    }

    /// Clear the content and flag the message deleted. Deleting twice is a
    /// no-op that still returns the row.
    pub fn soft_delete_message(&self, id: Uuid, at: DateTime<Utc>) -> Result<Message> {
        self.conn().execute(
            "UPDATE messages SET content = '', is_deleted = 1, updated_at = ?2
             WHERE id = ?1 AND is_deleted = 0",
            params![id.to_string(), fmt_ts(&at)],
        )?;
        self.get_message(id)
    }

    /// Messages of `chat`, newest first. `after` is the `(created_at, id)`
    /// key of the last row seen. Deleted messages are included.
    pub fn list_messages(
        &self,
        chat: ChatRef,
        search: Option<&str>,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: u32,
    ) -> Result<Vec<Message>> {
        let (after_ts, after_id) = match after {
            Some((ts, id)) => (Some(fmt_ts(&ts)), Some(id.to_string())),
            None => (None, None),
        };

        let mut stmt = self.conn().prepare(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE {col} = ?1
               AND (?2 IS NULL OR content LIKE ?2 ESCAPE '\\')
               AND (?3 IS NULL OR (created_at, id) < (?3, ?4))
             ORDER BY created_at DESC, id DESC
             LIMIT ?5",
            col = chat_column(chat),
        ))?;

        let rows = stmt.query_map(
            params![chat.id().to_string(), search_term(search), after_ts, after_id, limit],
            row_to_message,
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_messages(&self, chat: ChatRef, search: Option<&str>) -> Result<u64> {
        self.count(
            &format!(
                "SELECT COUNT(*) FROM messages
                 WHERE {col} = ?1 AND (?2 IS NULL OR content LIKE ?2 ESCAPE '\\')",
                col = chat_column(chat),
            ),
            params![chat.id().to_string(), search_term(search)],
        )
    }

    /// Most recent message of `chat`, deleted or not.
    pub fn latest_message(&self, chat: ChatRef) -> Result<Option<Message>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {MESSAGE_COLUMNS} FROM messages WHERE {col} = ?1
                     ORDER BY created_at DESC, id DESC LIMIT 1",
                    col = chat_column(chat),
                ),
                params![chat.id().to_string()],
                row_to_message,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: uuid_col(row, 0)?,
        content: row.get(1)?,
        sender_id: uuid_col(row, 2)?,
        one_on_one_chat_id: opt_uuid_col(row, 3)?,
        group_chat_id: opt_uuid_col(row, 4)?,
        is_deleted: row.get::<_, i64>(5)? != 0,
        created_at: ts_col(row, 6)?,
        updated_at: ts_col(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::Database;

    fn user(store: &Store<'_>, name: &str) -> Uuid {
        store
            .insert_user(&NewUser {
                email: format!("{name}@example.com"),
                password_hash: "hash".into(),
                name: name.into(),
                bio: None,
                profile_picture_url: None,
            })
            .unwrap()
            .id
    }

    fn chat(store: &Store<'_>) -> (Uuid, ChatRef) {
        let (a, b) = (user(store, "a"), user(store, "b"));
        let chat = store.insert_one_on_one_chat(a, b).unwrap();
        (a, ChatRef::OneOnOne(chat.id))
    }

    #[test]
    fn check_constraint_rejects_two_chat_ids() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (a, chat) = chat(&s);

        let err = s
            .conn()
            .execute(
                "INSERT INTO messages (id, content, sender_id, one_on_one_chat_id, group_chat_id,
                                       is_deleted, created_at, updated_at)
                 VALUES (?1, 'x', ?2, ?3, ?3, 0, '2024-01-01T00:00:00.000000Z',
                         '2024-01-01T00:00:00.000000Z')",
                params![Uuid::new_v4().to_string(), a.to_string(), chat.id().to_string()],
            )
            .unwrap_err();
        assert!(matches!(err, rusqlite::Error::SqliteFailure(_, _)));
    }

    #[test]
    fn list_is_newest_first_and_keeps_deleted_rows() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (a, chat) = chat(&s);

        let first = s.insert_message("hello", a, chat).unwrap();
        let second = s.insert_message("world", a, chat).unwrap();
        let third = s.insert_message("again", a, chat).unwrap();

        let deleted = s.soft_delete_message(second.id, now()).unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.content, "");

        let page = s.list_messages(chat, None, None, 10).unwrap();
        let ids: Vec<Uuid> = page.iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), 3);
        assert!(page
            .windows(2)
            .all(|w| (w[0].created_at, w[0].id) > (w[1].created_at, w[1].id)));
        assert!(page.iter().any(|m| m.id == second.id && m.is_deleted));

        let newest = &page[0];
        let rest = s
            .list_messages(chat, None, Some((newest.created_at, newest.id)), 10)
            .unwrap();
        assert_eq!(rest.len(), 2);
        assert!(!rest.iter().any(|m| m.id == newest.id));

        assert_eq!(s.latest_message(chat).unwrap().map(|m| m.id), Some(page[0].id));
        for id in [first.id, third.id] {
            assert!(!s.get_message(id).unwrap().is_deleted);
        }
    }

    #[test]
    fn search_matches_content() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (a, chat) = chat(&s);
        s.insert_message("lunch at noon?", a, chat).unwrap();
        s.insert_message("sure", a, chat).unwrap();

        let hits = s.list_messages(chat, Some("LUNCH"), None, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(s.count_messages(chat, Some("noon")).unwrap(), 1);
        assert_eq!(s.count_messages(chat, None).unwrap(), 2);
    }
}
