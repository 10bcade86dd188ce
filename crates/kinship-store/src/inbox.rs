//! The inbox: every chat a user belongs to, one-on-one and group
//! interleaved by freshness.

use kinship_shared::ChatCursor;
use rusqlite::params;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{ChatHead, ChatRef};
use crate::store::{fmt_ts, ts_col, uuid_col, Store};

const HEADS_CTE: &str = "
    WITH heads (kind, id, last_message_at) AS (
        SELECT 'ONE_ON_ONE', id, last_message_at
        FROM one_on_one_chats
        WHERE initiator_id = ?1 OR participant_id = ?1
        UNION ALL
        SELECT 'GROUP', g.id, g.last_message_at
        FROM group_chats g
        JOIN group_members m ON m.chat_id = g.id
        WHERE m.user_id = ?1
    )";

impl Store<'_> {
    /// Chats of `user_id` ordered by `last_message_at` then id, both
    /// descending. `after` is the key of the last head seen.
    pub fn list_chat_heads(
        &self,
        user_id: Uuid,
        after: Option<ChatCursor>,
        limit: u32,
    ) -> Result<Vec<ChatHead>> {
        let (after_ts, after_id) = match after {
            Some(c) => (Some(fmt_ts(&c.last_message_at)), Some(c.id.to_string())),
            None => (None, None),
        };

        let mut stmt = self.conn().prepare(&format!(
            "{HEADS_CTE}
             SELECT kind, id, last_message_at FROM heads
             WHERE ?2 IS NULL OR (last_message_at, id) < (?2, ?3)
             ORDER BY last_message_at DESC, id DESC
             LIMIT ?4"
        ))?;

        let rows = stmt.query_map(
            params![user_id.to_string(), after_ts, after_id, limit],
            |row| {
                let kind: String = row.get(0)?;
                let id = uuid_col(row, 1)?;
                let chat = match kind.as_str() {
                    "GROUP" => ChatRef::Group(id),
                    _ => ChatRef::OneOnOne(id),
                };
                Ok(ChatHead {
                    chat,
                    last_message_at: ts_col(row, 2)?,
                })
            },
        )?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_chat_heads(&self, user_id: Uuid) -> Result<u64> {
        self.count(
            &format!("{HEADS_CTE} SELECT COUNT(*) FROM heads"),
            params![user_id.to_string()],
        )
    }
}
