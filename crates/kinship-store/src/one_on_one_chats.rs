//! CRUD operations for [`OneOnOneChat`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::{not_found, Result, StoreError};
use crate::models::OneOnOneChat;
use crate::store::{fmt_ts, now, opt_ts_col, ts_col, uuid_col, Store};

const CHAT_COLUMNS: &str = "id, initiator_id, participant_id, vanish_mode, last_message_at, \
                            deleted_for_initiator, deleted_for_participant, created_at, updated_at";

impl Store<'_> {
    /// Insert a chat with default settings. A second chat for the same
    /// unordered pair fails with a unique violation.
    pub fn insert_one_on_one_chat(&self, initiator_id: Uuid, participant_id: Uuid) -> Result<OneOnOneChat> {
        let id = Uuid::new_v4();
        let ts = now();

        self.conn().execute(
            "INSERT INTO one_on_one_chats (id, initiator_id, participant_id, vanish_mode,
                                           last_message_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, ?4, ?4, ?4)",
            params![
                id.to_string(),
                initiator_id.to_string(),
                participant_id.to_string(),
                fmt_ts(&ts)
            ],
        )?;

        Ok(OneOnOneChat {
            id,
            initiator_id,
            participant_id,
            vanish_mode: false,
            last_message_at: ts,
            deleted_for_initiator: None,
            deleted_for_participant: None,
            created_at: ts,
            updated_at: ts,
        })
    }

    pub fn get_one_on_one_chat(&self, id: Uuid) -> Result<OneOnOneChat> {
        self.conn()
            .query_row(
                &format!("SELECT {CHAT_COLUMNS} FROM one_on_one_chats WHERE id = ?1"),
                params![id.to_string()],
                row_to_chat,
            )
            .map_err(not_found)
    }

    /// The chat between `a` and `b`, whoever initiated it.
    pub fn find_one_on_one_chat_between(&self, a: Uuid, b: Uuid) -> Result<Option<OneOnOneChat>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {CHAT_COLUMNS} FROM one_on_one_chats
                     WHERE (initiator_id = ?1 AND participant_id = ?2)
                        OR (initiator_id = ?2 AND participant_id = ?1)"
                ),
                params![a.to_string(), b.to_string()],
                row_to_chat,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    /// Merge settings; `None` leaves a field unchanged.
    pub fn update_one_on_one_settings(&self, id: Uuid, vanish_mode: Option<bool>) -> Result<OneOnOneChat> {
        let affected = self.conn().execute(
            "UPDATE one_on_one_chats
             SET vanish_mode = COALESCE(?2, vanish_mode), updated_at = ?3
             WHERE id = ?1",
            params![id.to_string(), vanish_mode, fmt_ts(&now())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_one_on_one_chat(id)
    }

    pub fn touch_one_on_one_chat(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE one_on_one_chats SET last_message_at = ?2 WHERE id = ?1",
            params![id.to_string(), fmt_ts(&at)],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

fn row_to_chat(row: &rusqlite::Row<'_>) -> rusqlite::Result<OneOnOneChat> {
    Ok(OneOnOneChat {
        id: uuid_col(row, 0)?,
        initiator_id: uuid_col(row, 1)?,
        participant_id: uuid_col(row, 2)?,
        vanish_mode: row.get::<_, i64>(3)? != 0,
        last_message_at: ts_col(row, 4)?,
        deleted_for_initiator: opt_ts_col(row, 5)?,
        deleted_for_participant: opt_ts_col(row, 6)?,
        created_at: ts_col(row, 7)?,
        updated_at: ts_col(row, 8)?,
    })
}
