//! CRUD operations for [`GroupChat`] records and their member rows.
//!
//! Membership is one row per member, so adding members is an
//! `INSERT OR IGNORE` per id rather than a read-modify-write of a list.

use chrono::{DateTime, Utc};
use rusqlite::params;
use uuid::Uuid;

use crate::error::{not_found, Result, StoreError};
use crate::models::{GroupChat, NewGroupChat};
use crate::store::{fmt_ts, now, ts_col, uuid_col, Store};

const GROUP_COLUMNS: &str = "id, name, owner_id, group_description, group_icon_url, \
                             last_message_at, created_at, updated_at";

/// Group settings to merge; `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupChatUpdate {
    pub name: Option<String>,
    pub group_description: Option<String>,
    pub group_icon_url: Option<String>,
}

impl Store<'_> {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert the chat and its member rows. The owner is always added as a
    /// member; duplicates in `member_ids` are ignored.
    pub fn insert_group_chat(&self, new: &NewGroupChat, member_ids: &[Uuid]) -> Result<GroupChat> {
        let id = Uuid::new_v4();
        let ts = now();

        self.conn().execute(
            "INSERT INTO group_chats (id, name, owner_id, group_description, group_icon_url,
                                      last_message_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?6)",
            params![
                id.to_string(),
                new.name,
                new.owner_id.to_string(),
                new.group_description,
                new.group_icon_url,
                fmt_ts(&ts),
            ],
        )?;

        let owner = std::iter::once(&new.owner_id);
        self.add_group_members(id, owner.chain(member_ids.iter()).copied())?;

        self.get_group_chat(id)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_group_chat(&self, id: Uuid) -> Result<GroupChat> {
        let mut chat = self
            .conn()
            .query_row(
                &format!("SELECT {GROUP_COLUMNS} FROM group_chats WHERE id = ?1"),
                params![id.to_string()],
                row_to_group,
            )
            .map_err(not_found)?;
        chat.member_ids = self.group_member_ids(id)?;
        Ok(chat)
    }

    /// Member ids in join order.
    pub fn group_member_ids(&self, chat_id: Uuid) -> Result<Vec<Uuid>> {
        let mut stmt = self.conn().prepare_cached(
            "SELECT user_id FROM group_members WHERE chat_id = ?1 ORDER BY added_at, rowid",
        )?;
        let rows = stmt.query_map(params![chat_id.to_string()], |row| uuid_col(row, 0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn is_group_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        let found: bool = self.conn().query_row(
            "SELECT EXISTS (SELECT 1 FROM group_members WHERE chat_id = ?1 AND user_id = ?2)",
            params![chat_id.to_string(), user_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_group_chat(&self, id: Uuid, update: &GroupChatUpdate) -> Result<GroupChat> {
        let affected = self.conn().execute(
            "UPDATE group_chats SET
                 name              = COALESCE(?2, name),
                 group_description = COALESCE(?3, group_description),
                 group_icon_url    = COALESCE(?4, group_icon_url),
                 updated_at        = ?5
             WHERE id = ?1",
            params![
                id.to_string(),
                update.name,
                update.group_description,
                update.group_icon_url,
                fmt_ts(&now()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_group_chat(id)
    }

    /// Add members, skipping those already present. Returns the ids that
    /// were actually inserted, in input order.
    pub fn add_group_members<I>(&self, chat_id: Uuid, user_ids: I) -> Result<Vec<Uuid>>
    where
        I: IntoIterator<Item = Uuid>,
    {
        let chat = chat_id.to_string();
        let added_at = fmt_ts(&now());
        let mut stmt = self.conn().prepare_cached(
            "INSERT OR IGNORE INTO group_members (chat_id, user_id, added_at) VALUES (?1, ?2, ?3)",
        )?;

        let mut added = Vec::new();
        for user_id in user_ids {
            if stmt.execute(params![chat, user_id.to_string(), added_at])? > 0 {
                added.push(user_id);
            }
        }

        if !added.is_empty() {
            self.conn().execute(
                "UPDATE group_chats SET updated_at = ?2 WHERE id = ?1",
                params![chat, added_at],
            )?;
        }
        Ok(added)
    }

    pub fn remove_group_member(&self, chat_id: Uuid, user_id: Uuid) -> Result<bool> {
        let ts = fmt_ts(&now());
        let affected = self.conn().execute(
            "DELETE FROM group_members WHERE chat_id = ?1 AND user_id = ?2",
            params![chat_id.to_string(), user_id.to_string()],
        )?;
        if affected > 0 {
            self.conn().execute(
                "UPDATE group_chats SET updated_at = ?2 WHERE id = ?1",
                params![chat_id.to_string(), ts],
            )?;
        }
        Ok(affected > 0)
    }

    pub fn touch_group_chat(&self, id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE group_chats SET last_message_at = ?2 WHERE id = ?1",
            params![id.to_string(), fmt_ts(&at)],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}

/// Map a row to a [`GroupChat`] with an empty member list.
fn row_to_group(row: &rusqlite::Row<'_>) -> rusqlite::Result<GroupChat> {
    Ok(GroupChat {
        id: uuid_col(row, 0)?,
        name: row.get(1)?,
        owner_id: uuid_col(row, 2)?,
        group_description: row.get(3)?,
        group_icon_url: row.get(4)?,
        member_ids: Vec::new(),
        last_message_at: ts_col(row, 5)?,
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

    fn new_group(owner_id: Uuid) -> NewGroupChat {
        NewGroupChat {
            name: "Crew".into(),
            owner_id,
            group_description: None,
            group_icon_url: "/blobs/group_icons/x.png".into(),
        }
    }

    #[test]
    fn owner_is_implicit_member() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (owner, m) = (user(&s, "o"), user(&s, "m"));

        let chat = s.insert_group_chat(&new_group(owner), &[m, m, owner]).unwrap();
        assert_eq!(chat.member_ids, vec![owner, m]);
        assert!(chat.has_member(owner));
    }

    #[test]
    fn adding_existing_members_is_a_no_op() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (owner, a, b) = (user(&s, "o"), user(&s, "a"), user(&s, "b"));
        let chat = s.insert_group_chat(&new_group(owner), &[a]).unwrap();

        assert_eq!(s.add_group_members(chat.id, [a, b]).unwrap(), vec![b]);
        assert!(s.add_group_members(chat.id, [a, b]).unwrap().is_empty());
        assert_eq!(s.get_group_chat(chat.id).unwrap().member_ids.len(), 3);
    }

    #[test]
    fn remove_member_reports_absence() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (owner, a) = (user(&s, "o"), user(&s, "a"));
        let chat = s.insert_group_chat(&new_group(owner), &[a]).unwrap();

        assert!(s.remove_group_member(chat.id, a).unwrap());
        assert!(!s.remove_group_member(chat.id, a).unwrap());
        assert!(!s.is_group_member(chat.id, a).unwrap());
    }

    #[test]
    fn update_merges_settings() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let owner = user(&s, "o");
        let chat = s.insert_group_chat(&new_group(owner), &[]).unwrap();

        let updated = s
            .update_group_chat(
                chat.id,
                &GroupChatUpdate {
                    group_description: Some("weekend plans".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(updated.name, "Crew");
        assert_eq!(updated.group_description.as_deref(), Some("weekend plans"));
        assert_eq!(updated.group_icon_url, chat.group_icon_url);
    }
}
