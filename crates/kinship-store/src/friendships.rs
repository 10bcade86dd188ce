//! Friend edges and the graph queries built on them.
//!
//! One `friendships` row is one undirected edge; the `friend_edges` view
//! exposes it from both endpoints. These writes are only ever issued from
//! inside a transaction by the friendship manager.

use rusqlite::params;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::UserSummary;
use crate::store::{fmt_ts, now, search_term, uuid_col, Store};

impl Store<'_> {
    /// `true` when `a` and `b` are friends in either direction.
    pub fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let found: bool = self.conn().query_row(
            "SELECT EXISTS (
                 SELECT 1 FROM friendships
                 WHERE (user_id = ?1 AND friend_id = ?2)
                    OR (user_id = ?2 AND friend_id = ?1)
             )",
            params![a.to_string(), b.to_string()],
            |row| row.get(0),
        )?;
        Ok(found)
    }

    /// Record the edge: `friend_id` joins `user_id`'s friend list and
    /// `user_id` joins `friend_id`'s friend-of list, in a single row.
    pub fn insert_friendship(&self, user_id: Uuid, friend_id: Uuid) -> Result<()> {
        self.conn().execute(
            "INSERT INTO friendships (user_id, friend_id, created_at) VALUES (?1, ?2, ?3)",
            params![user_id.to_string(), friend_id.to_string(), fmt_ts(&now())],
        )?;
        Ok(())
    }

    /// Remove the edge between `a` and `b`, whichever side initiated it.
    pub fn delete_friendship(&self, a: Uuid, b: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friendships
             WHERE (user_id = ?1 AND friend_id = ?2)
                OR (user_id = ?2 AND friend_id = ?1)",
            params![a.to_string(), b.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Active friends of `user_id` ordered by id.
    pub fn list_friends(
        &self,
        user_id: Uuid,
        search: Option<&str>,
        after: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<UserSummary>> {
        self.query_summaries(
            "SELECT u.id, u.name, u.profile_picture_url
             FROM friend_edges e
             JOIN users u ON u.id = e.friend_id
             WHERE e.user_id = ?1
               AND u.is_deleted = 0
               AND (?2 IS NULL OR u.name LIKE ?2 ESCAPE '\\')
               AND (?3 IS NULL OR u.id > ?3)
             ORDER BY u.id ASC
             LIMIT ?4",
            params![
                user_id.to_string(),
                search_term(search),
                after.map(|id| id.to_string()),
                limit
            ],
        )
    }

    pub fn count_friends(&self, user_id: Uuid, search: Option<&str>) -> Result<u64> {
        self.count(
            "SELECT COUNT(*)
             FROM friend_edges e
             JOIN users u ON u.id = e.friend_id
             WHERE e.user_id = ?1
               AND u.is_deleted = 0
               AND (?2 IS NULL OR u.name LIKE ?2 ESCAPE '\\')",
            params![user_id.to_string(), search_term(search)],
        )
    }

    /// Friends of active friends who are neither `user_id` nor already its
    /// friends. One hop only.
    pub fn list_suggested_friends(
        &self,
        user_id: Uuid,
        after: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<UserSummary>> {
        self.query_summaries(
            &format!("{SUGGESTED_SELECT} AND (?2 IS NULL OR u.id > ?2) ORDER BY u.id ASC LIMIT ?3"),
            params![user_id.to_string(), after.map(|id| id.to_string()), limit],
        )
    }

    pub fn count_suggested_friends(&self, user_id: Uuid) -> Result<u64> {
        self.count(
            &format!("SELECT COUNT(*) FROM ({SUGGESTED_SELECT})"),
            params![user_id.to_string()],
        )
    }

    /// Active users who are friends of both `a` and `b`, ordered by id.
    pub fn list_mutual_friends(
        &self,
        a: Uuid,
        b: Uuid,
        after: Option<Uuid>,
        limit: u32,
    ) -> Result<Vec<UserSummary>> {
        self.query_summaries(
            &format!("{MUTUAL_SELECT} AND (?3 IS NULL OR u.id > ?3) ORDER BY u.id ASC LIMIT ?4"),
            params![a.to_string(), b.to_string(), after.map(|id| id.to_string()), limit],
        )
    }

    pub fn count_mutual_friends(&self, a: Uuid, b: Uuid) -> Result<u64> {
        self.count(
            &format!("SELECT COUNT(*) FROM ({MUTUAL_SELECT})"),
            params![a.to_string(), b.to_string()],
        )
    }

    fn query_summaries(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<UserSummary>> {
        let mut stmt = self.conn().prepare(sql)?;
        let rows = stmt.query_map(params, |row| {
            Ok(UserSummary {
                id: uuid_col(row, 0)?,
                name: row.get(1)?,
                profile_picture_url: row.get(2)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub(crate) fn count(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<u64> {
        let count: i64 = self.conn().query_row(sql, params, |row| row.get(0))?;
        Ok(count as u64)
    }
}

const SUGGESTED_SELECT: &str = "
    SELECT DISTINCT u.id, u.name, u.profile_picture_url
    FROM friend_edges mine
    JOIN users via ON via.id = mine.friend_id AND via.is_deleted = 0
    JOIN friend_edges theirs ON theirs.user_id = mine.friend_id
    JOIN users u ON u.id = theirs.friend_id
    WHERE mine.user_id = ?1
      AND u.id <> ?1
      AND u.is_deleted = 0
      AND u.id NOT IN (SELECT friend_id FROM friend_edges WHERE user_id = ?1)";

const MUTUAL_SELECT: &str = "
    SELECT u.id, u.name, u.profile_picture_url
    FROM friend_edges ea
    JOIN friend_edges eb ON eb.friend_id = ea.friend_id
    JOIN users u ON u.id = ea.friend_id
    WHERE ea.user_id = ?1
      AND eb.user_id = ?2
      AND u.is_deleted = 0";
