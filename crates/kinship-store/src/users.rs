//! CRUD operations for [`User`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};
use uuid::Uuid;

use crate::error::{not_found, Result, StoreError};
use crate::models::{NewUser, User};
use crate::store::{fmt_ts, now, opt_ts_col, search_term, ts_col, uuid_col, Store};

const USER_COLUMNS: &str = "id, email, password_hash, name, bio, profile_picture_url, \
                            is_deleted, deleted_at, created_at, updated_at";

/// Profile fields a user may change. `None` leaves a field untouched;
/// `Some(None)` on an optional field clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub bio: Option<Option<String>>,
    pub profile_picture_url: Option<Option<String>>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.bio.is_none() && self.profile_picture_url.is_none()
    }
}

impl Store<'_> {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new user. A duplicate email fails with a unique violation.
    pub fn insert_user(&self, new: &NewUser) -> Result<User> {
        let id = Uuid::new_v4();
        let ts = now();

        self.conn().execute(
            "INSERT INTO users (id, email, password_hash, name, bio, profile_picture_url,
                                is_deleted, deleted_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?7)",
            params![
                id.to_string(),
                new.email,
                new.password_hash,
                new.name,
                new.bio,
                new.profile_picture_url,
                fmt_ts(&ts),
            ],
        )?;

        Ok(User {
            id,
            email: new.email.clone(),
            password_hash: new.password_hash.clone(),
            name: new.name.clone(),
            bio: new.bio.clone(),
            profile_picture_url: new.profile_picture_url.clone(),
            friend_ids: Vec::new(),
            friend_of_ids: Vec::new(),
            is_deleted: false,
            deleted_at: None,
            created_at: ts,
            updated_at: ts,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a user by id, soft-deleted or not.
    pub fn get_user(&self, id: Uuid) -> Result<User> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
                params![id.to_string()],
                row_to_user,
            )
            .map_err(not_found)?;
        self.with_friend_sets(user)
    }

    /// Fetch a user that has not been soft-deleted.
    pub fn get_active_user(&self, id: Uuid) -> Result<User> {
        let user = self.get_user(id)?;
        if user.is_deleted {
            return Err(StoreError::NotFound);
        }
        Ok(user)
    }

    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                row_to_user,
            )
            .optional()?;
        user.map(|u| self.with_friend_sets(u)).transpose()
    }

    /// The subset of `ids` naming existing, non-deleted users.
    pub fn active_user_ids(&self, ids: &[Uuid]) -> Result<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; ids.len()].join(", ");
        let mut stmt = self.conn().prepare(&format!(
            "SELECT id FROM users WHERE is_deleted = 0 AND id IN ({placeholders}) ORDER BY id"
        ))?;
        let rows = stmt.query_map(params_from_iter(ids.iter().map(|id| id.to_string())), |row| {
            uuid_col(row, 0)
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Non-deleted users ordered by id, starting after `after`.
    pub fn list_users(&self, search: Option<&str>, after: Option<Uuid>, limit: u32) -> Result<Vec<User>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE is_deleted = 0
               AND (?1 IS NULL OR name LIKE ?1 ESCAPE '\\')
               AND (?2 IS NULL OR id > ?2)
             ORDER BY id ASC
             LIMIT ?3"
        ))?;
        let rows = stmt.query_map(
            params![search_term(search), after.map(|id| id.to_string()), limit],
            row_to_user,
        )?;

        let mut users = Vec::new();
        for row in rows {
            users.push(self.with_friend_sets(row?)?);
        }
        Ok(users)
    }

    pub fn count_users(&self, search: Option<&str>) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users
             WHERE is_deleted = 0 AND (?1 IS NULL OR name LIKE ?1 ESCAPE '\\')",
            params![search_term(search)],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Both directed friend lists of `id`: (`friend_ids`, `friend_of_ids`).
    pub fn friend_sets(&self, id: Uuid) -> Result<(Vec<Uuid>, Vec<Uuid>)> {
        let id = id.to_string();

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT friend_id FROM friendships WHERE user_id = ?1 ORDER BY created_at, friend_id")?;
        let friend_ids = stmt
            .query_map(params![id], |row| uuid_col(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut stmt = self
            .conn()
            .prepare_cached("SELECT user_id FROM friendships WHERE friend_id = ?1 ORDER BY created_at, user_id")?;
        let friend_of_ids = stmt
            .query_map(params![id], |row| uuid_col(row, 0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((friend_ids, friend_of_ids))
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    pub fn update_user(&self, id: Uuid, update: &UserUpdate) -> Result<User> {
        let affected = self.conn().execute(
            "UPDATE users SET
                 name                = COALESCE(?2, name),
                 bio                 = CASE WHEN ?3 THEN ?4 ELSE bio END,
                 profile_picture_url = CASE WHEN ?5 THEN ?6 ELSE profile_picture_url END,
                 updated_at          = ?7
             WHERE id = ?1 AND is_deleted = 0",
            params![
                id.to_string(),
                update.name,
                update.bio.is_some(),
                update.bio.clone().flatten(),
                update.profile_picture_url.is_some(),
                update.profile_picture_url.clone().flatten(),
                fmt_ts(&now()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_user(id)
    }

    /// Anonymise the account and flag it deleted. Friend edges are kept.
    pub fn soft_delete_user(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool> {
        let affected = self.conn().execute(
            "UPDATE users SET
                 name                = ?2,
                 email               = ?3,
                 password_hash       = '',
                 bio                 = NULL,
                 profile_picture_url = NULL,
                 is_deleted          = 1,
                 deleted_at          = ?4,
                 updated_at          = ?4
             WHERE id = ?1 AND is_deleted = 0",
            params![
                id.to_string(),
                kinship_shared::constants::DELETED_USER_NAME,
                format!("deleted+{id}@deleted.invalid"),
                fmt_ts(&at),
            ],
        )?;
        Ok(affected > 0)
    }

    fn with_friend_sets(&self, mut user: User) -> Result<User> {
        let (friend_ids, friend_of_ids) = self.friend_sets(user.id)?;
        user.friend_ids = friend_ids;
        user.friend_of_ids = friend_of_ids;
        Ok(user)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Map a `rusqlite::Row` to a [`User`] with empty friend lists.
fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: uuid_col(row, 0)?,
        email: row.get(1)?,
        password_hash: row.get(2)?,
        name: row.get(3)?,
        bio: row.get(4)?,
        profile_picture_url: row.get(5)?,
        friend_ids: Vec::new(),
        friend_of_ids: Vec::new(),
        is_deleted: row.get::<_, i64>(6)? != 0,
        deleted_at: opt_ts_col(row, 7)?,
        created_at: ts_col(row, 8)?,
        updated_at: ts_col(row, 9)?,
    })
}
