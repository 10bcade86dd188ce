//! CRUD operations for [`FriendRequest`] records.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use uuid::Uuid;

use crate::error::{not_found, Result, StoreError};
use crate::models::{FriendRequest, FriendRequestStatus, ReceivedFriendRequest, UserSummary};
use crate::store::{fmt_ts, now, search_term, ts_col, uuid_col, Store};

const REQUEST_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at, updated_at";

impl Store<'_> {
    /// Insert a PENDING request. A second pending request for the same
    /// unordered pair fails with a unique violation.
    pub fn insert_friend_request(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<FriendRequest> {
        let id = Uuid::new_v4();
        let ts = now();

        self.conn().execute(
            "INSERT INTO friend_requests (id, sender_id, receiver_id, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, 'PENDING', ?4, ?4)",
            params![
                id.to_string(),
                sender_id.to_string(),
                receiver_id.to_string(),
                fmt_ts(&ts)
            ],
        )?;

        Ok(FriendRequest {
            id,
            sender_id,
            receiver_id,
            status: FriendRequestStatus::Pending,
            created_at: ts,
            updated_at: ts,
        })
    }

    pub fn get_friend_request(&self, id: Uuid) -> Result<FriendRequest> {
        self.conn()
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM friend_requests WHERE id = ?1"),
                params![id.to_string()],
                row_to_request,
            )
            .map_err(not_found)
    }

    /// The pending request between `a` and `b`, sent by either of them.
    pub fn find_pending_request_between(&self, a: Uuid, b: Uuid) -> Result<Option<FriendRequest>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {REQUEST_COLUMNS} FROM friend_requests
                     WHERE status = 'PENDING'
                       AND ((sender_id = ?1 AND receiver_id = ?2)
                         OR (sender_id = ?2 AND receiver_id = ?1))"
                ),
                params![a.to_string(), b.to_string()],
                row_to_request,
            )
            .optional()
            .map_err(StoreError::Sqlite)
    }

    pub fn set_friend_request_status(&self, id: Uuid, status: FriendRequestStatus) -> Result<FriendRequest> {
        let affected = self.conn().execute(
            "UPDATE friend_requests SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), status.as_str(), fmt_ts(&now())],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_friend_request(id)
    }

    pub fn delete_friend_request(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Delete every request between `a` and `b`, in either direction and of
    /// any status. Returns the number of rows removed.
    pub fn delete_requests_between(&self, a: Uuid, b: Uuid) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests
             WHERE (sender_id = ?1 AND receiver_id = ?2)
                OR (sender_id = ?2 AND receiver_id = ?1)",
            params![a.to_string(), b.to_string()],
        )?;
        Ok(affected)
    }

    /// Delete every pending request sent or received by `user_id`.
    pub fn delete_pending_requests_for(&self, user_id: Uuid) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM friend_requests
             WHERE status = 'PENDING' AND (sender_id = ?1 OR receiver_id = ?1)",
            params![user_id.to_string()],
        )?;
        Ok(affected)
    }

    /// Pending requests received by `receiver_id`, newest first, from active
    /// senders. `after` is the `(created_at, id)` key of the last row seen.
    pub fn list_received_requests(
        &self,
        receiver_id: Uuid,
        search: Option<&str>,
        after: Option<(DateTime<Utc>, Uuid)>,
        limit: u32,
    ) -> Result<Vec<ReceivedFriendRequest>> {
        let (after_ts, after_id) = match after {
            Some((ts, id)) => (Some(fmt_ts(&ts)), Some(id.to_string())),
            None => (None, None),
        };

        let mut stmt = self.conn().prepare(
            "SELECT r.id, r.sender_id, r.receiver_id, r.status, r.created_at, r.updated_at,
                    u.name, u.profile_picture_url
             FROM friend_requests r
             JOIN users u ON u.id = r.sender_id
             WHERE r.receiver_id = ?1
               AND r.status = 'PENDING'
               AND u.is_deleted = 0
               AND (?2 IS NULL OR u.name LIKE ?2 ESCAPE '\\')
               AND (?3 IS NULL OR (r.created_at, r.id) < (?3, ?4))
             ORDER BY r.created_at DESC, r.id DESC
             LIMIT ?5",
        )?;

        let rows = stmt.query_map(
            params![receiver_id.to_string(), search_term(search), after_ts, after_id, limit],
            |row| {
                let request = row_to_request(row)?;
                let sender = UserSummary {
                    id: request.sender_id,
                    name: row.get(6)?,
                    profile_picture_url: row.get(7)?,
                };
                Ok(ReceivedFriendRequest { request, sender })
            },
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_received_requests(&self, receiver_id: Uuid, search: Option<&str>) -> Result<u64> {
        self.count(
            "SELECT COUNT(*)
             FROM friend_requests r
             JOIN users u ON u.id = r.sender_id
             WHERE r.receiver_id = ?1
               AND r.status = 'PENDING'
               AND u.is_deleted = 0
               AND (?2 IS NULL OR u.name LIKE ?2 ESCAPE '\\')",
            params![receiver_id.to_string(), search_term(search)],
        )
    }
}

fn row_to_request(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendRequest> {
    let status: String = row.get(3)?;
    let status = status.parse::<FriendRequestStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(FriendRequest {
        id: uuid_col(row, 0)?,
        sender_id: uuid_col(row, 1)?,
        receiver_id: uuid_col(row, 2)?,
        status,
        created_at: ts_col(row, 4)?,
        updated_at: ts_col(row, 5)?,
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

    #[test]
    fn second_pending_request_for_pair_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (a, b) = (user(&s, "a"), user(&s, "b"));

        s.insert_friend_request(a, b).unwrap();
        assert!(s.insert_friend_request(a, b).unwrap_err().is_unique_violation());
        assert!(s.insert_friend_request(b, a).unwrap_err().is_unique_violation());
    }

    #[test]
    fn accepted_request_frees_the_pair() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (a, b) = (user(&s, "a"), user(&s, "b"));

        let req = s.insert_friend_request(a, b).unwrap();
        s.set_friend_request_status(req.id, FriendRequestStatus::Accepted)
            .unwrap();

        assert!(s.find_pending_request_between(a, b).unwrap().is_none());
        assert!(s.insert_friend_request(b, a).is_ok());
    }

    #[test]
    fn received_requests_newest_first_with_cursor() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let me = user(&s, "me");
        let senders: Vec<Uuid> = ["ann", "ben", "cat"].iter().map(|n| user(&s, n)).collect();
        for sender in &senders {
            s.insert_friend_request(*sender, me).unwrap();
        }

        let first = s.list_received_requests(me, None, None, 2).unwrap();
        assert_eq!(first.len(), 2);
        assert!(first[0].request.created_at >= first[1].request.created_at);

        let last = &first[1].request;
        let rest = s
            .list_received_requests(me, None, Some((last.created_at, last.id)), 10)
            .unwrap();
        assert_eq!(rest.len(), 1);
        assert!(!first.iter().any(|r| r.request.id == rest[0].request.id));

        let ben = s.list_received_requests(me, Some("be"), None, 10).unwrap();
        assert_eq!(ben.len(), 1);
        assert_eq!(ben[0].sender.name, "ben");
        assert_eq!(s.count_received_requests(me, None).unwrap(), 3);
    }

    #[test]
    fn delete_pending_for_user_spares_others() {
        let db = Database::open_in_memory().unwrap();
        let s = db.store();
        let (a, b, c) = (user(&s, "a"), user(&s, "b"), user(&s, "c"));
        s.insert_friend_request(a, b).unwrap();
        s.insert_friend_request(c, a).unwrap();
        let other = s.insert_friend_request(b, c).unwrap();

        assert_eq!(s.delete_pending_requests_for(a).unwrap(), 2);
        assert!(s.get_friend_request(other.id).is_ok());
    }
}
