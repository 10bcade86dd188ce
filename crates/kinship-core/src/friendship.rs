//! The friendship graph: request lifecycle, unfriending and the
//! friend-of-friend queries.
//!
//! Every write that touches an edge goes through here, inside a single
//! transaction, so the two directed views of an edge can never diverge.

use kinship_shared::constants::FRIENDS_BATCH;
use kinship_shared::{Caller, Page, PageRequest};
use kinship_store::{
    FriendRequest, FriendRequestStatus, ReceivedFriendRequest, Store, StoreError, User, UserSummary,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{CoreError, OrDuplicate, OrNotFound, Result};
use crate::paging::{id_cursor, overfetch};
use crate::SharedDatabase;

const ALREADY_FRIENDS: &str = "You are already friends with this user";
const REQUEST_EXISTS: &str = "A friend request already exists between you and this user";

/// The answer a receiver gives to a pending request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendRequestDecision {
    Accepted,
    Rejected,
}

/// How one user stands with another, from the first user's side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendshipStatus {
    Friends,
    RequestSent,
    RequestReceived,
    NotFriends,
}

pub struct FriendGraph {
    db: SharedDatabase,
}

impl FriendGraph {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    pub async fn send_friend_request(
        &self,
        caller: &Caller,
        sender_id: Uuid,
        receiver_id: Uuid,
    ) -> Result<FriendRequest> {
        if !caller.is(sender_id) {
            return Err(CoreError::forbidden("You can only send friend requests as yourself"));
        }
        if sender_id == receiver_id {
            return Err(CoreError::bad_request("You cannot send a friend request to yourself"));
        }

        let request = self.db.lock().await.transaction(|s| {
            let sender = s
                .get_active_user(sender_id)
                .or_not_found("Sender or Receiver not found")?;
            s.get_active_user(receiver_id)
                .or_not_found("Sender or Receiver not found")?;

            if sender.is_friend_with(receiver_id) {
                return Err(CoreError::bad_request(ALREADY_FRIENDS));
            }
            if s.find_pending_request_between(sender_id, receiver_id)?.is_some() {
                return Err(CoreError::bad_request(REQUEST_EXISTS));
            }

            s.insert_friend_request(sender_id, receiver_id)
                .or_duplicate(|| CoreError::bad_request(REQUEST_EXISTS))
        })?;

        info!(request = %request.id, sender = %sender_id, receiver = %receiver_id, "friend request sent");
        Ok(request)
    }

    /// Accept or reject a pending request as its receiver.
    ///
    /// Accepting writes the friend edge and the ACCEPTED status together.
    /// Rejecting deletes the row; the returned record then reflects the
    /// decision but no longer exists in the store.
    pub async fn update_friend_request(
        &self,
        caller: &Caller,
        request_id: Uuid,
        decision: FriendRequestDecision,
    ) -> Result<FriendRequest> {
        let outcome = self.db.lock().await.transaction(|s| {
            let request = s
                .get_friend_request(request_id)
                .or_not_found("Friend request not found")?;
            if request.status != FriendRequestStatus::Pending {
                return Err(CoreError::bad_request("Friend request has already been processed"));
            }
            if !caller.is(request.receiver_id) {
                return Err(CoreError::forbidden(
                    "Only the receiver can respond to this friend request",
                ));
            }

            match decision {
                FriendRequestDecision::Accepted => {
                    s.insert_friendship(request.sender_id, request.receiver_id)
                        .or_duplicate(|| CoreError::bad_request(ALREADY_FRIENDS))?;
                    Ok(s.set_friend_request_status(request_id, FriendRequestStatus::Accepted)?)
                }
                FriendRequestDecision::Rejected => {
                    s.delete_friend_request(request_id)?;
                    Ok(FriendRequest {
                        status: FriendRequestStatus::Rejected,
                        ..request
                    })
                }
            }
        })?;

        info!(request = %request_id, status = %outcome.status, "friend request answered");
        Ok(outcome)
    }

    /// Withdraw a pending request as its sender.
    pub async fn cancel_friend_request(&self, caller: &Caller, request_id: Uuid) -> Result<()> {
        self.db.lock().await.transaction(|s| {
            let request = s
                .get_friend_request(request_id)
                .or_not_found("Friend request not found")?;
            if !caller.is(request.sender_id) {
                return Err(CoreError::forbidden("Only the sender can cancel this friend request"));
            }
            if request.status != FriendRequestStatus::Pending {
                return Err(CoreError::bad_request("Friend request has already been processed"));
            }
            s.delete_friend_request(request_id)?;
            Ok(())
        })?;

        info!(request = %request_id, "friend request cancelled");
        Ok(())
    }

    /// Remove the edge between `user_id` and `friend_id`, and any request
    /// rows still lingering between them.
    pub async fn unfriend_user(&self, caller: &Caller, user_id: Uuid, friend_id: Uuid) -> Result<()> {
        if !caller.is(user_id) {
            return Err(CoreError::forbidden("You can only manage your own friends"));
        }
        if user_id == friend_id {
            return Err(CoreError::forbidden("You cannot unfriend yourself"));
        }

        let stale = self.db.lock().await.transaction(|s| {
            s.get_active_user(user_id).or_not_found("User not found")?;
            s.get_active_user(friend_id).or_not_found("User not found")?;

            if !s.delete_friendship(user_id, friend_id)? {
                return Err(CoreError::not_found("You are not friends with this user"));
            }
            Ok(s.delete_requests_between(user_id, friend_id)?)
        })?;

        if stale > 0 {
            warn!(user = %user_id, friend = %friend_id, stale, "removed stale friend requests while unfriending");
        }
        info!(user = %user_id, friend = %friend_id, "unfriended");
        Ok(())
    }

    /// Friends of `user_id`'s friends that `user_id` is not yet friends
    /// with, in id order.
    pub async fn suggested_friends(
        &self,
        caller: &Caller,
        user_id: Uuid,
        page: &PageRequest,
    ) -> Result<Page<UserSummary>> {
        if !caller.is(user_id) {
            return Err(CoreError::forbidden("You can only view your own friend suggestions"));
        }
        let after = id_cursor(page)?;
        let limit = page.limit(FRIENDS_BATCH);

        let db = self.db.lock().await;
        let s = db.store();
        active_user(&s, user_id)?;
        let rows = s.list_suggested_friends(user_id, after, overfetch(limit))?;
        let total = s.count_suggested_friends(user_id)?;

        debug!(user = %user_id, count = rows.len(), "suggested friends");
        Ok(Page::from_overfetch(rows, limit, |u| u.id.to_string(), Some(total)))
    }

    pub async fn mutual_friends(
        &self,
        caller: &Caller,
        user_id: Uuid,
        other_user_id: Uuid,
        page: &PageRequest,
    ) -> Result<Page<UserSummary>> {
        if !caller.is(user_id) {
            return Err(CoreError::forbidden("You can only view your own mutual friends"));
        }
        let after = id_cursor(page)?;
        let limit = page.limit(FRIENDS_BATCH);

        let db = self.db.lock().await;
        let s = db.store();
        active_user(&s, user_id)?;
        active_user(&s, other_user_id)?;
        let rows = s.list_mutual_friends(user_id, other_user_id, after, overfetch(limit))?;
        let total = s.count_mutual_friends(user_id, other_user_id)?;

        Ok(Page::from_overfetch(rows, limit, |u| u.id.to_string(), Some(total)))
    }

    pub async fn friendship_status(
        &self,
        caller: &Caller,
        user_id: Uuid,
        other_user_id: Uuid,
    ) -> Result<FriendshipStatus> {
        if !caller.is(user_id) {
            return Err(CoreError::forbidden("You can only view your own friendships"));
        }

        let db = self.db.lock().await;
        let s = db.store();
        let user = active_user(&s, user_id)?;
        active_user(&s, other_user_id)?;

        if user.is_friend_with(other_user_id) {
            return Ok(FriendshipStatus::Friends);
        }
        Ok(match s.find_pending_request_between(user_id, other_user_id)? {
            Some(r) if r.sender_id == user_id => FriendshipStatus::RequestSent,
            Some(_) => FriendshipStatus::RequestReceived,
            None => FriendshipStatus::NotFriends,
        })
    }

    /// Active friends of `user_id`, in id order, optionally filtered by name.
    pub async fn list_friends(
        &self,
        caller: &Caller,
        user_id: Uuid,
        page: &PageRequest,
        search: Option<&str>,
    ) -> Result<Page<UserSummary>> {
        let after = id_cursor(page)?;
        let limit = page.limit(FRIENDS_BATCH);

        let db = self.db.lock().await;
        let s = db.store();
        active_user(&s, user_id)?;
        let rows = s.list_friends(user_id, search, after, overfetch(limit))?;
        let total = s.count_friends(user_id, search)?;

        debug!(caller = %caller, user = %user_id, count = rows.len(), "listed friends");
        Ok(Page::from_overfetch(rows, limit, |u| u.id.to_string(), Some(total)))
    }

    /// Pending requests received by `user_id`, newest first. The cursor is
    /// the id of the last request seen.
    pub async fn list_friend_requests(
        &self,
        caller: &Caller,
        user_id: Uuid,
        page: &PageRequest,
        search: Option<&str>,
    ) -> Result<Page<ReceivedFriendRequest>> {
        if !caller.is(user_id) {
            return Err(CoreError::forbidden("You can only view your own friend requests"));
        }
        let cursor = id_cursor(page)?;
        let limit = page.limit(FRIENDS_BATCH);

        let db = self.db.lock().await;
        let s = db.store();
        active_user(&s, user_id)?;

        let after = match cursor {
            Some(id) => match s.get_friend_request(id) {
                Ok(anchor) if anchor.receiver_id == user_id => Some((anchor.created_at, anchor.id)),
                Ok(_) | Err(StoreError::NotFound) => {
                    return Err(CoreError::bad_request("Invalid cursor"));
                }
                Err(e) => return Err(e.into()),
            },
            None => None,
        };

        let rows = s.list_received_requests(user_id, search, after, overfetch(limit))?;
        let total = s.count_received_requests(user_id, search)?;

        Ok(Page::from_overfetch(rows, limit, |r| r.request.id.to_string(), Some(total)))
    }
}

fn active_user(s: &Store<'_>, id: Uuid) -> Result<User> {
    s.get_active_user(id).or_not_found("User not found")
}
