//! Domain model structs persisted in the SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize` so it can be handed
//! straight to the HTTP layer.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use kinship_shared::ChatKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoreError;

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

/// A registered account.
///
/// Friendship is undirected but surfaces as two directed lists: an edge
/// initiated by this user lists the other side in `friend_ids`, an edge
/// initiated by the other side lists them in `friend_of_ids`. A friend
/// appears in exactly one of the two.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    /// Opaque hash produced by the auth layer. Never serialized.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub name: String,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
    pub friend_ids: Vec<Uuid>,
    pub friend_of_ids: Vec<Uuid>,
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// `true` if `other` is a friend in either direction.
    pub fn is_friend_with(&self, other: Uuid) -> bool {
        self.friend_ids.contains(&other) || self.friend_of_ids.contains(&other)
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            profile_picture_url: self.profile_picture_url.clone(),
        }
    }
}

/// Fields supplied at registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub bio: Option<String>,
    pub profile_picture_url: Option<String>,
}

/// The public face of a user in listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub profile_picture_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Friend request
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

impl FriendRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for FriendRequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FriendRequestStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "ACCEPTED" => Ok(Self::Accepted),
            "REJECTED" => Ok(Self::Rejected),
            other => Err(StoreError::Corrupt(format!(
                "unknown friend request status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FriendRequest {
    pub fn involves(&self, user_id: Uuid) -> bool {
        self.sender_id == user_id || self.receiver_id == user_id
    }
}

/// A received request together with who sent it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedFriendRequest {
    #[serde(flatten)]
    pub request: FriendRequest,
    pub sender: UserSummary,
}

// ---------------------------------------------------------------------------
// Chats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OneOnOneChat {
    pub id: Uuid,
    pub initiator_id: Uuid,
    pub participant_id: Uuid,
    pub vanish_mode: bool,
    pub last_message_at: DateTime<Utc>,
    pub deleted_for_initiator: Option<DateTime<Utc>>,
    pub deleted_for_participant: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OneOnOneChat {
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.initiator_id == user_id || self.participant_id == user_id
    }

    /// The member that is not `user_id`.
    pub fn other_member(&self, user_id: Uuid) -> Uuid {
        if self.initiator_id == user_id {
            self.participant_id
        } else {
            self.initiator_id
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GroupChat {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub group_description: Option<String>,
    pub group_icon_url: String,
    /// Always contains `owner_id`. Ordered by join time.
    pub member_ids: Vec<Uuid>,
    pub last_message_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GroupChat {
    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.owner_id == user_id || self.member_ids.contains(&user_id)
    }
}

/// Fields supplied when creating a group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroupChat {
    pub name: String,
    pub owner_id: Uuid,
    pub group_description: Option<String>,
    pub group_icon_url: String,
}

/// Reference to the chat a message lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatRef {
    OneOnOne(Uuid),
    Group(Uuid),
}

impl ChatRef {
    /// Build from the two optional foreign keys; exactly one must be set.
    pub fn from_ids(one_on_one_chat_id: Option<Uuid>, group_chat_id: Option<Uuid>) -> Option<Self> {
        match (one_on_one_chat_id, group_chat_id) {
            (Some(id), None) => Some(Self::OneOnOne(id)),
            (None, Some(id)) => Some(Self::Group(id)),
            _ => None,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            Self::OneOnOne(id) | Self::Group(id) => *id,
        }
    }

    pub fn kind(&self) -> ChatKind {
        match self {
            Self::OneOnOne(_) => ChatKind::OneOnOne,
            Self::Group(_) => ChatKind::Group,
        }
    }
}

/// Inbox ordering key for one chat of either kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChatHead {
    pub chat: ChatRef,
    pub last_message_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// A single chat message. Deleted messages keep their row with empty content.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Uuid,
    pub content: String,
    pub sender_id: Uuid,
    pub one_on_one_chat_id: Option<Uuid>,
    pub group_chat_id: Option<Uuid>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Message {
    pub fn chat(&self) -> Option<ChatRef> {
        ChatRef::from_ids(self.one_on_one_chat_id, self.group_chat_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_ref_requires_exactly_one_id() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        assert_eq!(ChatRef::from_ids(Some(a), None), Some(ChatRef::OneOnOne(a)));
        assert_eq!(ChatRef::from_ids(None, Some(b)), Some(ChatRef::Group(b)));
        assert_eq!(ChatRef::from_ids(Some(a), Some(b)), None);
        assert_eq!(ChatRef::from_ids(None, None), None);
    }

    #[test]
    fn status_parses_known_values_only() {
        assert_eq!(
            "ACCEPTED".parse::<FriendRequestStatus>().unwrap(),
            FriendRequestStatus::Accepted
        );
        assert!("accepted".parse::<FriendRequestStatus>().is_err());
    }

    #[test]
    fn password_hash_is_not_serialized() {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email: "a@example.com".into(),
            password_hash: "secret".into(),
            name: "A".into(),
            bio: None,
            profile_picture_url: None,
            friend_ids: vec![],
            friend_of_ids: vec![],
            is_deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        };
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["email"], "a@example.com");
    }
}
