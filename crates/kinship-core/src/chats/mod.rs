//! Chat membership: one-on-one and group chats, their settings, and the
//! inbox that lists both.
//!
//! A one-on-one chat may only be opened between friends, and a group
//! member must be a friend of the owner when added. Neither rule is
//! re-checked later, so unfriending leaves existing chats untouched.

mod group;
mod inbox;
mod one_on_one;

use std::sync::Arc;

use kinship_store::{GroupChat, Store, User};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, OrNotFound, Result};
use crate::SharedDatabase;

pub use inbox::InboxEntry;

const GROUP_NOT_FOUND: &str = "Group chat not found!";
const MEMBERS_NOT_FOUND: &str = "Admin or Member not found!";
const MEMBERS_NOT_FRIENDS: &str = "You can't add members who aren't your friends in groups!";

pub struct ChatManager<B> {
    db: SharedDatabase,
    blobs: Arc<B>,
}

impl<B> ChatManager<B> {
    pub fn new(db: SharedDatabase, blobs: Arc<B>) -> Self {
        Self { db, blobs }
    }
}

/// Partial settings for a one-on-one chat. Absent fields stay unchanged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OneOnOneChatSettings {
    #[serde(default)]
    pub vanish_mode: Option<bool>,
}

/// Partial settings for a group chat, received as a JSON document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GroupChatSettings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub group_description: Option<String>,
}

impl GroupChatSettings {
    /// Parse and validate a settings document. Unknown fields, wrong types
    /// and blank values are all rejected.
    pub fn parse(raw: &str) -> Result<Self> {
        let settings: Self =
            serde_json::from_str(raw).map_err(|_| CoreError::bad_request("Invalid settings"))?;

        let blank = |v: &Option<String>| matches!(v, Some(s) if s.trim().is_empty());
        if blank(&settings.name) || blank(&settings.group_description) {
            return Err(CoreError::bad_request("Invalid settings"));
        }
        Ok(settings)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.group_description.is_none()
    }
}

/// What a caller asks for when creating a group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewGroup {
    pub owner_id: Uuid,
    pub member_ids: Vec<Uuid>,
    pub name: String,
    pub group_description: Option<String>,
}

/// Result of an add-members call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MembersAdded {
    pub chat: GroupChat,
    /// Members that were not in the chat before this call.
    pub added: Vec<Uuid>,
}

impl MembersAdded {
    pub fn message(&self) -> String {
        match self.added.len() {
            0 => "No new members were added, all members already exist in the chat".to_string(),
            1 => "1 new member added successfully".to_string(),
            n => format!("{n} new members added successfully"),
        }
    }
}

/// `ids` without duplicates and without `owner_id`, first occurrence kept.
fn distinct_members(owner_id: Uuid, ids: &[Uuid]) -> Vec<Uuid> {
    let mut out: Vec<Uuid> = Vec::with_capacity(ids.len());
    for &id in ids {
        if id != owner_id && !out.contains(&id) {
            out.push(id);
        }
    }
    out
}

/// Check that the owner and every member exist and are active, and that
/// each member is a friend of the owner. Returns the owner.
fn check_members(s: &Store<'_>, owner_id: Uuid, member_ids: &[Uuid]) -> Result<User> {
    let owner = s.get_active_user(owner_id).or_not_found(MEMBERS_NOT_FOUND)?;
    if s.active_user_ids(member_ids)?.len() != member_ids.len() {
        return Err(CoreError::not_found(MEMBERS_NOT_FOUND));
    }
    if !member_ids.iter().all(|&m| owner.is_friend_with(m)) {
        return Err(CoreError::bad_request(MEMBERS_NOT_FRIENDS));
    }
    Ok(owner)
}

/// The group chat, or NotFound.
fn group_chat(s: &Store<'_>, chat_id: Uuid) -> Result<GroupChat> {
    s.get_group_chat(chat_id).or_not_found(GROUP_NOT_FOUND)
}
