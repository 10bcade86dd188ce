//! The message ledger. Messages are append-only; deletion blanks the
//! content but keeps the row so history keeps its shape.

use kinship_shared::constants::MESSAGES_BATCH;
use kinship_shared::{Caller, Page, PageRequest};
use kinship_store::{ChatRef, Message, Store, StoreError};
use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoreError, OrNotFound, Result};
use crate::paging::{id_cursor, overfetch};
use crate::SharedDatabase;

const CHAT_NOT_FOUND: &str = "Chat not found!";
const MESSAGE_NOT_FOUND: &str = "Message not found!";

/// A message as submitted by a client. Exactly one chat id must be set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    pub content: String,
    pub sender_id: Uuid,
    #[serde(default)]
    pub one_on_one_chat_id: Option<Uuid>,
    #[serde(default)]
    pub group_chat_id: Option<Uuid>,
}

pub struct MessageLedger {
    db: SharedDatabase,
}

/// `true` if `user_id` belongs to `chat`. NotFound if the chat is missing.
fn is_member(s: &Store<'_>, chat: ChatRef, user_id: Uuid) -> Result<bool> {
    match chat {
        ChatRef::OneOnOne(id) => Ok(s
            .get_one_on_one_chat(id)
            .or_not_found(CHAT_NOT_FOUND)?
            .has_member(user_id)),
        ChatRef::Group(id) => Ok(s
            .get_group_chat(id)
            .or_not_found(CHAT_NOT_FOUND)?
            .has_member(user_id)),
    }
}

impl MessageLedger {
    pub fn new(db: SharedDatabase) -> Self {
        Self { db }
    }

    /// Append a message and bump the chat's `last_message_at` in the same
    /// transaction.
    pub async fn send_message(&self, caller: &Caller, msg: NewMessage) -> Result<Message> {
        let chat = ChatRef::from_ids(msg.one_on_one_chat_id, msg.group_chat_id).ok_or_else(|| {
            CoreError::bad_request("Exactly one of oneOnOneChatId or groupChatId is required")
        })?;
        if msg.content.trim().is_empty() {
            return Err(CoreError::bad_request("Message content is required"));
        }

        let message = self.db.lock().await.transaction(|s| {
            s.get_active_user(msg.sender_id).or_not_found("Sender not found!")?;
            if !caller.is(msg.sender_id) {
                return Err(CoreError::forbidden(
                    "You are not allowed to send messages in this chat!",
                ));
            }
            // a chat the sender is not in is reported as missing
            if !is_member(s, chat, msg.sender_id)? {
                return Err(CoreError::not_found(CHAT_NOT_FOUND));
            }

            let message = s.insert_message(&msg.content, msg.sender_id, chat)?;
            match chat {
                ChatRef::OneOnOne(id) => s.touch_one_on_one_chat(id, message.created_at)?,
                ChatRef::Group(id) => s.touch_group_chat(id, message.created_at)?,
            }
            Ok(message)
        })?;

        info!(message = %message.id, chat = %chat.id(), sender = %message.sender_id, "message sent");
        Ok(message)
    }

    /// Soft-delete a message. Senders may delete their own messages; a
    /// group owner may delete any message in the group.
    pub async fn delete_message(&self, caller: &Caller, message_id: Uuid) -> Result<Message> {
        let message = self.db.lock().await.transaction(|s| {
            let message = s.get_message(message_id).or_not_found(MESSAGE_NOT_FOUND)?;
            if message.is_deleted {
                return Err(CoreError::not_found(MESSAGE_NOT_FOUND));
            }

            let allowed = caller.is(message.sender_id)
                || match message.chat() {
                    Some(ChatRef::Group(id)) => {
                        s.get_group_chat(id).or_not_found(CHAT_NOT_FOUND)?.owner_id == caller.user_id
                    }
                    _ => false,
                };
            if !allowed {
                return Err(CoreError::forbidden("You are not allowed to delete this message!"));
            }

            s.soft_delete_message(message_id, kinship_store::store::now())
                .or_not_found(MESSAGE_NOT_FOUND)
        })?;

        info!(message = %message_id, by = %caller, "message deleted");
        Ok(message)
    }

    /// Messages of one chat, newest first, deleted ones included. The
    /// cursor is the id of the last message of the previous page.
    pub async fn list_messages(
        &self,
        caller: &Caller,
        chat: ChatRef,
        page: &PageRequest,
        search: Option<&str>,
    ) -> Result<Page<Message>> {
        let cursor = id_cursor(page)?;
        let limit = page.limit(MESSAGES_BATCH);

        let db = self.db.lock().await;
        let s = db.store();
        if !is_member(&s, chat, caller.user_id)? {
            return Err(CoreError::forbidden("You are not allowed to view this chat!"));
        }

        let after = match cursor {
            None => None,
            Some(id) => match s.get_message(id) {
                Ok(m) if m.chat() == Some(chat) => Some((m.created_at, m.id)),
                Ok(_) | Err(StoreError::NotFound) => {
                    return Err(CoreError::bad_request(format!("Invalid cursor '{id}'")));
                }
                Err(e) => return Err(e.into()),
            },
        };

        let rows = s.list_messages(chat, search, after, overfetch(limit))?;
        let total = s.count_messages(chat, search)?;

        debug!(chat = %chat.id(), count = rows.len(), "listed messages");
        Ok(Page::from_overfetch(rows, limit, |m| m.id.to_string(), Some(total)))
    }
}
