use chrono::{DateTime, Utc};
use kinship_shared::constants::CHATS_BATCH;
use kinship_shared::{Caller, ChatCursor, ChatKind, Page, PageRequest};
use kinship_store::{ChatHead, ChatRef, Message, Store};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::ChatManager;
use crate::error::{OrNotFound, Result};
use crate::paging::overfetch;

/// One row of a user's inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxEntry {
    #[serde(rename = "type")]
    pub kind: ChatKind,
    pub id: Uuid,
    /// The other member's name for one-on-one chats, the group name otherwise.
    pub name: String,
    pub image_url: Option<String>,
    pub last_message_at: DateTime<Utc>,
    pub last_message: Option<Message>,
}

impl InboxEntry {
    pub fn cursor(&self) -> ChatCursor {
        ChatCursor {
            last_message_at: self.last_message_at,
            id: self.id,
        }
    }
}

impl<B> ChatManager<B> {
    /// Every chat the caller belongs to, most recently active first.
    pub async fn list_user_chats(&self, caller: &Caller, page: &PageRequest) -> Result<Page<InboxEntry>> {
        let after = page.cursor().map(ChatCursor::decode).transpose()?;
        let limit = page.limit(CHATS_BATCH);

        let db = self.db.lock().await;
        let s = db.store();
        s.get_active_user(caller.user_id).or_not_found("User not found!")?;

        let heads = s.list_chat_heads(caller.user_id, after, overfetch(limit))?;
        let total = s.count_chat_heads(caller.user_id)?;
        let entries = heads
            .into_iter()
            .map(|head| entry(&s, caller.user_id, head))
            .collect::<Result<Vec<_>>>()?;

        debug!(user = %caller, count = entries.len(), "listed inbox");
        Ok(Page::from_overfetch(entries, limit, |e| e.cursor().encode(), Some(total)))
    }
}

fn entry(s: &Store<'_>, viewer: Uuid, head: ChatHead) -> Result<InboxEntry> {
    let (name, image_url) = match head.chat {
        ChatRef::OneOnOne(id) => {
            let chat = s.get_one_on_one_chat(id)?;
            // deleted accounts still render, under their scrubbed name
            let other = s.get_user(chat.other_member(viewer))?;
            (other.name, other.profile_picture_url)
        }
        ChatRef::Group(id) => {
            let chat = s.get_group_chat(id)?;
            (chat.name, Some(chat.group_icon_url))
        }
    };

    Ok(InboxEntry {
        kind: head.chat.kind(),
        id: head.chat.id(),
        name,
        image_url,
        last_message_at: head.last_message_at,
        last_message: s.latest_message(head.chat)?,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use kinship_store::NewGroupChat;

    use super::*;
    use crate::blobs::MemoryBlobStore;
    use crate::error::CoreError;
    use crate::testing::{befriend, db, user};

    #[tokio::test]
    async fn inbox_interleaves_kinds_by_latest_activity() {
        let db = db();
        let (a, b, c) = (user(&db, "a").await, user(&db, "b").await, user(&db, "c").await);
        befriend(&db, a, b).await;
        befriend(&db, a, c).await;
        let chats = ChatManager::new(db.clone(), Arc::new(MemoryBlobStore::new()));

        let direct = chats.create_one_on_one_chat(&Caller::new(a), a, b).await.unwrap();
        let group = {
            let db = db.lock().await;
            db.store()
                .insert_group_chat(
                    &NewGroupChat {
                        name: "trio".into(),
                        owner_id: a,
                        group_description: None,
                        group_icon_url: "memory://group_icons/x.png".into(),
                    },
                    &[c],
                )
                .unwrap()
        };
        {
            // the direct chat becomes the freshest
            let db = db.lock().await;
            let s = db.store();
            let msg = s.insert_message("hi", b, ChatRef::OneOnOne(direct.id)).unwrap();
            let later = group.last_message_at + chrono::Duration::seconds(5);
            s.touch_one_on_one_chat(direct.id, later.max(msg.created_at)).unwrap();
        }

        let page = chats.list_user_chats(&Caller::new(a), &PageRequest::first(1)).await.unwrap();
        assert_eq!(page.pagination.total_count, Some(2));
        assert!(page.pagination.has_next_page);
        let first = &page.items[0];
        assert_eq!(first.kind, ChatKind::OneOnOne);
        assert_eq!(first.name, "b");
        assert_eq!(first.last_message.as_ref().map(|m| m.content.as_str()), Some("hi"));

        let cursor = page.pagination.next_cursor.clone().unwrap();
        let rest = chats
            .list_user_chats(&Caller::new(a), &PageRequest::after(cursor, 1))
            .await
            .unwrap();
        assert_eq!(rest.items.len(), 1);
        assert_eq!(rest.items[0].kind, ChatKind::Group);
        assert_eq!(rest.items[0].name, "trio");
        assert!(rest.items[0].last_message.is_none());
        assert!(!rest.pagination.has_next_page);

        let json = serde_json::to_value(&rest.items[0]).unwrap();
        assert_eq!(json["type"], "GROUP");
        assert_eq!(json["imageUrl"], "memory://group_icons/x.png");
    }

    #[tokio::test]
    async fn inbox_rejects_bad_cursor_and_unknown_user() {
        let db = db();
        let a = user(&db, "a").await;
        let chats = ChatManager::new(db, Arc::new(MemoryBlobStore::new()));

        let err = chats
            .list_user_chats(&Caller::new(a), &PageRequest::after("%%%", 5))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));

        let err = chats
            .list_user_chats(&Caller::new(Uuid::new_v4()), &PageRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let empty = chats.list_user_chats(&Caller::new(a), &PageRequest::default()).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.pagination.total_count, Some(0));
    }

    #[tokio::test]
    async fn default_inbox_page_is_one_chat_batch() {
        let db = db();
        let me = user(&db, "me").await;
        for i in 0..=CHATS_BATCH {
            let friend = user(&db, &format!("friend{i}")).await;
            befriend(&db, me, friend).await;
            db.lock().await.store().insert_one_on_one_chat(me, friend).unwrap();
        }
        let chats = ChatManager::new(db, Arc::new(MemoryBlobStore::new()));

        let page = chats.list_user_chats(&Caller::new(me), &PageRequest::default()).await.unwrap();
        assert_eq!(page.items.len(), CHATS_BATCH as usize);
        assert!(page.pagination.has_next_page);
        assert_eq!(page.pagination.total_count, Some(u64::from(CHATS_BATCH) + 1));
    }
}
