use kinship_shared::Caller;
use kinship_store::OneOnOneChat;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ChatManager, OneOnOneChatSettings};
use crate::error::{CoreError, OrDuplicate, OrNotFound, Result};

const CHAT_EXISTS: &str = "Chat already exists!";
const CHAT_NOT_FOUND: &str = "Chat not found!";

impl<B> ChatManager<B> {
    /// Open a chat between two friends. The caller must name themselves as
    /// the initiator. The pair is unordered: a chat the other side started
    /// counts as existing.
    pub async fn create_one_on_one_chat(
        &self,
        caller: &Caller,
        initiator_id: Uuid,
        participant_id: Uuid,
    ) -> Result<OneOnOneChat> {
        if !caller.is(initiator_id) {
            return Err(CoreError::forbidden("You're not allowed to create this chat!"));
        }
        if initiator_id == participant_id {
            return Err(CoreError::bad_request("You can't start a chat with yourself"));
        }

        let chat = self.db.lock().await.transaction(|s| {
            s.get_active_user(initiator_id).or_not_found("User not found!")?;
            s.get_active_user(participant_id).or_not_found("User not found!")?;

            if s.find_one_on_one_chat_between(initiator_id, participant_id)?.is_some() {
                return Err(CoreError::conflict(CHAT_EXISTS));
            }
            if !s.are_friends(initiator_id, participant_id)? {
                return Err(CoreError::bad_request(
                    "You can't initiate chats with users who are not your friends!",
                ));
            }

            s.insert_one_on_one_chat(initiator_id, participant_id)
                .or_duplicate(|| CoreError::conflict(CHAT_EXISTS))
        })?;

        info!(chat = %chat.id, initiator = %initiator_id, participant = %participant_id, "one-on-one chat created");
        Ok(chat)
    }

    pub async fn get_one_on_one_chat(&self, caller: &Caller, chat_id: Uuid) -> Result<OneOnOneChat> {
        let db = self.db.lock().await;
        let chat = db
            .store()
            .get_one_on_one_chat(chat_id)
            .or_not_found(CHAT_NOT_FOUND)?;
        if !chat.has_member(caller.user_id) {
            return Err(CoreError::forbidden("You are not allowed to view this chat!"));
        }
        debug!(chat = %chat_id, "one-on-one chat read");
        Ok(chat)
    }

    /// Merge `settings` into the chat. Either member may change them.
    pub async fn update_one_on_one_chat_settings(
        &self,
        caller: &Caller,
        chat_id: Uuid,
        settings: OneOnOneChatSettings,
    ) -> Result<OneOnOneChat> {
        let chat = self.db.lock().await.transaction(|s| {
            let chat = s.get_one_on_one_chat(chat_id).or_not_found(CHAT_NOT_FOUND)?;
            if !chat.has_member(caller.user_id) {
                return Err(CoreError::forbidden(
                    "You are not allowed to change this chat's settings!",
                ));
            }
            s.update_one_on_one_settings(chat_id, settings.vanish_mode)
                .or_not_found(CHAT_NOT_FOUND)
        })?;

        info!(chat = %chat_id, vanish_mode = chat.vanish_mode, "one-on-one settings updated");
        Ok(chat)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::blobs::MemoryBlobStore;
    use crate::testing::{befriend, db, user};
    use crate::SharedDatabase;

    async fn setup() -> (ChatManager<MemoryBlobStore>, SharedDatabase, Uuid, Uuid) {
        let db = db();
        let (u1, u2) = (user(&db, "u1").await, user(&db, "u2").await);
        let chats = ChatManager::new(db.clone(), Arc::new(MemoryBlobStore::new()));
        (chats, db, u1, u2)
    }

    #[tokio::test]
    async fn reversed_duplicate_is_a_conflict() {
        let (chats, db, u1, u2) = setup().await;
        befriend(&db, u1, u2).await;

        chats.create_one_on_one_chat(&Caller::new(u1), u1, u2).await.unwrap();
        let err = chats
            .create_one_on_one_chat(&Caller::new(u2), u2, u1)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let rows: i64 = db
            .lock()
            .await
            .conn()
            .query_row("SELECT COUNT(*) FROM one_on_one_chats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn creation_requires_self_and_friendship() {
        let (chats, db, u1, u2) = setup().await;

        let err = chats
            .create_one_on_one_chat(&Caller::new(u2), u1, u2)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = chats
            .create_one_on_one_chat(&Caller::new(u1), u1, u2)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));

        let err = chats
            .create_one_on_one_chat(&Caller::new(u1), u1, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        befriend(&db, u2, u1).await;
        assert!(chats.create_one_on_one_chat(&Caller::new(u1), u1, u2).await.is_ok());
    }

    #[tokio::test]
    async fn only_members_read_or_change_settings() {
        let (chats, db, u1, u2) = setup().await;
        let outsider = user(&db, "outsider").await;
        befriend(&db, u1, u2).await;
        let chat = chats.create_one_on_one_chat(&Caller::new(u1), u1, u2).await.unwrap();

        let err = chats.get_one_on_one_chat(&Caller::new(outsider), chat.id).await.unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
        let err = chats.get_one_on_one_chat(&Caller::new(u1), Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let on = OneOnOneChatSettings { vanish_mode: Some(true) };
        let updated = chats
            .update_one_on_one_chat_settings(&Caller::new(u2), chat.id, on)
            .await
            .unwrap();
        assert!(updated.vanish_mode);

        let unchanged = chats
            .update_one_on_one_chat_settings(&Caller::new(u1), chat.id, OneOnOneChatSettings::default())
            .await
            .unwrap();
        assert!(unchanged.vanish_mode);

        let err = chats
            .update_one_on_one_chat_settings(&Caller::new(outsider), chat.id, on)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_creates_leave_one_chat() {
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = crate::testing::twin_dbs(&dir);
        let (u1, u2) = (user(&first, "u1").await, user(&first, "u2").await);
        befriend(&first, u1, u2).await;

        let left = ChatManager::new(first.clone(), Arc::new(MemoryBlobStore::new()));
        let right = ChatManager::new(second, Arc::new(MemoryBlobStore::new()));
        let a = tokio::spawn(async move { left.create_one_on_one_chat(&Caller::new(u1), u1, u2).await });
        let b = tokio::spawn(async move { right.create_one_on_one_chat(&Caller::new(u2), u2, u1).await });
        let outcomes = [a.await.unwrap(), b.await.unwrap()];

        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let loser = outcomes.into_iter().find_map(|r| r.err()).unwrap();
        assert!(matches!(loser, CoreError::Conflict(m) if m == CHAT_EXISTS));

        let rows: i64 = first
            .lock()
            .await
            .conn()
            .query_row("SELECT COUNT(*) FROM one_on_one_chats", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 1);
    }
}
