use kinship_shared::constants::GROUP_ICONS_FOLDER;
use kinship_shared::Caller;
use kinship_store::group_chats::GroupChatUpdate;
use kinship_store::{GroupChat, NewGroupChat};
use tracing::{debug, info};
use uuid::Uuid;

use super::{
    check_members, distinct_members, group_chat, ChatManager, GroupChatSettings, MembersAdded,
    NewGroup, MEMBERS_NOT_FOUND,
};
use crate::blobs::{discard, BlobStore, Upload};
use crate::error::{CoreError, OrNotFound, Result};

const OWNER_ONLY: &str = "Only the group owner can do this!";

impl<B: BlobStore> ChatManager<B> {
    /// Create a group owned by the caller. Every member must be a friend
    /// of the owner; the owner is added as a member implicitly.
    ///
    /// The icon is uploaded only after the membership checks pass, and is
    /// deleted again if the chat cannot be written.
    pub async fn create_group_chat(
        &self,
        caller: &Caller,
        group: NewGroup,
        icon: Option<Upload>,
    ) -> Result<GroupChat> {
        if !caller.is(group.owner_id) {
            return Err(CoreError::forbidden("You are not allowed to create this group chat!"));
        }
        let icon = icon.ok_or_else(|| CoreError::bad_request("Group icon is required"))?;
        let name = group.name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::bad_request("Group name is required"));
        }
        let members = distinct_members(group.owner_id, &group.member_ids);
        if members.is_empty() {
            return Err(CoreError::bad_request("At least one member is required"));
        }

        {
            let db = self.db.lock().await;
            check_members(&db.store(), group.owner_id, &members)?;
        }

        let icon_url = self.blobs.upload(&icon, GROUP_ICONS_FOLDER).await?;

        let new = NewGroupChat {
            name,
            owner_id: group.owner_id,
            group_description: group.group_description,
            group_icon_url: icon_url.clone(),
        };
        let created = self.db.lock().await.transaction(|s| {
            // friendships may have changed while the icon was uploading
            check_members(s, new.owner_id, &members)?;
            Ok::<_, CoreError>(s.insert_group_chat(&new, &members)?)
        });

        match created {
            Ok(chat) => {
                info!(chat = %chat.id, owner = %chat.owner_id, members = chat.member_ids.len(), "group chat created");
                Ok(chat)
            }
            Err(e) => {
                discard(self.blobs.as_ref(), &icon_url).await;
                Err(e)
            }
        }
    }

    pub async fn get_group_chat(&self, caller: &Caller, chat_id: Uuid) -> Result<GroupChat> {
        let db = self.db.lock().await;
        let chat = group_chat(&db.store(), chat_id)?;
        if !chat.has_member(caller.user_id) {
            return Err(CoreError::forbidden("You are not allowed to view this chat!"));
        }
        debug!(chat = %chat_id, "group chat read");
        Ok(chat)
    }

    /// Owner-only merge of name, description and icon. An empty change is
    /// rejected once ownership is established. A replaced icon is removed
    /// from the blob store after the update commits.
    pub async fn update_group_chat_settings(
        &self,
        caller: &Caller,
        chat_id: Uuid,
        settings: GroupChatSettings,
        icon: Option<Upload>,
    ) -> Result<GroupChat> {
        {
            let db = self.db.lock().await;
            let chat = group_chat(&db.store(), chat_id)?;
            if !caller.is(chat.owner_id) {
                return Err(CoreError::forbidden(OWNER_ONLY));
            }
        }
        if settings.is_empty() && icon.is_none() {
            return Err(CoreError::bad_request("Nothing to update"));
        }

        let new_icon = match &icon {
            Some(upload) => Some(self.blobs.upload(upload, GROUP_ICONS_FOLDER).await?),
            None => None,
        };

        let update = GroupChatUpdate {
            name: settings.name.map(|n| n.trim().to_string()),
            group_description: settings.group_description,
            group_icon_url: new_icon.clone(),
        };
        let updated = self.db.lock().await.transaction(|s| {
            let before = group_chat(s, chat_id)?;
            if !caller.is(before.owner_id) {
                return Err(CoreError::forbidden(OWNER_ONLY));
            }
            let after = s.update_group_chat(chat_id, &update).or_not_found(super::GROUP_NOT_FOUND)?;
            Ok((before.group_icon_url, after))
        });

        match updated {
            Ok((old_icon, chat)) => {
                if new_icon.is_some() && old_icon != chat.group_icon_url {
                    discard(self.blobs.as_ref(), &old_icon).await;
                }
                info!(chat = %chat_id, "group settings updated");
                Ok(chat)
            }
            Err(e) => {
                if let Some(url) = &new_icon {
                    discard(self.blobs.as_ref(), url).await;
                }
                Err(e)
            }
        }
    }
}

impl<B> ChatManager<B> {
    /// Add friends of the owner to the group. Ids already in the chat are
    /// skipped, so repeating a call changes nothing.
    pub async fn add_members_to_group_chat(
        &self,
        caller: &Caller,
        chat_id: Uuid,
        owner_id: Uuid,
        member_ids: &[Uuid],
    ) -> Result<MembersAdded> {
        let requested = distinct_members(owner_id, member_ids);

        let result = self.db.lock().await.transaction(|s| {
            let chat = group_chat(s, chat_id)?;

            let mut everyone = Vec::with_capacity(requested.len() + 1);
            everyone.push(owner_id);
            everyone.extend_from_slice(&requested);
            if s.active_user_ids(&everyone)?.len() != everyone.len() {
                return Err(CoreError::not_found("One or more members not found"));
            }

            if !caller.is(owner_id) || chat.owner_id != owner_id {
                return Err(CoreError::forbidden(OWNER_ONLY));
            }

            let fresh: Vec<Uuid> = requested
                .iter()
                .copied()
                .filter(|id| !chat.has_member(*id))
                .collect();
            if fresh.is_empty() {
                return Ok(MembersAdded { chat, added: Vec::new() });
            }

            check_members(s, owner_id, &fresh)?;
            let added = s.add_group_members(chat_id, fresh)?;
            let chat = group_chat(s, chat_id)?;
            Ok(MembersAdded { chat, added })
        })?;

        info!(chat = %chat_id, added = result.added.len(), "group members added");
        Ok(result)
    }

    /// Remove one member. The owner can never be removed.
    pub async fn remove_member_from_group_chat(
        &self,
        caller: &Caller,
        chat_id: Uuid,
        owner_id: Uuid,
        member_id: Uuid,
    ) -> Result<GroupChat> {
        let chat = self.db.lock().await.transaction(|s| {
            let chat = group_chat(s, chat_id)?;
            if member_id == chat.owner_id {
                return Err(CoreError::forbidden("The group owner cannot be removed!"));
            }

            s.get_active_user(owner_id).or_not_found(MEMBERS_NOT_FOUND)?;
            s.get_active_user(member_id).or_not_found(MEMBERS_NOT_FOUND)?;

            if !caller.is(owner_id) || chat.owner_id != owner_id {
                return Err(CoreError::forbidden(OWNER_ONLY));
            }
            if !s.remove_group_member(chat_id, member_id)? {
                return Err(CoreError::conflict("User is not a member of this chat"));
            }
            group_chat(s, chat_id)
        })?;

        info!(chat = %chat_id, member = %member_id, "group member removed");
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

    struct Fixture {
        chats: ChatManager<MemoryBlobStore>,
        blobs: Arc<MemoryBlobStore>,
        db: SharedDatabase,
        owner: Uuid,
        friends: Vec<Uuid>,
        stranger: Uuid,
    }

    async fn fixture() -> Fixture {
        let db = db();
        let owner = user(&db, "owner").await;
        let mut friends = Vec::new();
        for name in ["f1", "f2", "f3"] {
            let id = user(&db, name).await;
            befriend(&db, owner, id).await;
            friends.push(id);
        }
        let stranger = user(&db, "stranger").await;
        let blobs = Arc::new(MemoryBlobStore::new());
        Fixture {
            chats: ChatManager::new(db.clone(), blobs.clone()),
            blobs,
            db,
            owner,
            friends,
            stranger,
        }
    }

    fn icon() -> Option<Upload> {
        Some(Upload::new("icon.png", vec![0x89u8, 0x50]))
    }

    fn group(owner_id: Uuid, member_ids: Vec<Uuid>) -> NewGroup {
        NewGroup {
            owner_id,
            member_ids,
            name: "Hikers".into(),
            group_description: None,
        }
    }

    async fn group_rows(db: &SharedDatabase) -> i64 {
        db.lock()
            .await
            .conn()
            .query_row("SELECT COUNT(*) FROM group_chats", [], |r| r.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn owner_is_an_implicit_member() {
        let f = fixture().await;
        let chat = f
            .chats
            .create_group_chat(&Caller::new(f.owner), group(f.owner, vec![f.friends[0]]), icon())
            .await
            .unwrap();
        assert!(chat.member_ids.contains(&f.owner));
        assert!(chat.member_ids.contains(&f.friends[0]));
        assert!(f.blobs.contains(&chat.group_icon_url).await);
    }

    #[tokio::test]
    async fn non_friend_member_rejects_the_whole_group() {
        let f = fixture().await;
        let err = f
            .chats
            .create_group_chat(
                &Caller::new(f.owner),
                group(f.owner, vec![f.friends[0], f.stranger]),
                icon(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(m) if m.contains("aren't your friends")));
        assert_eq!(group_rows(&f.db).await, 0);
        assert!(f.blobs.is_empty().await);
    }

    #[tokio::test]
    async fn creation_preconditions() {
        let f = fixture().await;
        let me = Caller::new(f.owner);

        let err = f.chats.create_group_chat(&me, group(f.owner, vec![f.friends[0]]), None).await.unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(m) if m == "Group icon is required"));

        let err = f
            .chats
            .create_group_chat(&Caller::new(f.friends[0]), group(f.owner, vec![f.friends[1]]), icon())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = f.chats.create_group_chat(&me, group(f.owner, vec![f.owner]), icon()).await.unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));

        let err = f
            .chats
            .create_group_chat(&me, group(f.owner, vec![Uuid::new_v4()]), icon())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert_eq!(group_rows(&f.db).await, 0);
    }

    #[tokio::test]
    async fn adding_members_is_idempotent() {
        let f = fixture().await;
        let me = Caller::new(f.owner);
        let chat = f.chats.create_group_chat(&me, group(f.owner, vec![f.friends[0]]), icon()).await.unwrap();
        let more = [f.friends[1], f.friends[2], f.friends[0]];

        let first = f.chats.add_members_to_group_chat(&me, chat.id, f.owner, &more).await.unwrap();
        assert_eq!(first.added, vec![f.friends[1], f.friends[2]]);
        assert_eq!(first.message(), "2 new members added successfully");

        let second = f.chats.add_members_to_group_chat(&me, chat.id, f.owner, &more).await.unwrap();
        assert!(second.added.is_empty());
        assert_eq!(
            second.message(),
            "No new members were added, all members already exist in the chat"
        );

        let mut a = first.chat.member_ids.clone();
        let mut b = second.chat.member_ids.clone();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn adding_checks_owner_and_friendship() {
        let f = fixture().await;
        let me = Caller::new(f.owner);
        let chat = f.chats.create_group_chat(&me, group(f.owner, vec![f.friends[0]]), icon()).await.unwrap();

        let err = f
            .chats
            .add_members_to_group_chat(&me, chat.id, f.owner, &[f.stranger])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(_)));

        let member = Caller::new(f.friends[0]);
        let err = f
            .chats
            .add_members_to_group_chat(&member, chat.id, f.friends[0], &[f.friends[1]])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = f
            .chats
            .add_members_to_group_chat(&me, chat.id, f.owner, &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));

        let err = f
            .chats
            .add_members_to_group_chat(&me, Uuid::new_v4(), f.owner, &[f.friends[1]])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn owner_can_never_be_removed() {
        let f = fixture().await;
        let me = Caller::new(f.owner);
        let chat = f.chats.create_group_chat(&me, group(f.owner, vec![f.friends[0]]), icon()).await.unwrap();

        for caller in [f.owner, f.friends[0], f.stranger] {
            let err = f
                .chats
                .remove_member_from_group_chat(&Caller::new(caller), chat.id, caller, f.owner)
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::Forbidden(_)));
        }
    }

    #[tokio::test]
    async fn remove_member_then_conflict() {
        let f = fixture().await;
        let me = Caller::new(f.owner);
        let chat = f.chats.create_group_chat(&me, group(f.owner, vec![f.friends[0]]), icon()).await.unwrap();

        let after = f
            .chats
            .remove_member_from_group_chat(&me, chat.id, f.owner, f.friends[0])
            .await
            .unwrap();
        assert!(!after.member_ids.contains(&f.friends[0]));

        let err = f
            .chats
            .remove_member_from_group_chat(&me, chat.id, f.owner, f.friends[0])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));

        let err = f
            .chats
            .remove_member_from_group_chat(&Caller::new(f.friends[1]), chat.id, f.friends[1], f.friends[0])
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));
    }

    #[tokio::test]
    async fn settings_are_owner_only_and_replace_the_icon() {
        let f = fixture().await;
        let me = Caller::new(f.owner);
        let chat = f.chats.create_group_chat(&me, group(f.owner, vec![f.friends[0]]), icon()).await.unwrap();
        let settings = GroupChatSettings::parse(r#"{"groupDescription":"trail talk"}"#).unwrap();

        let err = f
            .chats
            .update_group_chat_settings(&Caller::new(f.friends[0]), chat.id, settings.clone(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let updated = f
            .chats
            .update_group_chat_settings(&me, chat.id, settings, Some(Upload::new("new.jpg", vec![1u8])))
            .await
            .unwrap();
        assert_eq!(updated.name, "Hikers");
        assert_eq!(updated.group_description.as_deref(), Some("trail talk"));
        assert_ne!(updated.group_icon_url, chat.group_icon_url);
        assert!(!f.blobs.contains(&chat.group_icon_url).await);
        assert!(f.blobs.contains(&updated.group_icon_url).await);

        let err = f
            .chats
            .update_group_chat_settings(&me, Uuid::new_v4(), GroupChatSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn empty_settings_are_judged_after_ownership() {
        let f = fixture().await;
        let me = Caller::new(f.owner);
        let chat = f.chats.create_group_chat(&me, group(f.owner, vec![f.friends[0]]), icon()).await.unwrap();

        let err = f
            .chats
            .update_group_chat_settings(&Caller::new(f.friends[0]), chat.id, GroupChatSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Forbidden(_)));

        let err = f
            .chats
            .update_group_chat_settings(&me, chat.id, GroupChatSettings::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::BadRequest(m) if m == "Nothing to update"));
        assert_eq!(f.blobs.len().await, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_adds_keep_both_members() {
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = crate::testing::twin_dbs(&dir);
        let owner = user(&first, "owner").await;
        let mut friends = Vec::new();
        for name in ["f1", "f2", "f3"] {
            let id = user(&first, name).await;
            befriend(&first, owner, id).await;
            friends.push(id);
        }

        let left = ChatManager::new(first.clone(), Arc::new(MemoryBlobStore::new()));
        let right = ChatManager::new(second, Arc::new(MemoryBlobStore::new()));
        let me = Caller::new(owner);
        let chat = left.create_group_chat(&me, group(owner, vec![friends[0]]), icon()).await.unwrap();

        let (id, f1, f2) = (chat.id, friends[1], friends[2]);
        let a = tokio::spawn(async move { left.add_members_to_group_chat(&me, id, owner, &[f1]).await });
        let b = tokio::spawn(async move { right.add_members_to_group_chat(&me, id, owner, &[f2]).await });
        assert_eq!(a.await.unwrap().unwrap().added, vec![f1]);
        assert_eq!(b.await.unwrap().unwrap().added, vec![f2]);

        let mut members = first.lock().await.store().get_group_chat(id).unwrap().member_ids;
        members.sort();
        let mut expected = vec![owner, friends[0], f1, f2];
        expected.sort();
        assert_eq!(members, expected);
    }
}
