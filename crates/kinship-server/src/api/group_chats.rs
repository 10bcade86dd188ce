use axum::extract::{Multipart, State};
use kinship_core::{GroupChatSettings, NewGroup};
use kinship_shared::Page;
use kinship_store::{ChatRef, GroupChat, Message};
use serde::Deserialize;
use uuid::Uuid;

use super::form::Form;
use super::{ApiJson, ApiPath, ApiQuery, ApiResult, AppState, CurrentUser, ListQuery, Reply};
use crate::error::ApiError;

const ICON_FIELD: &str = "groupIcon";

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    multipart: Multipart,
) -> ApiResult<GroupChat> {
    let mut form = Form::read(multipart).await?;
    let group = NewGroup {
        owner_id: form.uuid("ownerId")?,
        member_ids: form.uuids("memberIds")?,
        name: form.text("name").unwrap_or_default().to_string(),
        group_description: form
            .text("groupDescription")
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string),
    };
    let icon = form.take_file(ICON_FIELD);

    let chat = state.chats.create_group_chat(&caller, group, icon).await?;
    Ok(Reply::created("Group chat created successfully", chat))
}

pub async fn get_one(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<GroupChat> {
    let chat = state.chats.get_group_chat(&caller, id).await?;
    Ok(Reply::ok("Group chat fetched successfully", chat))
}

/// Multipart: a `settings` JSON text part and an optional `groupIcon`.
pub async fn settings(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    multipart: Multipart,
) -> ApiResult<GroupChat> {
    let mut form = Form::read(multipart).await?;
    let settings = match form.text("settings") {
        Some(raw) => GroupChatSettings::parse(raw)?,
        None => GroupChatSettings::default(),
    };
    let icon = form.take_file(ICON_FIELD);

    let chat = state
        .chats
        .update_group_chat_settings(&caller, id, settings, icon)
        .await?;
    Ok(Reply::ok("Group chat settings updated successfully", chat))
}

pub async fn messages(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<Message>> {
    let messages = state
        .messages
        .list_messages(&caller, ChatRef::Group(id), &query.page(), query.search())
        .await?;
    Ok(Reply::ok("Messages fetched successfully", messages))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddMembersRequest {
    owner_id: Uuid,
    member_ids: Vec<Uuid>,
}

pub async fn add_members(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<AddMembersRequest>,
) -> ApiResult<GroupChat> {
    if body.member_ids.is_empty() {
        return Err(ApiError::BadRequest("At least one member is required".into()));
    }
    let result = state
        .chats
        .add_members_to_group_chat(&caller, id, body.owner_id, &body.member_ids)
        .await?;
    Ok(Reply::ok(result.message(), result.chat))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RemoveMemberRequest {
    owner_id: Uuid,
    member_id: Uuid,
}

pub async fn remove_member(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<RemoveMemberRequest>,
) -> ApiResult<GroupChat> {
    let chat = state
        .chats
        .remove_member_from_group_chat(&caller, id, body.owner_id, body.member_id)
        .await?;
    Ok(Reply::ok("Member removed successfully", chat))
}
