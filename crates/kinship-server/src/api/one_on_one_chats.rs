use axum::extract::State;
use kinship_core::OneOnOneChatSettings;
use kinship_shared::Page;
use kinship_store::{ChatRef, Message, OneOnOneChat};
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiQuery, ApiResult, AppState, CurrentUser, ListQuery, Reply};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CreateRequest {
    initiator_id: Uuid,
    participant_id: Uuid,
}

pub async fn create(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiJson(body): ApiJson<CreateRequest>,
) -> ApiResult<OneOnOneChat> {
    let chat = state
        .chats
        .create_one_on_one_chat(&caller, body.initiator_id, body.participant_id)
        .await?;
    Ok(Reply::created("Chat created successfully", chat))
}

pub async fn get_one(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<OneOnOneChat> {
    let chat = state.chats.get_one_on_one_chat(&caller, id).await?;
    Ok(Reply::ok("Chat fetched successfully", chat))
}

pub async fn settings(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(settings): ApiJson<OneOnOneChatSettings>,
) -> ApiResult<OneOnOneChat> {
    let chat = state
        .chats
        .update_one_on_one_chat_settings(&caller, id, settings)
        .await?;
    Ok(Reply::ok("Chat settings updated successfully", chat))
}

pub async fn messages(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<Message>> {
    let messages = state
        .messages
        .list_messages(&caller, ChatRef::OneOnOne(id), &query.page(), query.search())
        .await?;
    Ok(Reply::ok("Messages fetched successfully", messages))
}
