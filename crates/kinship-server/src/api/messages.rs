use axum::extract::State;
use kinship_core::NewMessage;
use kinship_store::Message;
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiResult, AppState, CurrentUser, Reply};

pub async fn send(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiJson(body): ApiJson<NewMessage>,
) -> ApiResult<Message> {
    let message = state.messages.send_message(&caller, body).await?;
    Ok(Reply::created("Message sent successfully", message))
}

pub async fn delete(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Message> {
    let message = state.messages.delete_message(&caller, id).await?;
    Ok(Reply::ok("Message deleted successfully", message))
}
