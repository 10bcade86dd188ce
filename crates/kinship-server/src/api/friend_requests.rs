use axum::extract::State;
use kinship_core::FriendRequestDecision;
use kinship_store::FriendRequest;
use serde::Deserialize;
use uuid::Uuid;

use super::{ApiJson, ApiPath, ApiResult, AppState, CurrentUser, Reply};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendRequest {
    sender_id: Uuid,
    receiver_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DecisionRequest {
    status: FriendRequestDecision,
}

pub async fn send(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiJson(body): ApiJson<SendRequest>,
) -> ApiResult<FriendRequest> {
    let request = state
        .friends
        .send_friend_request(&caller, body.sender_id, body.receiver_id)
        .await?;
    Ok(Reply::created("Friend request sent successfully", request))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<DecisionRequest>,
) -> ApiResult<FriendRequest> {
    let request = state.friends.update_friend_request(&caller, id, body.status).await?;
    let message = match body.status {
        FriendRequestDecision::Accepted => "Friend request accepted successfully",
        FriendRequestDecision::Rejected => "Friend request rejected successfully",
    };
    Ok(Reply::ok(message, request))
}

pub async fn cancel(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.friends.cancel_friend_request(&caller, id).await?;
    Ok(Reply::done("Friend request cancelled successfully"))
}
