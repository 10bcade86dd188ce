use axum::extract::{Multipart, State};
use kinship_core::{FriendshipStatus, InboxEntry, Registration, UserPatch};
use kinship_shared::Page;
use kinship_store::{ReceivedFriendRequest, User, UserSummary};
use serde::Serialize;
use uuid::Uuid;

use super::form::Form;
use super::{ApiPath, ApiQuery, ApiResult, AppState, CurrentUser, ListQuery, Reply};

const PICTURE_FIELD: &str = "profilePicture";

pub async fn register(State(state): State<AppState>, multipart: Multipart) -> ApiResult<User> {
    let mut form = Form::read(multipart).await?;
    let registration = Registration {
        email: form.required("email")?.to_string(),
        password_hash: form.required("passwordHash")?.to_string(),
        name: form.required("name")?.to_string(),
        bio: form.text("bio").filter(|b| !b.trim().is_empty()).map(str::to_string),
    };
    let picture = form.take_file(PICTURE_FIELD);

    let user = state.users.register_user(registration, picture).await?;
    Ok(Reply::created("User registered successfully", user))
}

pub async fn list(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<User>> {
    let users = state.users.list_users(&query.page(), query.search()).await?;
    Ok(Reply::ok("Users fetched successfully", users))
}

pub async fn me(State(state): State<AppState>, CurrentUser(caller): CurrentUser) -> ApiResult<User> {
    let user = state.users.get_user(caller.user_id).await?;
    Ok(Reply::ok("User fetched successfully", user))
}

pub async fn chats(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<InboxEntry>> {
    let chats = state.chats.list_user_chats(&caller, &query.page()).await?;
    Ok(Reply::ok("Chats fetched successfully", chats))
}

pub async fn get_one(
    State(state): State<AppState>,
    CurrentUser(_): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<User> {
    let user = state.users.get_user(id).await?;
    Ok(Reply::ok("User fetched successfully", user))
}

pub async fn update(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    multipart: Multipart,
) -> ApiResult<User> {
    let mut form = Form::read(multipart).await?;
    let patch = UserPatch {
        name: form.text("name").map(str::to_string),
        // an empty bio field clears the bio
        bio: form
            .text("bio")
            .map(|b| Some(b.trim().to_string()).filter(|b| !b.is_empty())),
    };
    let picture = form.take_file(PICTURE_FIELD);

    let user = state.users.update_user(&caller, id, patch, picture).await?;
    Ok(Reply::ok("User updated successfully", user))
}

pub async fn remove(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<()> {
    state.users.delete_user(&caller, id).await?;
    Ok(Reply::done("User deleted successfully"))
}

pub async fn friends(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<UserSummary>> {
    let friends = state
        .friends
        .list_friends(&caller, id, &query.page(), query.search())
        .await?;
    Ok(Reply::ok("Friends fetched successfully", friends))
}

pub async fn friend_requests(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<ReceivedFriendRequest>> {
    let requests = state
        .friends
        .list_friend_requests(&caller, id, &query.page(), query.search())
        .await?;
    Ok(Reply::ok("Friend requests fetched successfully", requests))
}

pub async fn unfriend(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath((id, friend_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<()> {
    state.friends.unfriend_user(&caller, id, friend_id).await?;
    Ok(Reply::done("User unfriended successfully"))
}

pub async fn suggested_friends(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<UserSummary>> {
    let suggestions = state.friends.suggested_friends(&caller, id, &query.page()).await?;
    Ok(Reply::ok("Suggested friends fetched successfully", suggestions))
}

pub async fn mutual_friends(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath((id, other_id)): ApiPath<(Uuid, Uuid)>,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<Page<UserSummary>> {
    let mutual = state
        .friends
        .mutual_friends(&caller, id, other_id, &query.page())
        .await?;
    Ok(Reply::ok("Mutual friends fetched successfully", mutual))
}

#[derive(Serialize)]
pub struct StatusBody {
    status: FriendshipStatus,
}

pub async fn friendship_status(
    State(state): State<AppState>,
    CurrentUser(caller): CurrentUser,
    ApiPath((id, other_id)): ApiPath<(Uuid, Uuid)>,
) -> ApiResult<StatusBody> {
    let status = state.friends.friendship_status(&caller, id, other_id).await?;
    Ok(Reply::ok("Friendship status fetched successfully", StatusBody { status }))
}
