mod extract;
mod form;
mod friend_requests;
mod group_chats;
mod messages;
mod one_on_one_chats;
mod users;

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Path, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, patch, post, put},
    Json, Router,
};
use kinship_core::{ChatManager, FriendGraph, MessageLedger, SharedDatabase, UserDirectory};
use kinship_shared::PageRequest;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::blob_store::DiskBlobStore;
use crate::config::ServerConfig;
use crate::error::ApiError;

pub use extract::{ApiJson, ApiPath, ApiQuery, CurrentUser};

#[derive(Clone)]
pub struct AppState {
    pub users: Arc<UserDirectory<DiskBlobStore>>,
    pub friends: Arc<FriendGraph>,
    pub chats: Arc<ChatManager<DiskBlobStore>>,
    pub messages: Arc<MessageLedger>,
    pub blobs: Arc<DiskBlobStore>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(db: SharedDatabase, blobs: Arc<DiskBlobStore>, config: ServerConfig) -> Self {
        Self {
            users: Arc::new(UserDirectory::new(db.clone(), blobs.clone())),
            friends: Arc::new(FriendGraph::new(db.clone())),
            chats: Arc::new(ChatManager::new(db.clone(), blobs.clone())),
            messages: Arc::new(MessageLedger::new(db)),
            blobs,
            config: Arc::new(config),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    // multipart bodies carry the picture plus a little form overhead
    let body_limit = state.config.max_blob_size + 64 * 1024;

    Router::new()
        .route("/health", get(health_check))
        .route("/blobs/:folder/:file", get(blob_download))
        .route("/users/register", post(users::register))
        .route("/users", get(users::list))
        .route("/users/me", get(users::me))
        .route("/users/chats", get(users::chats))
        .route(
            "/users/:id",
            get(users::get_one).put(users::update).delete(users::remove),
        )
        .route("/users/:id/friends", get(users::friends))
        .route("/users/:id/friend-requests", get(users::friend_requests))
        .route("/users/:id/unfriend/:friend_id", post(users::unfriend))
        .route("/users/:id/suggested-friends", get(users::suggested_friends))
        .route("/users/:id/mutual-friends/:other_id", get(users::mutual_friends))
        .route(
            "/users/:id/friendship-status/:other_id",
            get(users::friendship_status),
        )
        .route("/friend-requests", post(friend_requests::send))
        .route(
            "/friend-requests/:id",
            put(friend_requests::update).delete(friend_requests::cancel),
        )
        .route("/one-on-one-chats/create", post(one_on_one_chats::create))
        .route("/one-on-one-chats/:id", get(one_on_one_chats::get_one))
        .route("/one-on-one-chats/:id/settings", patch(one_on_one_chats::settings))
        .route("/one-on-one-chats/:id/messages", get(one_on_one_chats::messages))
        .route("/group-chats/create", post(group_chats::create))
        .route("/group-chats/:id", get(group_chats::get_one))
        .route("/group-chats/:id/settings", patch(group_chats::settings))
        .route("/group-chats/:id/messages", get(group_chats::messages))
        .route("/group-chats/:id/add-members", patch(group_chats::add_members))
        .route("/group-chats/:id/remove-member", patch(group_chats::remove_member))
        .route("/messages/send", post(messages::send))
        .route("/messages/delete/:id", patch(messages::delete))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Response envelope shared by every successful endpoint.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    success: bool,
    message: String,
    data: Option<T>,
}

/// A successful reply: status code plus envelope.
pub struct Reply<T> {
    status: StatusCode,
    message: String,
    data: Option<T>,
}

impl<T: Serialize> Reply<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn created(message: impl Into<String>, data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::ok(message, data)
        }
    }
}

impl Reply<()> {
    pub fn done(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::OK,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for Reply<T> {
    fn into_response(self) -> Response {
        let body = Envelope {
            success: true,
            message: self.message,
            data: self.data,
        };
        (self.status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Reply<T>, ApiError>;

/// Query string shared by the paginated listings.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub cursor: Option<String>,
    pub take: Option<u32>,
    pub search: Option<String>,
}

impl ListQuery {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.cursor.clone(), self.take)
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    time: chrono::DateTime<chrono::Utc>,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        time: chrono::Utc::now(),
    })
}

async fn blob_download(
    State(state): State<AppState>,
    Path((folder, file)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let data = state.blobs.read(&folder, &file).await?;
    let mime = match file.rsplit_once('.').map(|(_, ext)| ext) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    Ok(([(header::CONTENT_TYPE, mime)], data).into_response())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
