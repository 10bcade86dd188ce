//! # kinship-server
//!
//! HTTP API for the Kinship social backend.
//!
//! This binary provides:
//! - **User directory** endpoints (registration, profiles, account deletion)
//! - **Friendship** endpoints (requests, unfriending, suggestions, mutual friends)
//! - **Chats** (one-on-one and group) with their settings and the user inbox
//! - **Messages** (send, soft delete, paginated history)
//! - **Blob storage** for profile pictures and group icons, served from disk
//!
//! Authentication happens upstream: the gateway forwards the verified user
//! id in `X-User-Id`.

mod api;
mod blob_store;
mod config;
mod error;

use std::sync::Arc;

use kinship_store::Database;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::blob_store::DiskBlobStore;
use crate::config::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,kinship_server=debug,kinship_core=debug")
            }),
        )
        .init();

    info!(
        "Starting {} server v{}",
        kinship_shared::constants::APP_NAME,
        env!("CARGO_PKG_VERSION")
    );

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");
    if config.gateway_token.is_none() {
        tracing::warn!("GATEWAY_TOKEN not set, X-User-Id is trusted from any client");
    }

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)?.with_max_retries(config.tx_max_retries);
    info!(path = %config.database_path.display(), "Database opened");

    // Blob store (creates directory if missing)
    let blobs = Arc::new(
        DiskBlobStore::new(
            config.blob_storage_path.clone(),
            config.blob_public_url.clone(),
            config.max_blob_size,
        )
        .await?,
    );

    let http_addr = config.http_addr;
    let app_state = AppState::new(kinship_core::share(db), blobs, config);

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
