//! Server configuration loaded from environment variables.
//!
//! All settings have defaults so the server starts with zero configuration
//! for local development.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;

use kinship_shared::constants::DEFAULT_HTTP_PORT;

#[derive(Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: `./kinship.db`
    pub database_path: PathBuf,

    /// Directory holding uploaded pictures and icons.
    /// Env: `BLOB_STORAGE_PATH`
    /// Default: `./blobs`
    pub blob_storage_path: PathBuf,

    /// URL prefix blobs are served under. Stored URLs are
    /// `{blob_public_url}/{folder}/{file}`.
    /// Env: `BLOB_PUBLIC_URL`
    /// Default: `/blobs`
    pub blob_public_url: String,

    /// Maximum upload size in bytes.
    /// Env: `MAX_BLOB_SIZE`
    /// Default: 5 MiB
    pub max_blob_size: usize,

    /// Shared secret the auth gateway sends in `X-Gateway-Token`. When unset
    /// the `X-User-Id` header is trusted as is.
    /// Env: `GATEWAY_TOKEN`
    pub gateway_token: Option<String>,

    /// How often a transaction is retried when the database is locked.
    /// Env: `TX_MAX_RETRIES`
    /// Default: `3`
    pub tx_max_retries: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./kinship.db"),
            blob_storage_path: PathBuf::from("./blobs"),
            blob_public_url: "/blobs".to_string(),
            max_blob_size: 5 * 1024 * 1024, // 5 MiB
            gateway_token: None,
            tx_max_retries: 3,
        }
    }
}

// The gateway token must never reach the logs.
impl fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerConfig")
            .field("http_addr", &self.http_addr)
            .field("database_path", &self.database_path)
            .field("blob_storage_path", &self.blob_storage_path)
            .field("blob_public_url", &self.blob_public_url)
            .field("max_blob_size", &self.max_blob_size)
            .field("gateway_token", &self.gateway_token.as_ref().map(|_| "<redacted>"))
            .field("tx_max_retries", &self.tx_max_retries)
            .finish()
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            match addr.parse::<SocketAddr>() {
                Ok(parsed) => config.http_addr = parsed,
                Err(_) => tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default"),
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        }

        if let Some(path) = var("BLOB_STORAGE_PATH") {
            config.blob_storage_path = PathBuf::from(path);
        }

        if let Some(url) = var("BLOB_PUBLIC_URL") {
            let url = url.trim_end_matches('/');
            if url.is_empty() {
                tracing::warn!("Empty BLOB_PUBLIC_URL, using default");
            } else {
                config.blob_public_url = url.to_string();
            }
        }

        if let Some(val) = var("MAX_BLOB_SIZE") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_blob_size = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_BLOB_SIZE, using default"),
            }
        }

        if let Some(token) = var("GATEWAY_TOKEN") {
            if !token.is_empty() {
                config.gateway_token = Some(token);
            }
        }

        if let Some(val) = var("TX_MAX_RETRIES") {
            match val.parse::<u32>() {
                Ok(n) => config.tx_max_retries = n,
                Err(_) => tracing::warn!(value = %val, "Invalid TX_MAX_RETRIES, using default"),
            }
        }

        // RUST_LOG is read by tracing-subscriber's EnvFilter directly.

        config
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> ServerConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = load(&[]);
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.blob_public_url, "/blobs");
        assert!(config.gateway_token.is_none());
        assert_eq!(config.tx_max_retries, 3);
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HTTP_ADDR", "127.0.0.1:9000"),
            ("DATABASE_PATH", "/tmp/k.db"),
            ("BLOB_PUBLIC_URL", "https://cdn.example.com/"),
            ("MAX_BLOB_SIZE", "1024"),
            ("GATEWAY_TOKEN", "s3cret"),
            ("TX_MAX_RETRIES", "0"),
        ]);
        assert_eq!(config.http_addr, ([127, 0, 0, 1], 9000).into());
        assert_eq!(config.database_path, PathBuf::from("/tmp/k.db"));
        assert_eq!(config.blob_public_url, "https://cdn.example.com");
        assert_eq!(config.max_blob_size, 1024);
        assert_eq!(config.gateway_token.as_deref(), Some("s3cret"));
        assert_eq!(config.tx_max_retries, 0);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = load(&[
            ("HTTP_ADDR", "not-an-addr"),
            ("MAX_BLOB_SIZE", "0"),
            ("TX_MAX_RETRIES", "-1"),
            ("GATEWAY_TOKEN", ""),
        ]);
        let default = ServerConfig::default();
        assert_eq!(config.http_addr, default.http_addr);
        assert_eq!(config.max_blob_size, default.max_blob_size);
        assert_eq!(config.tx_max_retries, default.tx_max_retries);
        assert!(config.gateway_token.is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let config = load(&[("GATEWAY_TOKEN", "s3cret")]);
        let shown = format!("{config:?}");
        assert!(!shown.contains("s3cret"));
        assert!(shown.contains("<redacted>"));
    }
}
