use std::{net::SocketAddr, str::FromStr};

use thiserror::Error;

/// Runtime configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Socket address for binding the HTTP server.
    pub bind_addr: SocketAddr,
    /// Base URL of the upstream Evolution API.
    pub upstream_url: String,
    /// Master API key, used only for instance creation.
    pub master_api_key: String,
    /// Optional directory holding the built dashboard bundle.
    pub static_dir: Option<String>,
}

impl Config {
    /// Loads runtime configuration using environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let port = match std::env::var("SERVER_PORT") {
            Ok(raw) => u16::from_str(&raw).map_err(|_| ConfigError::InvalidPort(raw))?,
            Err(_) => 3001,
        };

        let upstream_url =
            std::env::var("EVOLUTION_API_URL").map_err(|_| ConfigError::MissingUpstreamUrl)?;
        let master_api_key =
            std::env::var("MASTER_API_KEY").map_err(|_| ConfigError::MissingMasterKey)?;
        let static_dir = std::env::var("STATIC_DIR")
            .ok()
            .filter(|dir| !dir.trim().is_empty());

        Ok(Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], port)),
            upstream_url: upstream_url.trim_end_matches('/').to_owned(),
            master_api_key,
            static_dir,
        })
    }
}

/// Errors while loading runtime configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid SERVER_PORT value: {0}")]
    InvalidPort(String),
    #[error("missing EVOLUTION_API_URL environment variable")]
    MissingUpstreamUrl,
    #[error("missing MASTER_API_KEY environment variable")]
    MissingMasterKey,
}
