//! Server configuration.
//!
//! Environment variables:
//! - `DECKSYNC_PORT`: Port to listen on (default: 8080)
//! - `DECKSYNC_CONFIG`: Path to config file (default: ~/.config/decksync-server/config.yaml)
//!
//! # Config File Format
//!
//! ```yaml
//! tokens:
//!   - token: "your-secret-token-here"
//!     user_id: "user1"
//!     name: "Ada"
//!     avatar_url: "https://example.com/ada.png"
//! ```

use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_PORT: u16 = 8080;

/// Token entry in config
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenEntry {
    pub token: String,
    pub user_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Config file structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    pub tokens: Vec<TokenEntry>,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to listen on
    pub port: u16,
    /// Path to config file
    pub config_path: PathBuf,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let port = std::env::var("DECKSYNC_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let config_path = std::env::var("DECKSYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_config_path());

        Self { port, config_path }
    }
}

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("decksync-server")
        .join("config.yaml")
}
