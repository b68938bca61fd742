//! Bearer token validation for socket handshakes.

use std::collections::HashMap;
use std::path::Path;

use decksync_core::ActiveUser;

use super::config::{ConfigFile, TokenEntry};

/// Close code sent when the handshake token is missing or unknown.
pub const CLOSE_UNAUTHORIZED: u16 = 4001;

/// Token store - maps token -> user
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: HashMap<String, ActiveUser>,
}

impl TokenStore {
    pub fn from_entries(entries: Vec<TokenEntry>) -> Self {
        let tokens = entries
            .into_iter()
            .map(|entry| {
                (
                    entry.token,
                    ActiveUser {
                        user_id: entry.user_id,
                        name: entry.name,
                        avatar_url: entry.avatar_url,
                    },
                )
            })
            .collect();
        Self { tokens }
    }

    /// Load tokens from config file. A missing or unreadable file leaves
    /// the store empty.
    pub fn load(config_path: &Path) -> Self {
        let store = match std::fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<ConfigFile>(&contents) {
                Ok(config) => Self::from_entries(config.tokens),
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!(
                    "Failed to read config file {}: {}",
                    config_path.display(),
                    e
                );
                Self::default()
            }
        };

        if store.is_empty() {
            tracing::warn!("No tokens loaded - all socket connections will be refused");
        } else {
            tracing::info!("Loaded {} token(s)", store.len());
        }
        store
    }

    /// Validate a token and return the associated user
    pub fn validate(&self, token: &str) -> Option<ActiveUser> {
        self.tokens.get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
