use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use decksync_core::ConnectionConfig;

pub const DEFAULT_SERVER_URL: &str = "http://localhost:8080";
pub const DEFAULT_ACK_TIMEOUT_SECS: u64 = 10;

/// Source of a configuration value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigSource {
    Default,
    File,
    Environment,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::Default => write!(f, "default"),
            ConfigSource::File => write!(f, "file"),
            ConfigSource::Environment => write!(f, "environment"),
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }
}

/// Application configuration with source tracking
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Sync server URL (http(s) or ws(s))
    pub server_url: ConfigValue<String>,
    /// Access token sent on the socket handshake
    #[serde(serialize_with = "serialize_masked")]
    pub token: ConfigValue<Option<String>>,
    /// Seconds to wait for a server acknowledgment
    pub ack_timeout_secs: ConfigValue<u64>,
    /// Config file path used (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

/// Internal struct for deserializing config file
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ConfigFile {
    server_url: Option<String>,
    token: Option<String>,
    ack_timeout_secs: Option<u64>,
}

fn serialize_masked<S>(token: &ConfigValue<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    ConfigValue::new(token.value.as_deref().map(mask_token), token.source.clone())
        .serialize(serializer)
}

/// Shows only the last four characters of a token.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let visible: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(chars.len() - 4), visible)
}

impl Config {
    /// Load configuration with priority: env vars > config file > defaults
    pub fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut server_url = ConfigValue::new(DEFAULT_SERVER_URL.to_string(), ConfigSource::Default);
        let mut token = ConfigValue::new(None, ConfigSource::Default);
        let mut ack_timeout_secs = ConfigValue::new(DEFAULT_ACK_TIMEOUT_SECS, ConfigSource::Default);
        let mut config_file = None;

        // Try to load from config file
        let path = config_path.unwrap_or_else(Self::default_config_path);
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .map_err(|e| ConfigError::ReadError(path.clone(), e))?;
            let file_config: ConfigFile = serde_yaml::from_str(&contents)
                .map_err(|e| ConfigError::ParseError(path.clone(), e))?;

            config_file = Some(path.clone());

            if let Some(url) = file_config.server_url {
                server_url = ConfigValue::new(url, ConfigSource::File);
            }
            if let Some(value) = file_config.token {
                token = ConfigValue::new(Some(value), ConfigSource::File);
            }
            if let Some(secs) = file_config.ack_timeout_secs {
                ack_timeout_secs = ConfigValue::new(secs, ConfigSource::File);
            }
        }

        // Apply environment variable overrides
        if let Ok(url) = std::env::var("DECK_SERVER_URL") {
            server_url = ConfigValue::new(url, ConfigSource::Environment);
        }
        if let Ok(value) = std::env::var("DECK_TOKEN") {
            token = ConfigValue::new(Some(value), ConfigSource::Environment);
        }
        if let Ok(value) = std::env::var("DECK_ACK_TIMEOUT_SECS") {
            let secs = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("DECK_ACK_TIMEOUT_SECS", value.clone()))?;
            ack_timeout_secs = ConfigValue::new(secs, ConfigSource::Environment);
        }

        Ok(Self {
            server_url,
            token,
            ack_timeout_secs,
            config_file,
        })
    }

    /// Connection settings for the sync client.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.server_url.value.clone())
            .with_ack_timeout(Duration::from_secs(self.ack_timeout_secs.value))
    }

    /// Default config directory (platform-specific):
    /// - Linux: ~/.config/deck/
    /// - macOS: ~/Library/Application Support/deck/
    /// - Windows: %APPDATA%/deck/
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("deck")
    }

    /// Default config file path (platform-specific config dir + config.yaml)
    pub fn default_config_path() -> PathBuf {
        Self::default_config_dir().join("config.yaml")
    }
}

#[derive(Debug)]
pub enum ConfigError {
    ReadError(PathBuf, std::io::Error),
    ParseError(PathBuf, serde_yaml::Error),
    InvalidValue(&'static str, String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::ReadError(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::ParseError(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidValue(name, value) => {
                write!(f, "Invalid value for {}: '{}'", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}
