//! Layered configuration, loaded once at startup and validated before
//! the server accepts connections.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_listen_addr() -> SocketAddr {
    ([0, 0, 0, 0], 7777).into()
}

fn default_admin_addr() -> SocketAddr {
    ([0, 0, 0, 0], 9090).into()
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_name")]
    pub name: String,
    #[serde(default = "default_environment")]
    pub environment: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_server_name() -> String {
    "strangerlink".to_string()
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            environment: default_environment(),
            version: default_version(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    #[serde(default = "default_listen_addr")]
    pub address: SocketAddr,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: default_listen_addr(),
        }
    }
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_rate_limit_max_requests() -> u32 {
    120
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    #[serde(default = "default_admin_addr")]
    pub address: SocketAddr,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            address: default_admin_addr(),
            allowed_origins: Vec::new(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
        }
    }
}

fn default_max_message_length() -> usize {
    500
}

fn default_max_chat_duration_ms() -> i64 {
    3_600_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_max_chat_duration_ms")]
    pub max_chat_duration_ms: i64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_length: default_max_message_length(),
            max_chat_duration_ms: default_max_chat_duration_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentFilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub strict: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ContentFilterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebrtcConfig {
    #[serde(default)]
    pub stun_servers: Vec<String>,
    #[serde(default)]
    pub turn_servers: Vec<String>,
}

fn default_queue_max_wait_secs() -> u64 {
    300
}

fn default_max_queue() -> usize {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct MatchingConfig {
    #[serde(default = "default_max_queue")]
    pub max_queue: usize,
    #[serde(default = "default_queue_max_wait_secs")]
    pub max_wait_secs: u64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            max_queue: default_max_queue(),
            max_wait_secs: default_queue_max_wait_secs(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            path: None,
            format: default_log_format(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub content_filter: ContentFilterConfig,
    #[serde(default)]
    pub webrtc: WebrtcConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&raw)?;
        validate(&config)?;
        Ok(config)
    }
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.chat.max_message_length == 0 || config.chat.max_message_length > 10_000 {
        return Err(ConfigError::Invalid(
            "chat.max_message_length must be in [1, 10000]".to_string(),
        ));
    }
    if config.server.environment == "production" && config.admin.allowed_origins.is_empty() {
        return Err(ConfigError::Invalid(
            "admin.allowed_origins must be non-empty in production".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let toml_str = r#"
            [server]
            name = "test"

            [chat]
            max_message_length = 300
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.name, "test");
        assert_eq!(config.chat.max_message_length, 300);
        assert_eq!(config.matching.max_queue, 1000);
    }

    #[test]
    fn rejects_oversize_message_length() {
        let mut config = Config::default();
        config.chat.max_message_length = 20_000;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn production_requires_allowed_origins() {
        let mut config = Config::default();
        config.server.environment = "production".to_string();
        assert!(validate(&config).is_err());
        config.admin.allowed_origins.push("https://example.com".to_string());
        assert!(validate(&config).is_ok());
    }
}
