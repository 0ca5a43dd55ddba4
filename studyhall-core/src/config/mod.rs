//! Configuration management for StudyHall
//!
//! This module provides environment-based configuration management with
//! support for defaults, file loading, and validation.

use crate::core_notify::DEFAULT_SESSION_CAPACITY;
use crate::core_room::codes::{LINK_CODE_LEN, ROOM_CODE_LEN};
use crate::core_room::manager_impl::{ManagerSettings, DEFAULT_INVITE_TTL, DEFAULT_LINK_TTL};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

mod error;

pub use error::ConfigError;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Store configuration
    pub store: StoreConfig,

    /// Join code configuration
    pub codes: CodeConfig,

    /// Invitation configuration
    pub invites: InviteConfig,

    /// Notification configuration
    pub notify: NotifyConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the SQLite database file
    pub db_path: PathBuf,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// How long a connection waits on a locked database
    #[serde(with = "humantime_serde")]
    pub busy_timeout: Duration,
}

/// Join code configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeConfig {
    /// Length of room join codes
    pub room_code_length: usize,

    /// Length of invite link codes
    pub link_code_length: usize,
}

/// Invitation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteConfig {
    /// Acceptance window for direct invitations
    #[serde(with = "humantime_serde")]
    pub invite_ttl: Duration,

    /// Lifetime of shareable invite links
    #[serde(with = "humantime_serde")]
    pub link_ttl: Duration,
}

/// Notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Per-session event queue depth
    pub session_capacity: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON formatting
    pub json_format: bool,

    /// Include timestamps
    pub with_timestamp: bool,

    /// Include target module
    pub with_target: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            codes: CodeConfig::default(),
            invites: InviteConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("./studyhall.db"),
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            room_code_length: ROOM_CODE_LEN,
            link_code_length: LINK_CODE_LEN,
        }
    }
}

impl Default for InviteConfig {
    fn default() -> Self {
        Self {
            invite_ttl: DEFAULT_INVITE_TTL,
            link_ttl: DEFAULT_LINK_TTL,
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            session_capacity: DEFAULT_SESSION_CAPACITY,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            with_timestamp: true,
            with_target: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Environment variables follow the pattern: STUDYHALL_<SECTION>_<KEY>
    /// Example: STUDYHALL_STORE_DB_PATH=/var/lib/studyhall/studyhall.db
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        // Store config
        if let Ok(db_path) = env::var("STUDYHALL_STORE_DB_PATH") {
            config.store.db_path = PathBuf::from(db_path);
        }
        if let Ok(max_conn) = env::var("STUDYHALL_STORE_MAX_CONNECTIONS") {
            config.store.max_connections = max_conn.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid max connections: {}", e))
            })?;
        }

        // Code config
        if let Ok(len) = env::var("STUDYHALL_CODES_ROOM_CODE_LENGTH") {
            config.codes.room_code_length = len.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid room code length: {}", e))
            })?;
        }
        if let Ok(len) = env::var("STUDYHALL_CODES_LINK_CODE_LENGTH") {
            config.codes.link_code_length = len.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid link code length: {}", e))
            })?;
        }

        // Notify config
        if let Ok(capacity) = env::var("STUDYHALL_NOTIFY_SESSION_CAPACITY") {
            config.notify.session_capacity = capacity.parse().map_err(|e| {
                ConfigError::InvalidValue(format!("Invalid session capacity: {}", e))
            })?;
        }

        // Logging config
        if let Ok(level) = env::var("STUDYHALL_LOG_LEVEL") {
            config.logging.level = level;
        }
        if let Ok(json) = env::var("STUDYHALL_LOG_JSON") {
            config.logging.json_format = json
                .parse()
                .map_err(|e| ConfigError::InvalidValue(format!("Invalid JSON flag: {}", e)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::FileReadError(e.to_string()))?;

        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate store config
        if self.store.max_connections == 0 {
            return Err(ConfigError::ValidationFailed(
                "max_connections must be greater than 0".to_string(),
            ));
        }

        // Validate code config; tiny code spaces make collisions routine
        if self.codes.room_code_length < 4 {
            return Err(ConfigError::ValidationFailed(
                "room_code_length must be at least 4".to_string(),
            ));
        }
        if self.codes.link_code_length < 4 {
            return Err(ConfigError::ValidationFailed(
                "link_code_length must be at least 4".to_string(),
            ));
        }

        // Validate invite config
        if self.invites.invite_ttl.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "invite_ttl must be non-zero".to_string(),
            ));
        }
        if self.invites.link_ttl.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "link_ttl must be non-zero".to_string(),
            ));
        }

        // Validate notify config
        if self.notify.session_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "session_capacity must be greater than 0".to_string(),
            ));
        }

        // Validate logging config
        if crate::logging::LogLevel::parse(&self.logging.level).is_none() {
            return Err(ConfigError::ValidationFailed(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: impl AsRef<std::path::Path>) -> Result<(), ConfigError> {
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, contents).map_err(|e| ConfigError::FileWriteError(e.to_string()))?;

        Ok(())
    }

    /// Manager settings carried by this configuration
    pub fn manager_settings(&self) -> ManagerSettings {
        ManagerSettings {
            room_code_length: self.codes.room_code_length,
            link_code_length: self.codes.link_code_length,
            invite_ttl: self.invites.invite_ttl,
            link_ttl: self.invites.link_ttl,
        }
    }
}
