//! # Configuration Management
//!
//! Centralized configuration for the control-plane clients and the hook binary.
//!
//! This module provides structured configuration for the RCON client, the
//! Server List Ping queries, docker CLI invocation, lifecycle stop policy and
//! logging.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - `GAMECTL_*` environment overrides via `from_env()`
//!
//! Configuration is per process invocation; nothing here is persisted by the
//! library.

use crate::error::{ProtocolError, Result};
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Maximum RCON payload a single response packet may carry
pub const MAX_RCON_PAYLOAD: usize = 4096;

/// Maximum SLP frame accepted (status documents may embed a favicon)
pub const MAX_SLP_FRAME: usize = 2 * 1024 * 1024;

/// Default RCON port
pub const DEFAULT_RCON_PORT: u16 = 25575;

/// Default Minecraft game port
pub const DEFAULT_GAME_PORT: u16 = 25565;

/// Directory holding the standalone docker binaries inside the WSL2 distro
pub const WSL2_DOCKER_DIR: &str = "/opt/saba-chan/docker";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ControlConfig {
    /// RCON client configuration
    #[serde(default)]
    pub rcon: RconConfig,

    /// Server List Ping configuration
    #[serde(default)]
    pub ping: PingConfig,

    /// Docker CLI configuration
    #[serde(default)]
    pub docker: DockerConfig,

    /// Lifecycle policy configuration
    #[serde(default)]
    pub lifecycle: LifecycleConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ControlConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables on top of the defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        Ok(config)
    }

    /// Apply `GAMECTL_*` environment overrides in place
    pub fn apply_env(&mut self) {
        if let Ok(timeout) = std::env::var("GAMECTL_RCON_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                self.rcon.timeout = Duration::from_millis(val);
            }
        }

        if let Ok(timeout) = std::env::var("GAMECTL_PING_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                self.ping.timeout = Duration::from_millis(val);
            }
        }

        if let Ok(dir) = std::env::var("GAMECTL_WSL2_DOCKER_DIR") {
            self.docker.wsl2_docker_dir = dir;
        }

        if let Ok(level) = std::env::var("GAMECTL_LOG_LEVEL") {
            if let Ok(level) = level.parse::<Level>() {
                self.logging.log_level = level;
            }
        }
    }

    /// Resolve the configuration for the hook binary: explicit path, then
    /// `GAMECTL_CONFIG`, then defaults. Environment overrides always apply last.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("GAMECTL_CONFIG").ok();
        let mut config = match (path, env_path) {
            (Some(p), _) => Self::from_file(p)?,
            (None, Some(p)) => Self::from_file(p)?,
            (None, None) => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| ProtocolError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.rcon.validate());
        errors.extend(self.ping.validate());
        errors.extend(self.docker.validate());
        errors.extend(self.lifecycle.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ProtocolError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// RCON client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RconConfig {
    /// Default host when a hook config does not name one
    pub host: String,

    /// Default RCON port
    pub port: u16,

    /// Bound for connect and for each receive
    #[serde(with = "duration_serde")]
    pub timeout: Duration,

    /// Largest payload accepted in one response packet
    pub max_payload: usize,
}

impl Default for RconConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: DEFAULT_RCON_PORT,
            timeout: timeout::DEFAULT_TIMEOUT,
            max_payload: MAX_RCON_PAYLOAD,
        }
    }
}

impl RconConfig {
    /// Validate RCON configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("RCON host cannot be empty".to_string());
        }

        if self.port == 0 {
            errors.push("RCON port must be greater than 0".to_string());
        }

        if self.timeout.as_millis() < 100 {
            errors.push("RCON timeout too short (minimum: 100ms)".to_string());
        } else if self.timeout.as_secs() > 300 {
            errors.push("RCON timeout too long (maximum: 300s)".to_string());
        }

        if self.max_payload < 1024 {
            errors.push("RCON max payload too small (minimum: 1 KB)".to_string());
        } else if self.max_payload > 1024 * 1024 {
            errors.push(format!(
                "RCON max payload too large: {} bytes (maximum: 1 MB)",
                self.max_payload
            ));
        }

        errors
    }
}

/// Server List Ping configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PingConfig {
    /// Bound for connect and for each receive
    #[serde(with = "duration_serde")]
    pub timeout: Duration,

    /// Largest status frame accepted
    pub max_frame: usize,
}

impl Default for PingConfig {
    fn default() -> Self {
        Self {
            timeout: timeout::PING_TIMEOUT,
            max_frame: MAX_SLP_FRAME,
        }
    }
}

impl PingConfig {
    /// Validate ping configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.timeout.as_millis() < 100 {
            errors.push("Ping timeout too short (minimum: 100ms)".to_string());
        } else if self.timeout.as_secs() > 60 {
            errors.push("Ping timeout too long (maximum: 60s)".to_string());
        }

        if self.max_frame < 1024 {
            errors.push("Ping max frame too small (minimum: 1 KB)".to_string());
        }

        errors
    }
}

/// Docker CLI configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Compose file name inside each instance directory
    pub compose_file: String,

    /// Location of the standalone docker binaries inside WSL2
    pub wsl2_docker_dir: String,

    /// Timeout for quick queries (ps, top, stats, logs)
    #[serde(with = "duration_serde")]
    pub query_timeout: Duration,

    /// Timeout for compose up/stop/down
    #[serde(with = "duration_serde")]
    pub long_timeout: Duration,

    /// Timeout for asset installers
    #[serde(with = "duration_serde")]
    pub install_timeout: Duration,

    /// SteamCMD executable
    pub steamcmd_path: String,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            compose_file: String::from("docker-compose.yml"),
            wsl2_docker_dir: String::from(WSL2_DOCKER_DIR),
            query_timeout: timeout::DOCKER_QUERY_TIMEOUT,
            long_timeout: timeout::DOCKER_LONG_TIMEOUT,
            install_timeout: timeout::INSTALL_TIMEOUT,
            steamcmd_path: String::from("steamcmd"),
        }
    }
}

impl DockerConfig {
    /// Validate docker configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.compose_file.is_empty() {
            errors.push("Compose file name cannot be empty".to_string());
        } else if self.compose_file.contains('/') || self.compose_file.contains('\\') {
            errors.push(format!(
                "Compose file must be a bare file name: '{}'",
                self.compose_file
            ));
        }

        if !self.wsl2_docker_dir.starts_with('/') {
            errors.push(format!(
                "WSL2 docker dir must be an absolute linux path: '{}'",
                self.wsl2_docker_dir
            ));
        }

        if self.query_timeout.as_secs() < 1 {
            errors.push("Docker query timeout too short (minimum: 1s)".to_string());
        }

        if self.long_timeout < self.query_timeout {
            errors.push("Docker long timeout cannot be shorter than the query timeout".to_string());
        }

        if self.steamcmd_path.is_empty() {
            errors.push("SteamCMD path cannot be empty".to_string());
        }

        errors
    }
}

/// Lifecycle policy configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How many liveness polls follow a graceful stop before escalating
    pub stop_poll_attempts: u32,

    /// Delay between liveness polls
    #[serde(with = "duration_serde")]
    pub stop_poll_interval: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            stop_poll_attempts: 30,
            stop_poll_interval: Duration::from_secs(1),
        }
    }
}

impl LifecycleConfig {
    /// Validate lifecycle configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.stop_poll_attempts > 600 {
            errors.push(format!(
                "Stop poll attempts too high: {} (maximum: 600)",
                self.stop_poll_attempts
            ));
        }

        if self.stop_poll_interval.as_millis() < 10 {
            errors.push("Stop poll interval too short (minimum: 10ms)".to_string());
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("gamectl"),
            log_level: Level::WARN,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
