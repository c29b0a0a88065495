//! Server configuration module
//!
//! Handles loading and parsing of server configuration from files and environment variables.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Path to the configuration file
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Server name displayed in logs
    #[serde(default = "default_server_name")]
    pub server_name: String,

    /// WebSocket port for browser clients
    #[serde(default = "default_websocket_port")]
    pub websocket_port: u16,

    /// Outbound queue flush interval in milliseconds
    #[serde(default = "default_flush_interval")]
    pub flush_interval_ms: u64,

    /// Maximum simultaneous connections per IP
    #[serde(default = "default_max_per_ip")]
    pub max_connections_per_ip: usize,

    /// Maximum idle time in seconds before a connection is dropped
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,

    /// Socket read buffer size in bytes
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Suppress wire writes during scheduler flushes (offline/debug mode)
    #[serde(default)]
    pub offline_mode: bool,

    /// Development mode flag
    #[serde(default)]
    pub dev_mode: bool,

    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
}

// Default value functions
fn default_server_name() -> String {
    "Stormhaven".to_string()
}

fn default_websocket_port() -> u16 {
    5500
}

fn default_flush_interval() -> u64 {
    100 // 0.1s communication interval
}

fn default_max_per_ip() -> usize {
    10
}

fn default_max_idle() -> u64 {
    300 // 5 minutes
}

fn default_read_buffer_size() -> usize {
    4096
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_path: PathBuf::from("config/server.toml"),
            server_name: default_server_name(),
            websocket_port: default_websocket_port(),
            flush_interval_ms: default_flush_interval(),
            max_connections_per_ip: default_max_per_ip(),
            max_idle_secs: default_max_idle(),
            read_buffer_size: default_read_buffer_size(),
            offline_mode: false,
            dev_mode: false,
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and environment variables
    pub async fn load() -> Result<Self> {
        // Determine config path from environment or use default
        let config_path = env::var("STORMHAVEN_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/server.toml"));

        // Try to load from file
        let mut config = if config_path.exists() {
            let content = tokio::fs::read_to_string(&config_path)
                .await
                .with_context(|| {
                    format!("Failed to read config file: {}", config_path.display())
                })?;

            toml::from_str(&content).with_context(|| {
                format!("Failed to parse config file: {}", config_path.display())
            })?
        } else {
            tracing::warn!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            Self::default()
        };

        config.config_path = config_path;

        // Override with environment variables
        config.apply_env_overrides();

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("STORMHAVEN_SERVER_NAME") {
            self.server_name = val;
        }
        if let Ok(val) = env::var("STORMHAVEN_WEBSOCKET_PORT") {
            if let Ok(port) = val.parse() {
                self.websocket_port = port;
            }
        }
        if let Ok(val) = env::var("STORMHAVEN_FLUSH_INTERVAL_MS") {
            if let Ok(interval) = val.parse() {
                self.flush_interval_ms = interval;
            }
        }
        if let Ok(val) = env::var("STORMHAVEN_MAX_CONNECTIONS_PER_IP") {
            if let Ok(max) = val.parse() {
                self.max_connections_per_ip = max;
            }
        }
        if let Ok(val) = env::var("STORMHAVEN_MAX_IDLE_SECS") {
            if let Ok(secs) = val.parse() {
                self.max_idle_secs = secs;
            }
        }
        if let Ok(val) = env::var("STORMHAVEN_READ_BUFFER_SIZE") {
            if let Ok(size) = val.parse() {
                self.read_buffer_size = size;
            }
        }
        if let Ok(val) = env::var("STORMHAVEN_OFFLINE_MODE") {
            self.offline_mode = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("STORMHAVEN_DEV_MODE") {
            self.dev_mode = val.to_lowercase() == "true" || val == "1";
        }
        if let Ok(val) = env::var("STORMHAVEN_DEBUG") {
            self.debug = val.to_lowercase() == "true" || val == "1";
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.websocket_port == 0 {
            anyhow::bail!("WebSocket port must be non-zero");
        }

        // Flush interval must be reasonable
        if self.flush_interval_ms < 10 || self.flush_interval_ms > 5000 {
            anyhow::bail!("Flush interval must be between 10ms and 5000ms");
        }

        if self.max_connections_per_ip == 0 {
            anyhow::bail!("Max connections per IP must be at least 1");
        }

        // Read buffer must hold at least a frame header
        if self.read_buffer_size < 512 || self.read_buffer_size > 65536 {
            anyhow::bail!("Read buffer size must be between 512 and 65536 bytes");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.server_name, "Stormhaven");
        assert_eq!(config.websocket_port, 5500);
        assert_eq!(config.flush_interval_ms, 100);
        assert_eq!(config.max_connections_per_ip, 10);
        assert_eq!(config.max_idle_secs, 300);
        assert_eq!(config.read_buffer_size, 4096);
        assert!(!config.offline_mode);
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig::default();

        // Valid config should pass
        assert!(config.validate().is_ok());

        // Invalid port
        config.websocket_port = 0;
        assert!(config.validate().is_err());
        config.websocket_port = 5500;

        // Flush interval out of range
        config.flush_interval_ms = 5;
        assert!(config.validate().is_err());
        config.flush_interval_ms = 100;

        // Read buffer too small
        config.read_buffer_size = 16;
        assert!(config.validate().is_err());
    }
}
