//! Application state module
//!
//! Contains the shared state used across all server connections.

use std::sync::Arc;

use tokio::sync::broadcast;

use crate::config::ServerConfig;
use crate::net::connection::ConnectionRegistry;

/// Application state shared across all connections
pub struct AppState {
    /// Server configuration
    pub config: ServerConfig,
    /// Registry of active client connections
    pub registry: Arc<ConnectionRegistry>,
    /// Shutdown signal sender
    pub shutdown_tx: broadcast::Sender<()>,
}

impl AppState {
    /// Create a new application state
    pub fn new(config: ServerConfig, shutdown_tx: broadcast::Sender<()>) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_limits(
            config.max_connections_per_ip,
            config.max_idle_secs,
        ));

        Self {
            config,
            registry,
            shutdown_tx,
        }
    }
}
