//! Stormhaven Game Server Library
//!
//! This library provides the network transport core for the Stormhaven game
//! server: WebSocket framing, the HTTP upgrade handshake, connection
//! management, and interval-batched outbound packet delivery.
//!
//! ## Modules
//!
//! - `config` - Server configuration management
//! - `error` - Error types and result definitions
//! - `net` - Framing, handshake, connections, and the outbound scheduler
//! - `protocol` - Packet serialization and packet senders

pub mod config;
pub mod error;
pub mod net;
pub mod protocol;
pub mod state;

// Re-export commonly used types
pub use config::ServerConfig;
pub use error::{Result, StormhavenError};
pub use state::AppState;

/// Server version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
