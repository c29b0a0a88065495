//! Networking module
//!
//! This module handles all network-related functionality for the Stormhaven server:
//! - WebSocket framing (bit-level decode, XOR unmasking)
//! - HTTP upgrade handshake
//! - Connection lifecycle and registry
//! - Outbound packet queueing and interval-based flushing

pub mod codec;
pub mod connection;
pub mod frame;
pub mod handler;
pub mod handshake;
pub mod queue;
