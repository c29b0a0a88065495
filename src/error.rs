//! Error handling module
//!
//! Defines custom error types for the Stormhaven server.

use std::io;

use thiserror::Error;

/// Main error type for the Stormhaven server
#[derive(Error, Debug)]
pub enum StormhavenError {
    /// Network-related errors
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// WebSocket protocol errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Upgrade handshake errors
    #[error("Handshake rejected: {0}")]
    Handshake(#[from] HandshakeError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Network-specific errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Client not found: {0}")]
    ClientNotFound(u64),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timeout")]
    Timeout,

    #[error("Too many connections from {0}")]
    TooManyConnections(String),

    #[error("Write buffer full")]
    WriteBufferFull,

    #[error("Read error: {0}")]
    ReadError(String),

    #[error("Write error: {0}")]
    WriteError(String),
}

/// WebSocket framing errors
///
/// A violation closes the offending connection; it is never fatal to the
/// process or to other connections.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Reserved bits set in frame header")]
    ReservedBitsSet,

    #[error("Client frame claims to be unmasked")]
    UnmaskedClientFrame,

    #[error("Truncated frame: need {needed} bytes, have {available}")]
    TruncatedFrame { needed: usize, available: usize },

    #[error("Invalid opcode: {0:#x}")]
    InvalidOpcode(u8),

    #[error("Fragmented frame (continuation not supported)")]
    FragmentedFrame,

    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: u64, max: usize },

    #[error("Byte range out of bounds: end {end}, buffer length {len}")]
    OutOfRange { end: usize, len: usize },

    #[error("Malformed binary string: {0}")]
    MalformedBinaryString(String),
}

/// Upgrade handshake failures
///
/// The connection is closed without being marked upgraded; the client must
/// reconnect with a valid request.
#[derive(Error, Debug)]
pub enum HandshakeError {
    #[error("Request is not an HTTP GET")]
    NotHttpGet,

    #[error("Missing Sec-WebSocket-Key header")]
    MissingKey,

    #[error("Malformed upgrade request: {0}")]
    MalformedRequest(String),
}

/// Result type alias for Stormhaven operations
pub type Result<T> = std::result::Result<T, StormhavenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NetworkError::ClientNotFound(42);
        assert_eq!(err.to_string(), "Client not found: 42");

        let err = NetworkError::ConnectionClosed;
        assert_eq!(err.to_string(), "Connection closed");

        let err = ProtocolError::TruncatedFrame {
            needed: 10,
            available: 4,
        };
        assert_eq!(err.to_string(), "Truncated frame: need 10 bytes, have 4");

        let err = HandshakeError::MissingKey;
        assert_eq!(err.to_string(), "Missing Sec-WebSocket-Key header");
    }

    #[test]
    fn test_error_conversion() {
        let err: StormhavenError = NetworkError::ConnectionClosed.into();
        assert!(matches!(
            err,
            StormhavenError::Network(NetworkError::ConnectionClosed)
        ));

        let err: StormhavenError = ProtocolError::ReservedBitsSet.into();
        assert_eq!(
            err.to_string(),
            "Protocol error: Reserved bits set in frame header"
        );

        let err: StormhavenError = HandshakeError::NotHttpGet.into();
        assert_eq!(err.to_string(), "Handshake rejected: Request is not an HTTP GET");
    }
}
