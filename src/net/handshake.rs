//! HTTP to WebSocket upgrade handshake
//!
//! Validates the opening HTTP GET request from a browser client, computes the
//! `Sec-WebSocket-Accept` digest, and emits the `101 Switching Protocols`
//! response. The response byte layout is part of the wire contract and must
//! match byte-for-byte for client compatibility.
//!
//! A connection is only marked upgraded after a valid response has been
//! produced; a malformed request closes the connection instead.

use base64::prelude::*;
use sha1::{Digest, Sha1};

use crate::error::{HandshakeError, Result, StormhavenError};

/// Magic GUID appended to the client key before hashing (RFC 6455 §1.3)
const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const EOL: &str = "\r\n";

/// Parsed upgrade request
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Value of the Sec-WebSocket-Key header, trimmed
    pub key: String,
}

/// Parse the first read of a new connection as an HTTP upgrade request.
pub fn parse_upgrade_request(data: &[u8]) -> Result<UpgradeRequest> {
    let text = std::str::from_utf8(data).map_err(|_| {
        StormhavenError::Handshake(HandshakeError::MalformedRequest(
            "request is not valid UTF-8".to_string(),
        ))
    })?;

    if !text.starts_with("GET") {
        return Err(StormhavenError::Handshake(HandshakeError::NotHttpGet));
    }

    // Header names are case-insensitive per HTTP
    let key = text
        .lines()
        .find_map(|line| {
            let (name, value) = line.split_once(':')?;
            if name.trim().eq_ignore_ascii_case("Sec-WebSocket-Key") {
                Some(value.trim().to_string())
            } else {
                None
            }
        })
        .ok_or(StormhavenError::Handshake(HandshakeError::MissingKey))?;

    if key.is_empty() {
        return Err(StormhavenError::Handshake(HandshakeError::MissingKey));
    }

    Ok(UpgradeRequest { key })
}

/// Compute the accept digest: base64(SHA-1(key + GUID)).
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}

/// Build the exact 101 Switching Protocols response bytes.
pub fn build_upgrade_response(accept: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols{EOL}\
         Connection: Upgrade{EOL}\
         Upgrade: websocket{EOL}\
         Sec-WebSocket-Accept: {accept}{EOL}{EOL}"
    )
    .into_bytes()
}

/// Validate an upgrade request and produce the response to send.
pub fn respond_to(data: &[u8]) -> Result<Vec<u8>> {
    let request = parse_upgrade_request(data)?;
    let accept = compute_accept_key(&request.key);
    Ok(build_upgrade_response(&accept))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> Vec<u8> {
        b"GET /chat HTTP/1.1\r\n\
          Host: server.example.com\r\n\
          Upgrade: websocket\r\n\
          Connection: Upgrade\r\n\
          Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
          Sec-WebSocket-Version: 13\r\n\r\n"
            .to_vec()
    }

    #[test]
    fn test_rfc6455_worked_example() {
        // The accept value for the RFC sample key must reproduce exactly
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_parse_extracts_key() {
        let request = parse_upgrade_request(&sample_request()).unwrap();
        assert_eq!(request.key, "dGhlIHNhbXBsZSBub25jZQ==");
    }

    #[test]
    fn test_parse_case_insensitive_header() {
        let data = b"GET / HTTP/1.1\r\nsec-websocket-key: abc123==\r\n\r\n";
        let request = parse_upgrade_request(data).unwrap();
        assert_eq!(request.key, "abc123==");
    }

    #[test]
    fn test_non_get_rejected() {
        let err = parse_upgrade_request(b"POST / HTTP/1.1\r\n\r\n").unwrap_err();
        assert!(matches!(
            err,
            StormhavenError::Handshake(HandshakeError::NotHttpGet)
        ));
    }

    #[test]
    fn test_missing_key_rejected() {
        let err = parse_upgrade_request(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").unwrap_err();
        assert!(matches!(
            err,
            StormhavenError::Handshake(HandshakeError::MissingKey)
        ));
    }

    #[test]
    fn test_binary_garbage_rejected() {
        let err = parse_upgrade_request(&[0x82, 0xff, 0x00, 0x13]).unwrap_err();
        assert!(matches!(
            err,
            StormhavenError::Handshake(HandshakeError::MalformedRequest(_))
        ));
    }

    #[test]
    fn test_response_byte_layout() {
        let response = respond_to(&sample_request()).unwrap();
        let expected = "HTTP/1.1 101 Switching Protocols\r\n\
                        Connection: Upgrade\r\n\
                        Upgrade: websocket\r\n\
                        Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n\r\n";
        assert_eq!(response, expected.as_bytes());
    }
}
