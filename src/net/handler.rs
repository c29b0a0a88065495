//! Connection handler module
//!
//! Handles the lifecycle of client connections including:
//! - HTTP to WebSocket upgrade on first contact
//! - Frame decoding once upgraded
//! - Control frame handling (close/ping/pong)
//! - Routing decoded payloads to application dispatch
//! - Graceful disconnection
//!
//! Each connection runs one read-loop task with exactly one outstanding read,
//! and one writer task draining the connection's outbound channel. A decode
//! or I/O failure closes that connection only.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::error::{NetworkError, ProtocolError, Result, StormhavenError};
use crate::net::connection::{ClientId, Connection, ConnectionState};
use crate::net::frame::{Frame, Opcode};
use crate::net::handshake;
use crate::state::AppState;

/// Capacity of the per-connection wire writer channel
const WRITER_CHANNEL_CAPACITY: usize = 64;

/// A decoded application payload, handed to higher-level packet dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// The originating client
    pub client_id: ClientId,
    /// Payload decoded per the frame opcode
    pub payload: InboundPayload,
}

/// Payload decoded as text or binary per the frame opcode
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPayload {
    /// UTF-8 text frame contents
    Text(String),
    /// Raw binary frame contents
    Binary(Vec<u8>),
}

/// Connection handler for processing WebSocket clients
pub struct ConnectionHandler {
    /// Shared application state
    state: Arc<AppState>,
    /// Channel to higher-level packet dispatch
    dispatch_tx: mpsc::Sender<InboundMessage>,
}

impl ConnectionHandler {
    /// Create a new connection handler
    pub fn new(state: Arc<AppState>, dispatch_tx: mpsc::Sender<InboundMessage>) -> Self {
        Self { state, dispatch_tx }
    }

    /// Handle an accepted socket for its whole lifetime
    pub async fn handle(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        debug!(address = %addr, "Handling connection");

        stream.set_nodelay(true)?;

        let (outbound_tx, outbound_rx) = mpsc::channel(WRITER_CHANNEL_CAPACITY);
        let connection = self.state.registry.register(addr, outbound_tx)?;
        let client_id = connection.id;

        let (read_half, write_half) = stream.into_split();

        // Writer task: wire transmissions for this client are independent of
        // every other client's writes
        tokio::spawn(run_writer(write_half, outbound_rx, client_id));

        let result = self.read_loop(read_half, connection).await;

        debug!(client_id, "Connection handler ending");
        self.state.registry.remove(client_id);

        result
    }

    /// Read-loop state machine: one outstanding read at a time, each
    /// completed buffer processed before the next read is issued
    async fn read_loop(&self, mut read_half: OwnedReadHalf, connection: Arc<Connection>) -> Result<()> {
        let mut buffer = vec![0u8; self.state.config.read_buffer_size];

        loop {
            let n = read_half
                .read(&mut buffer)
                .await
                .map_err(|e| StormhavenError::Network(NetworkError::ReadError(e.to_string())))?;

            if n == 0 {
                debug!(client_id = connection.id, "Peer closed the connection");
                return Ok(());
            }

            connection.touch();

            match connection.state() {
                ConnectionState::Connecting => {
                    self.handle_upgrade(&connection, &buffer[..n]).await?;
                }
                ConnectionState::Upgraded => {
                    if !self.handle_frame(&connection, &buffer[..n]).await? {
                        return Ok(());
                    }
                }
                ConnectionState::Closed => {
                    debug!(client_id = connection.id, "Connection no longer active");
                    return Ok(());
                }
            }
        }
    }

    /// Validate the upgrade request and complete the handshake.
    ///
    /// The connection is only marked upgraded once a valid response has been
    /// queued for transmission; a rejected handshake closes the connection.
    async fn handle_upgrade(&self, connection: &Connection, data: &[u8]) -> Result<()> {
        let response = match handshake::respond_to(data) {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    client_id = connection.id,
                    error = %e,
                    "Upgrade request rejected"
                );
                return Err(e);
            }
        };

        connection.send(response).await?;
        connection.transition_state(ConnectionState::Connecting, ConnectionState::Upgraded);

        info!(
            client_id = connection.id,
            address = %connection.address,
            "Connection upgraded to WebSocket"
        );
        Ok(())
    }

    /// Decode one frame and route it.
    ///
    /// Returns `false` when the client requested a close; protocol violations
    /// surface as errors and close the connection.
    async fn handle_frame(&self, connection: &Connection, data: &[u8]) -> Result<bool> {
        let frame = Frame::decode(data)?;

        trace!(
            client_id = connection.id,
            opcode = %frame.opcode,
            payload_len = frame.payload.len(),
            "Decoded frame"
        );

        // Fragmented messages are not reassembled; a non-final frame or a
        // continuation cannot be routed
        if !frame.fin || frame.opcode == Opcode::Continuation {
            return Err(StormhavenError::Protocol(ProtocolError::FragmentedFrame));
        }

        match frame.opcode {
            Opcode::Ping => {
                trace!(client_id = connection.id, "Answering ping with pong");
                connection
                    .send(Frame::encode(Opcode::Pong, &frame.payload))
                    .await?;
                Ok(true)
            }
            Opcode::Pong => Ok(true),
            Opcode::Close => {
                debug!(client_id = connection.id, "Close frame received");
                // Echo the close payload back; the peer may already be gone
                let _ = connection
                    .send(Frame::encode(Opcode::Close, &frame.payload))
                    .await;
                Ok(false)
            }
            Opcode::Text => {
                let text = String::from_utf8_lossy(&frame.payload).into_owned();
                self.dispatch(connection.id, InboundPayload::Text(text)).await;
                Ok(true)
            }
            Opcode::Binary => {
                self.dispatch(connection.id, InboundPayload::Binary(frame.payload))
                    .await;
                Ok(true)
            }
            Opcode::Continuation => unreachable!("continuation rejected above"),
        }
    }

    /// Hand a decoded payload to application dispatch
    async fn dispatch(&self, client_id: ClientId, payload: InboundPayload) {
        let message = InboundMessage { client_id, payload };
        if self.dispatch_tx.send(message).await.is_err() {
            warn!(client_id, "Dispatch channel closed, dropping inbound payload");
        }
    }
}

/// Drain a connection's outbound channel onto the socket.
///
/// Ends when the channel closes (connection removed) or a write fails.
async fn run_writer(
    mut write_half: OwnedWriteHalf,
    mut outbound_rx: mpsc::Receiver<Vec<u8>>,
    client_id: ClientId,
) {
    while let Some(data) = outbound_rx.recv().await {
        if let Err(e) = write_half.write_all(&data).await {
            warn!(client_id, error = %e, "Socket write failed");
            break;
        }
    }

    let _ = write_half.shutdown().await;
    trace!(client_id, "Writer task ended");
}
