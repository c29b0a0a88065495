//! Connection management module
//!
//! Manages client connections including:
//! - Connection lifecycle (creation, tracking, cleanup)
//! - Upgrade state machine (connecting -> upgraded -> closed)
//! - Per-connection outbound packet queue
//! - Thread-safe connection registry

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::error::{NetworkError, Result, StormhavenError};

/// Unique client identifier, assigned from a process-wide sequence
pub type ClientId = u64;

/// Maximum packets held in one connection's outbound queue between flushes
const MAX_QUEUED_PACKETS: usize = 256;

/// Connection state in the transport lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Initial state - awaiting the HTTP upgrade request
    Connecting,
    /// Handshake complete - decoding WebSocket frames
    Upgraded,
    /// Connection has been closed
    Closed,
}

impl ConnectionState {
    /// Check if the connection can receive decoded frames
    pub fn can_receive_frames(&self) -> bool {
        matches!(self, ConnectionState::Upgraded)
    }

    /// Check if the connection is still active
    pub fn is_active(&self) -> bool {
        !matches!(self, ConnectionState::Closed)
    }

    /// Get a human-readable name for the state
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "Connecting",
            ConnectionState::Upgraded => "Upgraded",
            ConnectionState::Closed => "Closed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A connected client
///
/// Owns the upgrade state and the outbound packet queue for one peer. The
/// socket itself lives in the connection's read-loop task; writes travel
/// through the `outbound_tx` channel so one slow peer never blocks another.
pub struct Connection {
    /// Unique client identifier
    pub id: ClientId,
    /// Remote address of the client
    pub address: SocketAddr,
    /// Current upgrade state
    state: RwLock<ConnectionState>,
    /// Queued outbound packets, insertion order preserved
    queue: Mutex<Vec<Vec<u8>>>,
    /// Wire writer channel (drained by the connection's writer task)
    outbound_tx: mpsc::Sender<Vec<u8>>,
    /// Time of connection creation
    pub created_at: Instant,
    /// Time of last activity
    last_activity: RwLock<Instant>,
}

impl Connection {
    /// Create a new connection
    pub fn new(id: ClientId, address: SocketAddr, outbound_tx: mpsc::Sender<Vec<u8>>) -> Self {
        let now = Instant::now();
        Self {
            id,
            address,
            state: RwLock::new(ConnectionState::Connecting),
            queue: Mutex::new(Vec::new()),
            outbound_tx,
            created_at: now,
            last_activity: RwLock::new(now),
        }
    }

    /// Get the IP address as a string (without port)
    pub fn ip(&self) -> String {
        self.address.ip().to_string()
    }

    /// Get the current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Set the connection state
    pub fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };
        debug!(
            client_id = self.id,
            old_state = %old_state,
            new_state = %new_state,
            "Connection state changed"
        );
    }

    /// Transition to a new state if currently in the expected state
    pub fn transition_state(&self, expected: ConnectionState, new_state: ConnectionState) -> bool {
        let mut state = self.state.write();
        if *state == expected {
            *state = new_state;
            true
        } else {
            false
        }
    }

    /// Check if the connection is active
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Check if the handshake has completed
    pub fn is_upgraded(&self) -> bool {
        self.state().can_receive_frames()
    }

    /// Update the last activity timestamp
    pub fn touch(&self) {
        *self.last_activity.write() = Instant::now();
    }

    /// Get the duration since last activity
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.read().elapsed()
    }

    /// Check if the connection has been idle too long
    pub fn is_idle(&self, max_idle: Duration) -> bool {
        self.idle_duration() > max_idle
    }

    /// Append a serialized packet to the outbound queue.
    ///
    /// Fails once the connection is closed so producers racing a disconnect
    /// never touch reclaimed resources.
    pub fn queue_packet(&self, packet: Vec<u8>) -> Result<()> {
        if !self.is_active() {
            return Err(StormhavenError::Network(NetworkError::ClientNotFound(
                self.id,
            )));
        }
        let mut queue = self.queue.lock();
        if queue.len() >= MAX_QUEUED_PACKETS {
            return Err(StormhavenError::Network(NetworkError::WriteBufferFull));
        }
        queue.push(packet);
        Ok(())
    }

    /// Take the full outbound queue, leaving it empty
    pub fn drain_queue(&self) -> Vec<Vec<u8>> {
        std::mem::take(&mut *self.queue.lock())
    }

    /// Number of packets currently queued
    pub fn queued_packets(&self) -> usize {
        self.queue.lock().len()
    }

    /// Hand bytes to the wire writer without blocking
    pub fn try_send(&self, data: Vec<u8>) -> Result<()> {
        self.outbound_tx.try_send(data).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                StormhavenError::Network(NetworkError::WriteBufferFull)
            }
            mpsc::error::TrySendError::Closed(_) => {
                StormhavenError::Network(NetworkError::ConnectionClosed)
            }
        })
    }

    /// Hand bytes to the wire writer, waiting for channel capacity
    pub async fn send(&self, data: Vec<u8>) -> Result<()> {
        self.outbound_tx
            .send(data)
            .await
            .map_err(|_| StormhavenError::Network(NetworkError::ConnectionClosed))
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("state", &self.state())
            .field("queued_packets", &self.queued_packets())
            .field("idle_duration", &self.idle_duration())
            .finish()
    }
}

/// Thread-safe connection registry
///
/// Injected into the outbound queue and scheduler rather than reached through
/// a global, so tests can stand up isolated registries.
pub struct ConnectionRegistry {
    /// Map of client ID to connection
    connections: DashMap<ClientId, Arc<Connection>>,
    /// Map of IP address to list of client IDs (for connection limiting)
    ip_index: DashMap<String, Vec<ClientId>>,
    /// Next client ID to assign
    next_id: AtomicU64,
    /// Maximum connections per IP
    max_per_ip: usize,
    /// Maximum idle time before disconnect
    max_idle: Duration,
}

impl ConnectionRegistry {
    /// Create a new registry with default limits
    pub fn new() -> Self {
        Self::with_limits(10, 300)
    }

    /// Create a registry with custom limits
    pub fn with_limits(max_per_ip: usize, max_idle_secs: u64) -> Self {
        Self {
            connections: DashMap::new(),
            ip_index: DashMap::new(),
            next_id: AtomicU64::new(1),
            max_per_ip,
            max_idle: Duration::from_secs(max_idle_secs),
        }
    }

    /// Register a new connection and assign it a client ID
    pub fn register(
        &self,
        address: SocketAddr,
        outbound_tx: mpsc::Sender<Vec<u8>>,
    ) -> Result<Arc<Connection>> {
        let ip = address.ip().to_string();

        // Check connection limit per IP
        let current_count = self.ip_index.get(&ip).map(|v| v.len()).unwrap_or(0);
        if current_count >= self.max_per_ip {
            warn!(
                ip = %ip,
                count = current_count,
                max = self.max_per_ip,
                "Connection limit exceeded for IP"
            );
            return Err(StormhavenError::Network(NetworkError::TooManyConnections(
                ip,
            )));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let connection = Arc::new(Connection::new(id, address, outbound_tx));

        self.connections.insert(id, connection.clone());
        self.ip_index.entry(ip).or_default().push(id);

        info!(
            client_id = id,
            address = %address,
            "Connection registered"
        );

        Ok(connection)
    }

    /// Get a connection by client ID
    pub fn lookup(&self, id: ClientId) -> Option<Arc<Connection>> {
        self.connections.get(&id).map(|r| r.clone())
    }

    /// Get every currently registered connection
    ///
    /// Iteration order is not meaningful.
    pub fn all(&self) -> Vec<Arc<Connection>> {
        self.connections.iter().map(|r| r.value().clone()).collect()
    }

    /// Remove a connection, closing it and discarding its queue
    pub fn remove(&self, id: ClientId) {
        if let Some((_, connection)) = self.connections.remove(&id) {
            connection.set_state(ConnectionState::Closed);
            let discarded = connection.drain_queue().len();

            let ip = connection.ip();
            if let Some(mut ids) = self.ip_index.get_mut(&ip) {
                ids.retain(|&cid| cid != id);
            }
            self.ip_index.retain(|_, v| !v.is_empty());

            info!(
                client_id = id,
                discarded_packets = discarded,
                "Connection removed"
            );
        }
    }

    /// Get the count of registered connections
    pub fn count(&self) -> usize {
        self.connections.len()
    }

    /// Remove connections that have been idle past the configured limit
    pub fn sweep_idle(&self) -> Vec<ClientId> {
        let mut removed = Vec::new();

        for connection in self.connections.iter() {
            if connection.is_idle(self.max_idle) && connection.is_active() {
                debug!(
                    client_id = connection.id,
                    idle_duration = ?connection.idle_duration(),
                    "Connection idle timeout"
                );
                removed.push(connection.id);
            }
        }

        for id in &removed {
            self.remove(*id);
        }

        removed
    }

    /// Close and remove every connection
    pub fn close_all(&self) {
        let ids: Vec<ClientId> = self.connections.iter().map(|r| *r.key()).collect();
        for id in ids {
            self.remove(id);
        }
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
