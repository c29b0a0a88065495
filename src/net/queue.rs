//! Outbound packet queue and flush scheduler
//!
//! Game-logic packet senders enqueue serialized packets under a client ID;
//! every flush interval the scheduler instructs each active connection to
//! transmit its full queue as one WebSocket frame. The scheduler is an owned
//! object with an injectable interval and an explicit `tick`, so tests drive
//! it deterministically without wall-clock dependence.

use std::sync::Arc;
use std::time::Duration;

use tracing::{trace, warn};

use crate::error::{NetworkError, Result, StormhavenError};
use crate::net::connection::{ClientId, ConnectionRegistry};
use crate::net::frame::{Frame, Opcode};

/// Default communication interval (0.1s)
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(100);

/// Queue API exposed to packet senders
pub struct PacketQueue {
    registry: Arc<ConnectionRegistry>,
}

impl PacketQueue {
    /// Create a queue handle over a connection registry
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Add a serialized packet to a client's outgoing queue.
    ///
    /// An unknown or disconnected client yields `ClientNotFound`; the packet
    /// is dropped and the failure logged. Never fatal to the caller, and
    /// other clients' queues are unaffected.
    pub fn enqueue(&self, client_id: ClientId, packet: Vec<u8>) -> Result<()> {
        let Some(connection) = self.registry.lookup(client_id) else {
            warn!(client_id, "Client not found, dropping queued packet");
            return Err(StormhavenError::Network(NetworkError::ClientNotFound(
                client_id,
            )));
        };

        connection.queue_packet(packet)
    }
}

/// Interval-driven scheduler that flushes every client's outbound queue
pub struct OutboundScheduler {
    registry: Arc<ConnectionRegistry>,
    /// Configured flush interval
    interval: Duration,
    /// Remaining countdown until the next flush
    remaining: Duration,
}

impl OutboundScheduler {
    /// Create a scheduler with the given flush interval
    pub fn new(registry: Arc<ConnectionRegistry>, interval: Duration) -> Self {
        Self {
            registry,
            interval,
            remaining: interval,
        }
    }

    /// Create a scheduler with the default communication interval
    pub fn with_default_interval(registry: Arc<ConnectionRegistry>) -> Self {
        Self::new(registry, DEFAULT_FLUSH_INTERVAL)
    }

    /// Get the configured flush interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Advance the countdown by `delta`; flush when it crosses zero.
    ///
    /// `transmit = false` suppresses wire writes while still draining queues
    /// and resetting the interval (offline/debug mode). Performs no I/O
    /// itself beyond handing frames to per-connection writer channels.
    pub fn tick(&mut self, delta: Duration, transmit: bool) {
        self.remaining = self.remaining.saturating_sub(delta);
        if self.remaining.is_zero() {
            self.flush(transmit);
            self.remaining = self.interval;
        }
    }

    /// Transmit every active connection's queued packets in one frame each.
    ///
    /// Connections with an empty queue are still visited (a cheap no-op) to
    /// keep iteration uniform. One client's failure never aborts the loop.
    pub fn flush(&self, transmit: bool) {
        for connection in self.registry.all() {
            let packets = connection.drain_queue();
            if packets.is_empty() {
                continue;
            }

            if !transmit {
                trace!(
                    client_id = connection.id,
                    packets = packets.len(),
                    "Transmission suppressed, queue drained"
                );
                continue;
            }

            let payload = assemble_transmission(&packets);
            let frame = Frame::encode(Opcode::Binary, &payload);

            // Writer channels are independent; a full or closed channel on
            // one client must not stall the others
            match connection.try_send(frame) {
                Ok(()) => trace!(
                    client_id = connection.id,
                    packets = packets.len(),
                    bytes = payload.len(),
                    "Flushed packet queue"
                ),
                Err(e) => warn!(
                    client_id = connection.id,
                    error = %e,
                    "Failed to transmit packet queue"
                ),
            }
        }
    }
}

/// Concatenate queued packets into one transmission payload.
///
/// Each packet travels length-prefixed (u16, big-endian) so the client can
/// split the batch back into individual packets.
fn assemble_transmission(packets: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = packets.iter().map(|p| p.len() + 2).sum();
    let mut payload = Vec::with_capacity(total);

    for packet in packets {
        if packet.len() > u16::MAX as usize {
            warn!(size = packet.len(), "Dropping oversized packet from batch");
            continue;
        }
        payload.extend_from_slice(&(packet.len() as u16).to_be_bytes());
        payload.extend_from_slice(packet);
    }

    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::sync::mpsc;

    fn test_address(port: u16) -> SocketAddr {
        format!("127.0.0.1:{port}").parse().unwrap()
    }

    /// Split a server binary frame produced by flush back into packets
    fn parse_transmission(frame: &[u8]) -> Vec<Vec<u8>> {
        assert_eq!(frame[0], 0x82, "expected a fin+binary server frame");
        let (len, mut pos) = match frame[1] {
            126 => (u16::from_be_bytes([frame[2], frame[3]]) as usize, 4),
            127 => panic!("unexpected 64-bit length in test"),
            n => {
                assert_eq!(n & 0x80, 0, "server frames are unmasked");
                (n as usize, 2)
            }
        };
        assert_eq!(frame.len(), pos + len);

        let mut packets = Vec::new();
        while pos < frame.len() {
            let size = u16::from_be_bytes([frame[pos], frame[pos + 1]]) as usize;
            pos += 2;
            packets.push(frame[pos..pos + size].to_vec());
            pos += size;
        }
        packets
    }

    #[test]
    fn test_flush_on_interval_boundary_in_order() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let connection = registry.register(test_address(1000), tx).unwrap();

        let queue = PacketQueue::new(registry.clone());
        let mut scheduler = OutboundScheduler::new(registry, Duration::from_millis(100));

        queue.enqueue(connection.id, vec![1, 1]).unwrap();
        queue.enqueue(connection.id, vec![2, 2]).unwrap();
        queue.enqueue(connection.id, vec![3, 3]).unwrap();

        // Before the boundary: no transmission
        scheduler.tick(Duration::from_millis(50), true);
        assert!(rx.try_recv().is_err());
        assert_eq!(connection.queued_packets(), 3);

        // Crossing the boundary flushes P1, P2, P3 in order and empties the queue
        scheduler.tick(Duration::from_millis(60), true);
        let frame = rx.try_recv().unwrap();
        assert_eq!(
            parse_transmission(&frame),
            vec![vec![1, 1], vec![2, 2], vec![3, 3]]
        );
        assert_eq!(connection.queued_packets(), 0);

        // The countdown was reset; the next tick before the boundary is silent
        scheduler.tick(Duration::from_millis(50), true);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_countdown_resets_after_flush() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let connection = registry.register(test_address(1001), tx).unwrap();

        let queue = PacketQueue::new(registry.clone());
        let mut scheduler = OutboundScheduler::new(registry, Duration::from_millis(100));

        queue.enqueue(connection.id, vec![1]).unwrap();
        scheduler.tick(Duration::from_millis(150), true);
        assert!(rx.try_recv().is_ok());

        queue.enqueue(connection.id, vec![2]).unwrap();
        scheduler.tick(Duration::from_millis(100), true);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_enqueue_unknown_client() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, _rx) = mpsc::channel(8);
        let connection = registry.register(test_address(1002), tx).unwrap();

        let queue = PacketQueue::new(registry);
        queue.enqueue(connection.id, vec![7]).unwrap();

        let err = queue.enqueue(9999, vec![1, 2, 3]).unwrap_err();
        assert!(matches!(
            err,
            StormhavenError::Network(NetworkError::ClientNotFound(9999))
        ));

        // Other clients' queues are unaffected
        assert_eq!(connection.queued_packets(), 1);
    }

    #[test]
    fn test_suppressed_transmission_still_drains() {
        let registry = Arc::new(ConnectionRegistry::new());
        let (tx, mut rx) = mpsc::channel(8);
        let connection = registry.register(test_address(1003), tx).unwrap();

        let queue = PacketQueue::new(registry.clone());
        let mut scheduler = OutboundScheduler::new(registry, Duration::from_millis(100));

        queue.enqueue(connection.id, vec![1]).unwrap();
        scheduler.tick(Duration::from_millis(100), false);

        assert!(rx.try_recv().is_err(), "no wire write in offline mode");
        assert_eq!(connection.queued_packets(), 0, "queue still drained");
    }

    #[test]
    fn test_one_client_failure_does_not_abort_flush() {
        let registry = Arc::new(ConnectionRegistry::new());

        // First connection's writer is gone: its channel is closed
        let (dead_tx, dead_rx) = mpsc::channel(8);
        drop(dead_rx);
        let dead = registry.register(test_address(1004), dead_tx).unwrap();

        let (tx, mut rx) = mpsc::channel(8);
        let live = registry.register(test_address(1005), tx).unwrap();

        let queue = PacketQueue::new(registry.clone());
        queue.enqueue(dead.id, vec![1]).unwrap();
        queue.enqueue(live.id, vec![2]).unwrap();

        let scheduler = OutboundScheduler::new(registry, Duration::from_millis(100));
        scheduler.flush(true);

        // The live client still received its batch
        let frame = rx.try_recv().unwrap();
        assert_eq!(parse_transmission(&frame), vec![vec![2]]);
    }

    #[test]
    fn test_assemble_transmission_layout() {
        let payload = assemble_transmission(&[vec![0xAA], vec![0xBB, 0xCC]]);
        assert_eq!(payload, vec![0, 1, 0xAA, 0, 2, 0xBB, 0xCC]);
    }
}
