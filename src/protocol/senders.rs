//! Account management packet senders
//!
//! Formats and queues outgoing packets for clients that are logging into or
//! creating accounts. Each sender serializes a typed payload and adds it to
//! the target client's outgoing queue; delivery happens on the next flush
//! interval. An unknown client simply drops the packet (logged, never fatal).
//!
//! The reply data (success flags, character summaries) is produced by the
//! account services upstream; these senders only define the wire layout.

use tracing::{debug, warn};

use crate::net::connection::ClientId;
use crate::net::queue::PacketQueue;
use crate::protocol::packet::{PacketWriter, Quaternion, ServerPacketType, Vector3};

/// One character entry in a character data reply
#[derive(Debug, Clone)]
pub struct CharacterSummary {
    /// Character display name
    pub name: String,
    /// Last saved world position
    pub position: Vector3,
    /// Last saved facing rotation
    pub rotation: Quaternion,
    /// Saved camera zoom level
    pub camera_zoom: f32,
    /// Saved camera X axis rotation
    pub camera_x_rotation: f32,
    /// Saved camera Y axis rotation
    pub camera_y_rotation: f32,
}

/// Reply to a client's account login request
pub fn send_account_login_reply(
    queue: &PacketQueue,
    client_id: ClientId,
    success: bool,
    reply_message: &str,
) {
    debug!(client_id, success, "Queueing account login reply");

    let mut packet = PacketWriter::with_capacity(64);
    packet.write_type(ServerPacketType::AccountLoginReply);
    packet.write_bool(success);
    packet.write_string(reply_message);

    deliver(queue, client_id, packet);
}

/// Reply to a client's account registration request
pub fn send_account_registration_reply(
    queue: &PacketQueue,
    client_id: ClientId,
    success: bool,
    reply_message: &str,
) {
    debug!(client_id, success, "Queueing account registration reply");

    let mut packet = PacketWriter::with_capacity(64);
    packet.write_type(ServerPacketType::AccountRegistrationReply);
    packet.write_bool(success);
    packet.write_string(reply_message);

    deliver(queue, client_id, packet);
}

/// Send a client the list of characters created under their account
pub fn send_character_data_reply(
    queue: &PacketQueue,
    client_id: ClientId,
    characters: &[CharacterSummary],
) {
    debug!(
        client_id,
        count = characters.len(),
        "Queueing character data reply"
    );

    let mut packet = PacketWriter::with_capacity(64 + characters.len() * 48);
    packet.write_type(ServerPacketType::CharacterDataReply);
    packet.write_int(characters.len() as i32);

    for character in characters {
        packet.write_string(&character.name);
        packet.write_vector3(character.position);
        packet.write_quaternion(character.rotation);
        packet.write_float(character.camera_zoom);
        packet.write_float(character.camera_x_rotation);
        packet.write_float(character.camera_y_rotation);
    }

    deliver(queue, client_id, packet);
}

/// Reply to a client's character creation request
pub fn send_character_creation_reply(
    queue: &PacketQueue,
    client_id: ClientId,
    success: bool,
    reply_message: &str,
) {
    debug!(client_id, success, "Queueing character creation reply");

    let mut packet = PacketWriter::with_capacity(64);
    packet.write_type(ServerPacketType::CharacterCreationReply);
    packet.write_bool(success);
    packet.write_string(reply_message);

    deliver(queue, client_id, packet);
}

/// Enqueue a finished packet, dropping it if the client is gone
fn deliver(queue: &PacketQueue, client_id: ClientId, packet: PacketWriter) {
    if let Err(e) = queue.enqueue(client_id, packet.into_bytes()) {
        warn!(client_id, error = %e, "Dropped outgoing packet");
    }
}
