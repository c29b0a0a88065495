//! Protocol module
//!
//! This module contains the application packet layer for the Stormhaven server:
//! - Packet serialization (type tag plus typed fields in fixed order)
//! - Packet senders that queue replies for delivery on the next flush

pub mod packet;
pub mod senders;
