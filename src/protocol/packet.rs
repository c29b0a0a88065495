//! Packet serialization module
//!
//! Defines the wire layout packet senders use when building outgoing packets:
//! a leading type tag followed by typed fields written in a fixed order
//! (boolean, string, integer, float, 3-vector, quaternion). The transport
//! treats the resulting byte sequence as opaque and transmits it unmodified.

use bytes::{BufMut, BytesMut};

/// Outgoing packet type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ServerPacketType {
    /// Reply to an account login request
    AccountLoginReply = 1,
    /// Reply to a new account registration request
    AccountRegistrationReply = 2,
    /// List of characters on the client's account
    CharacterDataReply = 3,
    /// Reply to a character creation request
    CharacterCreationReply = 4,
}

impl ServerPacketType {
    /// Convert an i32 tag to a packet type
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::AccountLoginReply),
            2 => Some(Self::AccountRegistrationReply),
            3 => Some(Self::CharacterDataReply),
            4 => Some(Self::CharacterCreationReply),
            _ => None,
        }
    }

    /// Get the tag value
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the name of this packet type
    pub fn name(&self) -> &'static str {
        match self {
            Self::AccountLoginReply => "AccountLoginReply",
            Self::AccountRegistrationReply => "AccountRegistrationReply",
            Self::CharacterDataReply => "CharacterDataReply",
            Self::CharacterCreationReply => "CharacterCreationReply",
        }
    }
}

impl std::fmt::Display for ServerPacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.as_i32())
    }
}

/// A 3-component vector (world position)
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// A rotation quaternion
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub fn identity() -> Self {
        Self::new(0.0, 0.0, 0.0, 1.0)
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::identity()
    }
}

/// Writer for building outgoing packet payloads
#[derive(Debug, Clone, Default)]
pub struct PacketWriter {
    data: BytesMut,
}

impl PacketWriter {
    /// Create an empty packet writer
    pub fn new() -> Self {
        Self {
            data: BytesMut::new(),
        }
    }

    /// Create a packet writer with a specific capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: BytesMut::with_capacity(capacity),
        }
    }

    /// Get the current payload length
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the payload is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Write the leading packet type tag
    pub fn write_type(&mut self, packet_type: ServerPacketType) {
        self.data.put_i32(packet_type.as_i32());
    }

    /// Write a boolean (1 byte)
    pub fn write_bool(&mut self, value: bool) {
        self.data.put_u8(value as u8);
    }

    /// Write a UTF-8 string with a big-endian u16 length prefix
    pub fn write_string(&mut self, value: &str) {
        debug_assert!(value.len() <= u16::MAX as usize, "string too long for prefix");
        self.data.put_u16(value.len() as u16);
        self.data.extend_from_slice(value.as_bytes());
    }

    /// Write a signed big-endian int (4 bytes)
    pub fn write_int(&mut self, value: i32) {
        self.data.put_i32(value);
    }

    /// Write a big-endian float (4 bytes)
    pub fn write_float(&mut self, value: f32) {
        self.data.put_f32(value);
    }

    /// Write a 3-vector (3 x 4 bytes)
    pub fn write_vector3(&mut self, value: Vector3) {
        self.write_float(value.x);
        self.write_float(value.y);
        self.write_float(value.z);
    }

    /// Write a quaternion (4 x 4 bytes)
    pub fn write_quaternion(&mut self, value: Quaternion) {
        self.write_float(value.x);
        self.write_float(value.y);
        self.write_float(value.z);
        self.write_float(value.w);
    }

    /// Finish and take the serialized payload
    pub fn into_bytes(self) -> Vec<u8> {
        self.data.to_vec()
    }
}

/// Reader mirroring [`PacketWriter`] field order
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    /// Create a reader over a serialized payload
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Get the number of bytes remaining to read
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], PacketDecodeError> {
        if self.remaining() < count {
            return Err(PacketDecodeError::InsufficientData {
                expected: count,
                actual: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    /// Read the leading packet type tag
    pub fn read_type(&mut self) -> Result<ServerPacketType, PacketDecodeError> {
        let tag = self.read_int()?;
        ServerPacketType::from_i32(tag).ok_or(PacketDecodeError::InvalidTypeTag(tag))
    }

    /// Read a boolean
    pub fn read_bool(&mut self) -> Result<bool, PacketDecodeError> {
        Ok(self.take(1)?[0] == 1)
    }

    /// Read a length-prefixed UTF-8 string
    pub fn read_string(&mut self) -> Result<String, PacketDecodeError> {
        let len = self.take(2)?;
        let len = u16::from_be_bytes([len[0], len[1]]) as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PacketDecodeError::InvalidStringEncoding)
    }

    /// Read a signed big-endian int
    pub fn read_int(&mut self) -> Result<i32, PacketDecodeError> {
        let bytes = self.take(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a big-endian float
    pub fn read_float(&mut self) -> Result<f32, PacketDecodeError> {
        let bytes = self.take(4)?;
        Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a 3-vector
    pub fn read_vector3(&mut self) -> Result<Vector3, PacketDecodeError> {
        Ok(Vector3::new(
            self.read_float()?,
            self.read_float()?,
            self.read_float()?,
        ))
    }

    /// Read a quaternion
    pub fn read_quaternion(&mut self) -> Result<Quaternion, PacketDecodeError> {
        Ok(Quaternion::new(
            self.read_float()?,
            self.read_float()?,
            self.read_float()?,
            self.read_float()?,
        ))
    }
}

/// Packet decode error
#[derive(Debug, Clone, PartialEq)]
pub enum PacketDecodeError {
    /// Not enough data in buffer
    InsufficientData { expected: usize, actual: usize },
    /// Unknown packet type tag
    InvalidTypeTag(i32),
    /// String field is not valid UTF-8
    InvalidStringEncoding,
}

impl std::fmt::Display for PacketDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketDecodeError::InsufficientData { expected, actual } => {
                write!(
                    f,
                    "Insufficient data: expected {} bytes, got {}",
                    expected, actual
                )
            }
            PacketDecodeError::InvalidTypeTag(tag) => {
                write!(f, "Invalid packet type tag: {}", tag)
            }
            PacketDecodeError::InvalidStringEncoding => {
                write!(f, "Invalid string encoding")
            }
        }
    }
}

impl std::error::Error for PacketDecodeError {}
