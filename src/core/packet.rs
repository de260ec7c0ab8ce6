//! # RCON Packet
//!
//! Source RCON packet body layout (the frame length is handled by the framer):
//!
//! ```text
//! [Request ID: i32 LE (4)] [Type: i32 LE (4)] [Payload(N)] [0x00 0x00]
//! ```
//!
//! The declared frame length therefore always equals `4 + 4 + N + 2`.
//!
//! Type `2` means "execute command" when sent by the client and "auth
//! response" when sent by the server; the meaning is taken from the request
//! the packet answers, never from the raw code alone.

use crate::error::{constants, ProtocolError, Result};
use bytes::{BufMut, BytesMut};

/// Size of a body with an empty payload: id + type + two terminators
pub const MIN_BODY_LEN: usize = 10;

/// Request id the server echoes to reject authentication
pub const AUTH_FAILED_ID: i32 = -1;

/// RCON packet type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketType {
    /// `SERVERDATA_RESPONSE_VALUE` (0)
    ResponseValue,
    /// `SERVERDATA_EXECCOMMAND` / `SERVERDATA_AUTH_RESPONSE` (2)
    ExecOrAuthResponse,
    /// `SERVERDATA_AUTH` (3)
    Auth,
    /// Any other code a server may send
    Unknown(i32),
}

impl PacketType {
    pub const EXEC_COMMAND: PacketType = PacketType::ExecOrAuthResponse;
    pub const AUTH_RESPONSE: PacketType = PacketType::ExecOrAuthResponse;

    pub fn code(self) -> i32 {
        match self {
            PacketType::ResponseValue => 0,
            PacketType::ExecOrAuthResponse => 2,
            PacketType::Auth => 3,
            PacketType::Unknown(code) => code,
        }
    }

    pub fn from_code(code: i32) -> Self {
        match code {
            0 => PacketType::ResponseValue,
            2 => PacketType::ExecOrAuthResponse,
            3 => PacketType::Auth,
            other => PacketType::Unknown(other),
        }
    }
}

/// One RCON packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub request_id: i32,
    pub kind: PacketType,
    pub payload: Vec<u8>,
}

impl RconPacket {
    pub fn new(request_id: i32, kind: PacketType, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            request_id,
            kind,
            payload: payload.into(),
        }
    }

    /// Length the frame header must declare for this packet
    pub fn body_len(&self) -> usize {
        MIN_BODY_LEN + self.payload.len()
    }

    /// Serialize the body (without the length prefix)
    pub fn write_body(&self, dst: &mut BytesMut) {
        dst.reserve(self.body_len());
        dst.put_i32_le(self.request_id);
        dst.put_i32_le(self.kind.code());
        dst.extend_from_slice(&self.payload);
        dst.put_slice(&[0, 0]);
    }

    /// Serialize the complete frame, length prefix included
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(4 + self.body_len());
        buf.put_i32_le(self.body_len() as i32);
        self.write_body(&mut buf);
        buf.to_vec()
    }

    /// Parse a frame body.
    ///
    /// The payload is everything between the type field and the two trailing
    /// bytes. Servers are inconsistent about the terminators' values, so only
    /// their presence is required.
    ///
    /// # Errors
    /// `ProtocolError::InvalidPacket` if the body is shorter than ten bytes
    pub fn from_body(body: &[u8]) -> Result<Self> {
        if body.len() < MIN_BODY_LEN {
            return Err(ProtocolError::InvalidPacket(format!(
                "{}: body of {} bytes (minimum {MIN_BODY_LEN})",
                constants::ERR_INVALID_PACKET,
                body.len()
            )));
        }

        let request_id = i32::from_le_bytes([body[0], body[1], body[2], body[3]]);
        let code = i32::from_le_bytes([body[4], body[5], body[6], body[7]]);
        let payload = body[8..body.len() - 2].to_vec();

        Ok(Self {
            request_id,
            kind: PacketType::from_code(code),
            payload,
        })
    }

    /// Payload decoded as text, replacing invalid UTF-8
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}
