//! # Core Protocol Components
//!
//! Low-level packet handling shared by every control channel.
//!
//! ## Components
//! - **VarInt**: 7-bit continuation integers used by the Minecraft protocol
//! - **Frame**: generic length-prefixed framing over byte streams
//! - **Packet**: Source RCON packet layout
//! - **Codec**: Tokio codecs for RCON and Server List Ping
//!
//! ## Wire Formats
//! ```text
//! RCON: [Length: i32 LE (4)] [Request ID (4)] [Type (4)] [Payload(N)] [0x00 0x00]
//! SLP:  [Length: VarInt] [Packet ID: VarInt] [Data(N)]
//! ```
//!
//! ## Safety
//! - Declared lengths are checked against a maximum before allocation
//! - Negative declared lengths are rejected
//! - A stream closed mid-frame is an error, never partial data

pub mod codec;
pub mod frame;
pub mod packet;
pub mod varint;
