//! # Protocol Codecs
//!
//! `tokio_util` codecs that turn the generic [`FrameCodec`] into typed packets
//! for the two wire protocols:
//!
//! - [`RconCodec`]: little-endian length frames carrying [`RconPacket`]s
//! - [`SlpCodec`]: varint length frames carrying a varint packet id and data
//!
//! Both are used with `tokio_util::codec::Framed` over a `TcpStream`.

use crate::config::MAX_RCON_PAYLOAD;
use crate::core::frame::{FrameCodec, LittleEndianU32, VarintPrefix};
use crate::core::packet::{RconPacket, MIN_BODY_LEN};
use crate::core::varint::{decode_varint, put_varint, varint_len};
use crate::error::{constants, ProtocolError, Result};
use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// Codec for Source RCON packets
#[derive(Debug, Clone)]
pub struct RconCodec {
    frames: FrameCodec<LittleEndianU32>,
}

impl Default for RconCodec {
    fn default() -> Self {
        Self::new(MAX_RCON_PAYLOAD)
    }
}

impl RconCodec {
    /// Accept response payloads of up to `max_payload` bytes
    pub fn new(max_payload: usize) -> Self {
        Self {
            frames: FrameCodec::new(max_payload + MIN_BODY_LEN),
        }
    }
}

impl Decoder for RconCodec {
    type Item = RconPacket;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.frames.decode(src)? {
            Some(body) => RconPacket::from_body(&body).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.frames.decode_eof(src)? {
            Some(body) => RconPacket::from_body(&body).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<RconPacket> for RconCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: RconPacket, dst: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::with_capacity(item.body_len());
        item.write_body(&mut body);
        self.frames.encode(&body[..], dst)
    }
}

/// One Minecraft protocol packet: varint id followed by packet data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlpPacket {
    pub id: i32,
    pub data: Bytes,
}

impl SlpPacket {
    pub fn new(id: i32, data: impl Into<Bytes>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }
}

/// Codec for varint-framed Minecraft packets
#[derive(Debug, Clone)]
pub struct SlpCodec {
    frames: FrameCodec<VarintPrefix>,
}

impl SlpCodec {
    pub fn new(max_frame: usize) -> Self {
        Self {
            frames: FrameCodec::new(max_frame),
        }
    }

    fn split_packet(mut body: BytesMut) -> Result<SlpPacket> {
        let (id, consumed) = decode_varint(&body)?.ok_or_else(|| {
            ProtocolError::InvalidPacket(format!(
                "{}: frame ends inside the packet id",
                constants::ERR_INVALID_PACKET
            ))
        })?;
        let data = body.split_off(consumed).freeze();
        Ok(SlpPacket { id, data })
    }
}

impl Decoder for SlpCodec {
    type Item = SlpPacket;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.frames.decode(src)? {
            Some(body) => Self::split_packet(body).map(Some),
            None => Ok(None),
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.frames.decode_eof(src)? {
            Some(body) => Self::split_packet(body).map(Some),
            None => Ok(None),
        }
    }
}

impl Encoder<SlpPacket> for SlpCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: SlpPacket, dst: &mut BytesMut) -> Result<()> {
        let mut body = BytesMut::with_capacity(varint_len(item.id) + item.data.len());
        put_varint(&mut body, item.id);
        body.extend_from_slice(&item.data);
        self.frames.encode(&body[..], dst)
    }
}
