//! # Packet Framer
//!
//! Generic length-prefixed framing shared by RCON and Server List Ping.
//!
//! Both protocols put a length in front of every packet body; they only differ
//! in how the length is written:
//!
//! ```text
//! RCON: [Length: u32 LE (4)] [Body(N)]
//! SLP:  [Length: VarInt (1-5)] [Body(N)]
//! ```
//!
//! [`FrameCodec`] implements `tokio_util`'s `Decoder`/`Encoder` for either
//! prefix. A frame is only yielded once every body byte has arrived; a stream
//! that closes mid-frame is reported as [`ProtocolError::TruncatedFrame`],
//! never as partial data.

use crate::core::varint::{decode_varint, put_varint, varint_len};
use crate::error::{ProtocolError, Result};
use crate::utils::timeout::with_timeout;
use bytes::{Buf, BufMut, BytesMut};
use std::marker::PhantomData;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{Decoder, Encoder};

/// How a frame announces the length of its body
pub trait LengthPrefix {
    /// Inspect the front of `src` for a complete length header.
    ///
    /// Returns `Ok(None)` when more bytes are needed, or the declared body
    /// length together with the size of the header itself.
    fn peek_length(src: &[u8]) -> Result<Option<(usize, usize)>>;

    /// Write the header for a body of `len` bytes
    fn put_length(dst: &mut BytesMut, len: usize) -> Result<()>;

    /// Size of the header for a body of `len` bytes
    fn header_len(len: usize) -> usize;
}

/// Four byte little-endian signed length (RCON)
#[derive(Debug, Clone, Copy, Default)]
pub struct LittleEndianU32;

impl LengthPrefix for LittleEndianU32 {
    fn peek_length(src: &[u8]) -> Result<Option<(usize, usize)>> {
        if src.len() < 4 {
            return Ok(None);
        }
        let declared = i32::from_le_bytes([src[0], src[1], src[2], src[3]]);
        if declared < 0 {
            return Err(ProtocolError::InvalidHeader);
        }
        Ok(Some((declared as usize, 4)))
    }

    fn put_length(dst: &mut BytesMut, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| ProtocolError::OversizedPacket(len))?;
        dst.put_i32_le(len);
        Ok(())
    }

    fn header_len(_len: usize) -> usize {
        4
    }
}

/// VarInt length (Minecraft protocol)
#[derive(Debug, Clone, Copy, Default)]
pub struct VarintPrefix;

impl LengthPrefix for VarintPrefix {
    fn peek_length(src: &[u8]) -> Result<Option<(usize, usize)>> {
        match decode_varint(src)? {
            None => Ok(None),
            Some((declared, _)) if declared < 0 => Err(ProtocolError::InvalidHeader),
            Some((declared, consumed)) => Ok(Some((declared as usize, consumed))),
        }
    }

    fn put_length(dst: &mut BytesMut, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| ProtocolError::OversizedPacket(len))?;
        put_varint(dst, len);
        Ok(())
    }

    fn header_len(len: usize) -> usize {
        varint_len(len as i32)
    }
}

/// Length-prefixed frame codec yielding raw frame bodies
#[derive(Debug, Clone)]
pub struct FrameCodec<P> {
    max_frame: usize,
    _prefix: PhantomData<P>,
}

impl<P: LengthPrefix> FrameCodec<P> {
    /// Create a codec rejecting bodies longer than `max_frame`
    pub fn new(max_frame: usize) -> Self {
        Self {
            max_frame,
            _prefix: PhantomData,
        }
    }

    /// Largest body this codec accepts
    pub fn max_frame(&self) -> usize {
        self.max_frame
    }

    /// Encode `payload` into a standalone frame
    pub fn encode_frame(&self, payload: &[u8]) -> Result<BytesMut> {
        let mut dst = BytesMut::with_capacity(P::header_len(payload.len()) + payload.len());
        encode_into::<P>(payload, self.max_frame, &mut dst)?;
        Ok(dst)
    }
}

fn encode_into<P: LengthPrefix>(payload: &[u8], max_frame: usize, dst: &mut BytesMut) -> Result<()> {
    if payload.len() > max_frame {
        return Err(ProtocolError::OversizedPacket(payload.len()));
    }
    dst.reserve(P::header_len(payload.len()) + payload.len());
    P::put_length(dst, payload.len())?;
    dst.extend_from_slice(payload);
    Ok(())
}

impl<P: LengthPrefix> Decoder for FrameCodec<P> {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let Some((len, header)) = P::peek_length(src)? else {
            return Ok(None);
        };

        // Reject before reserving so a hostile length cannot force an allocation
        if len > self.max_frame {
            return Err(ProtocolError::OversizedPacket(len));
        }

        let total = header + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(header);
        Ok(Some(src.split_to(len)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::TruncatedFrame(src.len())),
        }
    }
}

impl<P: LengthPrefix, T: AsRef<[u8]>> Encoder<T> for FrameCodec<P> {
    type Error = ProtocolError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<()> {
        encode_into::<P>(item.as_ref(), self.max_frame, dst)
    }
}

/// Write one frame to `writer`, bounded by `timeout`
pub async fn write_frame<P, W>(writer: &mut W, payload: &[u8], timeout: Duration) -> Result<()>
where
    P: LengthPrefix,
    W: AsyncWrite + Unpin,
{
    let mut frame = BytesMut::new();
    encode_into::<P>(payload, usize::MAX >> 1, &mut frame)?;

    with_timeout(
        async {
            writer.write_all(&frame).await?;
            writer.flush().await
        },
        timeout,
    )
    .await??;

    Ok(())
}

/// Read exactly one frame body from `reader`.
///
/// The header is read byte by byte so nothing past the frame is consumed; the
/// body is then collected across as many receives as it takes. Each receive is
/// bounded by `timeout`.
///
/// # Errors
/// - `ConnectionClosed` if the stream ends before any header byte
/// - `TruncatedFrame` if the stream ends inside the frame
/// - `OversizedPacket` if the declared length exceeds `max_frame`
/// - `Timeout` if a receive does not complete in time
pub async fn read_frame<P, R>(reader: &mut R, max_frame: usize, timeout: Duration) -> Result<BytesMut>
where
    P: LengthPrefix,
    R: AsyncRead + Unpin,
{
    let mut header = Vec::with_capacity(5);

    let (len, _) = loop {
        if let Some(found) = P::peek_length(&header)? {
            break found;
        }

        let mut byte = [0u8; 1];
        let read = tokio::time::timeout(timeout, reader.read(&mut byte))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        if read == 0 {
            return Err(if header.is_empty() {
                ProtocolError::ConnectionClosed
            } else {
                ProtocolError::TruncatedFrame(header.len())
            });
        }
        header.push(byte[0]);
    };

    if len > max_frame {
        return Err(ProtocolError::OversizedPacket(len));
    }

    let mut body = BytesMut::zeroed(len);
    let mut filled = 0;
    while filled < len {
        let read = tokio::time::timeout(timeout, reader.read(&mut body[filled..]))
            .await
            .map_err(|_| ProtocolError::Timeout)??;

        if read == 0 {
            return Err(ProtocolError::TruncatedFrame(header.len() + filled));
        }
        filled += read;
    }

    Ok(body)
}
